//! services/api/src/web/discussions.rs
//!
//! Course discussion boards: threads under a course, messages under a
//! thread. Anyone with course access can read and post; editing a
//! message is reserved for its author.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_reject, reject, HttpError};
use crate::web::courses::ensure_course_access;
use crate::web::state::AppState;
use lms_core::domain::{DiscussionMessage, DiscussionThread};
use lms_core::ports::PortError;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateThreadRequest {
    pub title: String,
}

#[derive(Deserialize, ToSchema)]
pub struct MessageBodyRequest {
    pub body: String,
}

#[derive(Serialize, ToSchema)]
pub struct ThreadResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<DiscussionThread> for ThreadResponse {
    fn from(thread: DiscussionThread) -> Self {
        Self {
            id: thread.id,
            course_id: thread.course_id,
            author_id: thread.author_id,
            title: thread.title,
            created_at: thread.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl From<DiscussionMessage> for MessageResponse {
    fn from(message: DiscussionMessage) -> Self {
        Self {
            id: message.id,
            thread_id: message.thread_id,
            author_id: message.author_id,
            body: message.body,
            created_at: message.created_at,
            edited_at: message.edited_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/courses/{course_id}/threads - Open a discussion thread
#[utoipa::path(
    post,
    path = "/api/courses/{course_id}/threads",
    params(("course_id" = Uuid, Path, description = "Course the thread belongs to")),
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Thread created", body = ThreadResponse),
        (status = 403, description = "Caller has no access to the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_thread_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_course_access(&state, user_id, course_id).await?;
    let thread = state
        .db
        .create_thread(course_id, user_id, &req.title)
        .await
        .map_err(port_reject)?;
    Ok((StatusCode::CREATED, Json(ThreadResponse::from(thread))))
}

/// GET /api/courses/{course_id}/threads - Threads for a course
#[utoipa::path(
    get,
    path = "/api/courses/{course_id}/threads",
    params(("course_id" = Uuid, Path, description = "Course to list threads for")),
    responses(
        (status = 200, description = "Threads, newest first", body = [ThreadResponse]),
        (status = 403, description = "Caller has no access to the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_threads_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_course_access(&state, user_id, course_id).await?;
    let threads = state.db.list_threads(course_id).await.map_err(port_reject)?;
    let body: Vec<ThreadResponse> = threads.into_iter().map(ThreadResponse::from).collect();
    Ok(Json(body))
}

/// POST /api/threads/{thread_id}/messages - Reply in a thread
#[utoipa::path(
    post,
    path = "/api/threads/{thread_id}/messages",
    params(("thread_id" = Uuid, Path, description = "Thread to post into")),
    request_body = MessageBodyRequest,
    responses(
        (status = 201, description = "Message posted", body = MessageResponse),
        (status = 403, description = "Caller has no access to the course"),
        (status = 404, description = "No such thread"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<MessageBodyRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let thread = state.db.get_thread(thread_id).await.map_err(port_reject)?;
    ensure_course_access(&state, user_id, thread.course_id).await?;
    let message = state
        .db
        .create_message(thread_id, user_id, &req.body)
        .await
        .map_err(port_reject)?;
    Ok((StatusCode::CREATED, Json(MessageResponse::from(message))))
}

/// GET /api/threads/{thread_id}/messages - Messages in a thread
#[utoipa::path(
    get,
    path = "/api/threads/{thread_id}/messages",
    params(("thread_id" = Uuid, Path, description = "Thread to read")),
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageResponse]),
        (status = 403, description = "Caller has no access to the course"),
        (status = 404, description = "No such thread"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(thread_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let thread = state.db.get_thread(thread_id).await.map_err(port_reject)?;
    ensure_course_access(&state, user_id, thread.course_id).await?;
    let messages = state
        .db
        .list_messages(thread_id)
        .await
        .map_err(port_reject)?;
    let body: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from).collect();
    Ok(Json(body))
}

/// PATCH /api/messages/{message_id} - Edit your own message
#[utoipa::path(
    patch,
    path = "/api/messages/{message_id}",
    params(("message_id" = Uuid, Path, description = "Message to edit")),
    request_body = MessageBodyRequest,
    responses(
        (status = 200, description = "Message updated", body = MessageResponse),
        (status = 403, description = "Caller is not the author"),
        (status = 404, description = "No such message"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(message_id): Path<Uuid>,
    Json(req): Json<MessageBodyRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let message = state
        .db
        .update_message(message_id, user_id, &req.body)
        .await
        .map_err(|e| match e {
            PortError::Unauthorized => reject(
                StatusCode::FORBIDDEN,
                "Only the author can edit a message",
            ),
            other => port_reject(other),
        })?;
    Ok(Json(MessageResponse::from(message)))
}
