//! services/api/src/web/invites.rs
//!
//! Email invites. A trainer mints a single-use token for an address;
//! whoever presents the token before it expires is enrolled with
//! payment_status "invited", skipping the payment flows.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_reject, reject, HttpError};
use crate::web::courses::require_course_owner;
use crate::web::enrollments::EnrollmentResponse;
use crate::web::state::AppState;
use lms_core::domain::{Invite, NewInvite};

const DEFAULT_EXPIRY_DAYS: i64 = 7;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateInviteRequest {
    pub email: String,
    /// Days until the token stops working; defaults to 7.
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct AcceptInviteRequest {
    pub token: String,
}

#[derive(Serialize, ToSchema)]
pub struct InviteResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub email: String,
    /// Share this with the invitee; it is the whole credential.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Invite> for InviteResponse {
    fn from(invite: Invite) -> Self {
        Self {
            id: invite.id,
            course_id: invite.course_id,
            email: invite.email,
            token: invite.token,
            expires_at: invite.expires_at,
            accepted: invite.accepted,
            created_at: invite.created_at,
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/courses/{course_id}/invites - Mint an invite token
#[utoipa::path(
    post,
    path = "/api/courses/{course_id}/invites",
    params(("course_id" = Uuid, Path, description = "Course to invite into")),
    request_body = CreateInviteRequest,
    responses(
        (status = 201, description = "Invite created", body = InviteResponse),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_invite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateInviteRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Only the owner invites people into a course
    let course = require_course_owner(&state, user_id, course_id).await?;

    // 2. Mint the token
    let days = req.expires_in_days.unwrap_or(DEFAULT_EXPIRY_DAYS).max(1);
    let invite = state
        .db
        .create_invite(NewInvite {
            course_id: course.id,
            email: req.email,
            token: generate_token(),
            invited_by: user_id,
            expires_at: Utc::now() + Duration::days(days),
        })
        .await
        .map_err(port_reject)?;

    Ok((StatusCode::CREATED, Json(InviteResponse::from(invite))))
}

/// GET /api/courses/{course_id}/invites - Invites issued for a course
#[utoipa::path(
    get,
    path = "/api/courses/{course_id}/invites",
    params(("course_id" = Uuid, Path, description = "Course to list invites for")),
    responses(
        (status = 200, description = "Invites for the course", body = [InviteResponse]),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_invites_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    require_course_owner(&state, user_id, course_id).await?;
    let invites = state
        .db
        .list_invites_for_course(course_id)
        .await
        .map_err(port_reject)?;
    let body: Vec<InviteResponse> = invites.into_iter().map(InviteResponse::from).collect();
    Ok(Json(body))
}

/// POST /api/invites/accept - Redeem a token for an enrollment
#[utoipa::path(
    post,
    path = "/api/invites/accept",
    request_body = AcceptInviteRequest,
    responses(
        (status = 200, description = "Enrollment granted", body = EnrollmentResponse),
        (status = 400, description = "Token is expired or already used"),
        (status = 404, description = "No such token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn accept_invite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<AcceptInviteRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. The token must exist, be unused, and be in date
    let invite = state
        .db
        .get_invite_by_token(&req.token)
        .await
        .map_err(port_reject)?;
    if invite.accepted {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "This invite has already been used",
        ));
    }
    if invite.is_expired(Utc::now()) {
        return Err(reject(StatusCode::BAD_REQUEST, "This invite has expired"));
    }

    // 2. Enroll first, then burn the token
    let enrollment = state
        .db
        .upsert_enrollment(user_id, invite.course_id, "invited")
        .await
        .map_err(port_reject)?;
    state
        .db
        .mark_invite_accepted(invite.id)
        .await
        .map_err(port_reject)?;

    Ok(Json(EnrollmentResponse::from(enrollment)))
}
