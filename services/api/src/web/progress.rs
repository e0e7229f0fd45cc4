//! services/api/src/web/progress.rs
//!
//! Progress endpoints: learners mark sections complete and the change
//! rolls up through module, lesson, and course derived state.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_reject, reject, HttpError};
use crate::web::state::AppState;

//=========================================================================================
// Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ProgressUpdateResponse {
    pub section_completed: bool,
    pub module_completed: bool,
    pub lesson_completed: bool,
    /// Rounded course percent after the roll-up, 0 to 100.
    pub course_progress: i16,
    pub course_completed: bool,
}

#[derive(Serialize, ToSchema)]
pub struct CourseProgressResponse {
    pub course_id: Uuid,
    pub progress: i16,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/sections/{section_id}/complete - Mark a section done
#[utoipa::path(
    post,
    path = "/api/sections/{section_id}/complete",
    params(("section_id" = Uuid, Path, description = "Section to mark complete")),
    responses(
        (status = 200, description = "Completion recorded and rolled up", body = ProgressUpdateResponse),
        (status = 403, description = "Caller is not enrolled in the owning course"),
        (status = 404, description = "No such section"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn complete_section_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(section_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Walk the section up to its course
    let section = state.db.get_section(section_id).await.map_err(port_reject)?;
    let module = state
        .db
        .get_module(section.module_id)
        .await
        .map_err(port_reject)?;
    let lesson = state
        .db
        .get_lesson(module.lesson_id)
        .await
        .map_err(port_reject)?;

    // 2. Only enrolled learners accumulate progress
    let enrollment = state
        .db
        .get_enrollment(user_id, lesson.course_id)
        .await
        .map_err(port_reject)?;
    if !matches!(enrollment, Some(ref e) if e.status == "active") {
        return Err(reject(
            StatusCode::FORBIDDEN,
            "You are not enrolled in this course",
        ));
    }

    // 3. Record and roll up
    let outcome = state
        .progress
        .complete_section(user_id, section_id)
        .await
        .map_err(port_reject)?;

    Ok(Json(ProgressUpdateResponse {
        section_completed: true,
        module_completed: outcome.module_completed,
        lesson_completed: outcome.lesson_completed,
        course_progress: outcome.course.percent,
        course_completed: outcome.course.is_completed,
    }))
}

/// GET /api/courses/{course_id}/progress - The caller's standing in a course
#[utoipa::path(
    get,
    path = "/api/courses/{course_id}/progress",
    params(("course_id" = Uuid, Path, description = "Course to report on")),
    responses(
        (status = 200, description = "Current rolled-up progress", body = CourseProgressResponse),
        (status = 404, description = "Caller is not enrolled in the course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn course_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let enrollment = state
        .db
        .get_enrollment(user_id, course_id)
        .await
        .map_err(port_reject)?
        .ok_or_else(|| {
            reject(
                StatusCode::NOT_FOUND,
                format!("enrollment in course {course_id} not found"),
            )
        })?;

    Ok(Json(CourseProgressResponse {
        course_id: enrollment.course_id,
        progress: enrollment.progress,
        is_completed: enrollment.is_completed,
        completed_at: enrollment.completed_at,
    }))
}
