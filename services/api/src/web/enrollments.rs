//! services/api/src/web/enrollments.rs
//!
//! Enrollment endpoints. Free courses are joined directly here; paid
//! courses go through the payment flows, which grant the enrollment on
//! settlement.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_reject, reject, HttpError};
use crate::web::state::AppState;
use lms_core::domain::{CourseStatus, Enrollment};

//=========================================================================================
// Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub progress: i16,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
}

impl From<Enrollment> for EnrollmentResponse {
    fn from(e: Enrollment) -> Self {
        Self {
            id: e.id,
            course_id: e.course_id,
            status: e.status,
            payment_status: e.payment_status,
            progress: e.progress,
            is_completed: e.is_completed,
            completed_at: e.completed_at,
            enrolled_at: e.enrolled_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/enrollments - The caller's enrollments, newest first
#[utoipa::path(
    get,
    path = "/api/enrollments",
    responses(
        (status = 200, description = "Enrollments for the caller", body = [EnrollmentResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_enrollments_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let enrollments = state
        .db
        .list_enrollments(user_id)
        .await
        .map_err(port_reject)?;
    let body: Vec<EnrollmentResponse> =
        enrollments.into_iter().map(EnrollmentResponse::from).collect();
    Ok(Json(body))
}

/// POST /api/courses/{course_id}/enroll - Join a free published course
#[utoipa::path(
    post,
    path = "/api/courses/{course_id}/enroll",
    params(("course_id" = Uuid, Path, description = "Course to join")),
    responses(
        (status = 201, description = "Enrollment active", body = EnrollmentResponse),
        (status = 400, description = "Course is not open, or requires payment"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn enroll_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. The course must be open for enrollment
    let course = state.db.get_course(course_id).await.map_err(port_reject)?;
    if course.status != CourseStatus::Published {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Course is not open for enrollment",
        ));
    }

    // 2. Paid courses go through the payment flows instead
    if course.price > Decimal::ZERO {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "This course requires payment to enroll",
        ));
    }

    // 3. Insert or reactivate the enrollment
    let enrollment = state
        .db
        .upsert_enrollment(user_id, course_id, "free")
        .await
        .map_err(port_reject)?;
    Ok((StatusCode::CREATED, Json(EnrollmentResponse::from(enrollment))))
}
