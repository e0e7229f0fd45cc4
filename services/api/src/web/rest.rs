//! services/api/src/web/rest.rs
//!
//! Contains the learner dashboard handler and the master definition for
//! the OpenAPI specification.

use axum::{extract::State, response::IntoResponse, Extension, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::{port_reject, HttpError};
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::courses::create_course_handler,
        crate::web::courses::list_courses_handler,
        crate::web::courses::get_course_handler,
        crate::web::courses::list_trainer_courses_handler,
        crate::web::courses::publish_course_handler,
        crate::web::courses::archive_course_handler,
        crate::web::courses::create_lesson_handler,
        crate::web::courses::create_module_handler,
        crate::web::courses::create_section_handler,
        crate::web::courses::list_lessons_handler,
        crate::web::courses::list_modules_handler,
        crate::web::courses::list_sections_handler,
        crate::web::progress::complete_section_handler,
        crate::web::progress::course_progress_handler,
        crate::web::enrollments::list_enrollments_handler,
        crate::web::enrollments::enroll_handler,
        crate::web::payments::paystack_initialize_handler,
        crate::web::payments::paystack_verify_handler,
        crate::web::payments::paystack_webhook_handler,
        crate::web::payments::mpesa_initiate_handler,
        crate::web::payments::mpesa_callback_handler,
        crate::web::payments::mpesa_status_handler,
        crate::web::invites::create_invite_handler,
        crate::web::invites::list_invites_handler,
        crate::web::invites::accept_invite_handler,
        crate::web::discussions::create_thread_handler,
        crate::web::discussions::list_threads_handler,
        crate::web::discussions::create_message_handler,
        crate::web::discussions::list_messages_handler,
        crate::web::discussions::update_message_handler,
        dashboard_handler,
    ),
    components(
        schemas(
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
            crate::web::courses::CreateCourseRequest,
            crate::web::courses::CreateContentRequest,
            crate::web::courses::CourseResponse,
            crate::web::courses::LessonResponse,
            crate::web::courses::ModuleResponse,
            crate::web::courses::SectionResponse,
            crate::web::progress::ProgressUpdateResponse,
            crate::web::progress::CourseProgressResponse,
            crate::web::enrollments::EnrollmentResponse,
            crate::web::payments::PaystackInitializeRequest,
            crate::web::payments::PaystackInitializeResponse,
            crate::web::payments::PaystackVerifyResponse,
            crate::web::payments::WebhookAck,
            crate::web::payments::MpesaInitiateRequest,
            crate::web::payments::MpesaInitiateResponse,
            crate::web::payments::PaymentStatusResponse,
            crate::web::payments::MpesaCallbackBody,
            crate::web::payments::MpesaCallbackInner,
            crate::web::payments::StkCallback,
            crate::web::payments::CallbackMetadata,
            crate::web::payments::CallbackItem,
            crate::web::payments::MpesaCallbackAck,
            crate::web::invites::CreateInviteRequest,
            crate::web::invites::AcceptInviteRequest,
            crate::web::invites::InviteResponse,
            crate::web::discussions::CreateThreadRequest,
            crate::web::discussions::MessageBodyRequest,
            crate::web::discussions::ThreadResponse,
            crate::web::discussions::MessageResponse,
            DashboardResponse,
            DashboardSummary,
            ActiveCourse,
            DailyCompletionPoint,
        )
    ),
    tags(
        (name = "Learning Platform API", description = "Courses, enrollment, progress tracking, and payments.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub summary: DashboardSummary,
    pub active_courses: Vec<ActiveCourse>,
    /// One point per day with activity over the last 30 days, oldest first.
    pub daily_completions: Vec<DailyCompletionPoint>,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardSummary {
    pub total: i64,
    pub completed: i64,
    pub in_progress: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ActiveCourse {
    pub course_id: Uuid,
    pub title: String,
    pub progress: i16,
    pub is_completed: bool,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct DailyCompletionPoint {
    pub date: NaiveDate,
    pub completed: i64,
}

const DASHBOARD_SERIES_DAYS: u32 = 30;

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// GET /api/dashboard - The learner's home screen in one response
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses(
        (status = 200, description = "Enrollment summary, active courses, and recent activity", body = DashboardResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    // The three reads are independent; issue them together.
    let (summary, active, series) = tokio::try_join!(
        state.db.enrollment_summary(user_id),
        state.db.list_active_courses(user_id),
        state.db.section_completion_series(user_id, DASHBOARD_SERIES_DAYS),
    )
    .map_err(port_reject)?;

    Ok(Json(DashboardResponse {
        summary: DashboardSummary {
            total: summary.total,
            completed: summary.completed,
            in_progress: summary.in_progress,
        },
        active_courses: active
            .into_iter()
            .map(|c| ActiveCourse {
                course_id: c.course_id,
                title: c.title,
                progress: c.progress,
                is_completed: c.is_completed,
                enrolled_at: c.enrolled_at,
            })
            .collect(),
        daily_completions: series
            .into_iter()
            .map(|d| DailyCompletionPoint {
                date: d.date,
                completed: d.completed,
            })
            .collect(),
    }))
}
