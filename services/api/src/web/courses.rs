//! services/api/src/web/courses.rs
//!
//! Course catalog, lifecycle, and content authoring endpoints. Trainers
//! create courses as drafts, attach lessons, modules, and sections, then
//! publish. The catalog only ever shows published courses.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_reject, reject, HttpError};
use crate::web::state::AppState;
use lms_core::domain::{
    Course, CourseStatus, Lesson, Module, NewCourse, Section, User, UserRole,
};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Major currency units. Omitted or zero means the course is free.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// ISO currency code; defaults to KES.
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateContentRequest {
    pub title: String,
    /// Ordering within the parent; lower positions come first.
    pub position: i32,
}

#[derive(Serialize, ToSchema)]
pub struct CourseResponse {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Course> for CourseResponse {
    fn from(course: Course) -> Self {
        Self {
            id: course.id,
            trainer_id: course.trainer_id,
            title: course.title,
            description: course.description,
            price: course.price,
            currency: course.currency,
            status: course.status.to_string(),
            created_at: course.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LessonResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            id: lesson.id,
            course_id: lesson.course_id,
            title: lesson.title,
            position: lesson.position,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ModuleResponse {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub title: String,
    pub position: i32,
}

impl From<Module> for ModuleResponse {
    fn from(module: Module) -> Self {
        Self {
            id: module.id,
            lesson_id: module.lesson_id,
            title: module.title,
            position: module.position,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SectionResponse {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub position: i32,
}

impl From<Section> for SectionResponse {
    fn from(section: Section) -> Self {
        Self {
            id: section.id,
            module_id: section.module_id,
            title: section.title,
            position: section.position,
        }
    }
}

//=========================================================================================
// Access Helpers (shared across the web modules)
//=========================================================================================

/// Loads the authenticated user and checks they hold the trainer role.
pub(crate) async fn require_trainer(state: &AppState, user_id: Uuid) -> Result<User, HttpError> {
    let user = state.db.get_user(user_id).await.map_err(port_reject)?;
    if user.role != UserRole::Trainer {
        return Err(reject(
            StatusCode::FORBIDDEN,
            "Only trainers can perform this action",
        ));
    }
    Ok(user)
}

/// Loads the course and checks the caller is the trainer who owns it.
pub(crate) async fn require_course_owner(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Course, HttpError> {
    let course = state.db.get_course(course_id).await.map_err(port_reject)?;
    if course.trainer_id != user_id {
        return Err(reject(
            StatusCode::FORBIDDEN,
            "Only the course trainer can perform this action",
        ));
    }
    Ok(course)
}

/// Checks the caller may read course content: either they own the course
/// or they hold an active enrollment in it.
pub(crate) async fn ensure_course_access(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Course, HttpError> {
    let course = state.db.get_course(course_id).await.map_err(port_reject)?;
    if course.trainer_id == user_id {
        return Ok(course);
    }
    let enrollment = state
        .db
        .get_enrollment(user_id, course_id)
        .await
        .map_err(port_reject)?;
    match enrollment {
        Some(e) if e.status == "active" => Ok(course),
        _ => Err(reject(
            StatusCode::FORBIDDEN,
            "You are not enrolled in this course",
        )),
    }
}

//=========================================================================================
// Course Handlers
//=========================================================================================

/// POST /api/trainer/courses - Create a draft course
#[utoipa::path(
    post,
    path = "/api/trainer/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created as a draft", body = CourseResponse),
        (status = 403, description = "Caller is not a trainer"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Only trainers create courses
    let trainer = require_trainer(&state, user_id).await?;

    // 2. Insert the draft
    let course = state
        .db
        .create_course(NewCourse {
            trainer_id: trainer.id,
            title: req.title,
            description: req.description,
            price: req.price.unwrap_or(Decimal::ZERO),
            currency: req.currency.unwrap_or_else(|| "KES".to_string()),
        })
        .await
        .map_err(port_reject)?;

    Ok((StatusCode::CREATED, Json(CourseResponse::from(course))))
}

/// GET /api/courses - List every published course
#[utoipa::path(
    get,
    path = "/api/courses",
    responses(
        (status = 200, description = "Published courses", body = [CourseResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_courses_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let courses = state
        .db
        .list_published_courses()
        .await
        .map_err(port_reject)?;
    let body: Vec<CourseResponse> = courses.into_iter().map(CourseResponse::from).collect();
    Ok(Json(body))
}

/// GET /api/courses/{course_id} - Published course detail
#[utoipa::path(
    get,
    path = "/api/courses/{course_id}",
    params(("course_id" = Uuid, Path, description = "Course to fetch")),
    responses(
        (status = 200, description = "Course detail", body = CourseResponse),
        (status = 404, description = "Course does not exist or is not published"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_course_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let course = state.db.get_course(course_id).await.map_err(port_reject)?;
    // Drafts and archived courses are invisible on the public catalog.
    if course.status != CourseStatus::Published {
        return Err(reject(
            StatusCode::NOT_FOUND,
            format!("course {course_id} not found"),
        ));
    }
    Ok(Json(CourseResponse::from(course)))
}

/// GET /api/trainer/courses - The caller's own courses, any status
#[utoipa::path(
    get,
    path = "/api/trainer/courses",
    responses(
        (status = 200, description = "Courses owned by the caller", body = [CourseResponse]),
        (status = 403, description = "Caller is not a trainer"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_trainer_courses_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let trainer = require_trainer(&state, user_id).await?;
    let courses = state
        .db
        .list_courses_by_trainer(trainer.id)
        .await
        .map_err(port_reject)?;
    let body: Vec<CourseResponse> = courses.into_iter().map(CourseResponse::from).collect();
    Ok(Json(body))
}

/// POST /api/courses/{course_id}/publish - Open a draft to enrollment
#[utoipa::path(
    post,
    path = "/api/courses/{course_id}/publish",
    params(("course_id" = Uuid, Path, description = "Course to publish")),
    responses(
        (status = 200, description = "Course is now published", body = CourseResponse),
        (status = 400, description = "The course cannot move to published from its current status"),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn publish_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    advance_course_status(&state, user_id, course_id, CourseStatus::Published).await
}

/// POST /api/courses/{course_id}/archive - Retire a course
#[utoipa::path(
    post,
    path = "/api/courses/{course_id}/archive",
    params(("course_id" = Uuid, Path, description = "Course to archive")),
    responses(
        (status = 200, description = "Course is now archived", body = CourseResponse),
        (status = 400, description = "The course cannot move to archived from its current status"),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn archive_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    advance_course_status(&state, user_id, course_id, CourseStatus::Archived).await
}

/// Shared publish/archive body. Transitions only move forward; anything
/// else is rejected before touching the database.
async fn advance_course_status(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
    next: CourseStatus,
) -> Result<(StatusCode, Json<CourseResponse>), HttpError> {
    // 1. Ownership gate
    let course = require_course_owner(state, user_id, course_id).await?;

    // 2. Lifecycle gate
    if !course.status.can_advance_to(next) {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            format!("A {} course cannot move to {next}", course.status),
        ));
    }

    // 3. Persist the transition
    let updated = state
        .db
        .set_course_status(course_id, next)
        .await
        .map_err(port_reject)?;
    Ok((StatusCode::OK, Json(CourseResponse::from(updated))))
}

//=========================================================================================
// Content Authoring Handlers
//=========================================================================================

/// POST /api/courses/{course_id}/lessons - Add a lesson to a course
#[utoipa::path(
    post,
    path = "/api/courses/{course_id}/lessons",
    params(("course_id" = Uuid, Path, description = "Parent course")),
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Lesson created", body = LessonResponse),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_lesson_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateContentRequest>,
) -> Result<impl IntoResponse, HttpError> {
    require_course_owner(&state, user_id, course_id).await?;
    let lesson = state
        .db
        .create_lesson(course_id, &req.title, req.position)
        .await
        .map_err(port_reject)?;
    Ok((StatusCode::CREATED, Json(LessonResponse::from(lesson))))
}

/// POST /api/lessons/{lesson_id}/modules - Add a module to a lesson
#[utoipa::path(
    post,
    path = "/api/lessons/{lesson_id}/modules",
    params(("lesson_id" = Uuid, Path, description = "Parent lesson")),
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Module created", body = ModuleResponse),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "No such lesson"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_module_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<CreateContentRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let lesson = state.db.get_lesson(lesson_id).await.map_err(port_reject)?;
    require_course_owner(&state, user_id, lesson.course_id).await?;
    let module = state
        .db
        .create_module(lesson_id, &req.title, req.position)
        .await
        .map_err(port_reject)?;
    Ok((StatusCode::CREATED, Json(ModuleResponse::from(module))))
}

/// POST /api/modules/{module_id}/sections - Add a section to a module
#[utoipa::path(
    post,
    path = "/api/modules/{module_id}/sections",
    params(("module_id" = Uuid, Path, description = "Parent module")),
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Section created", body = SectionResponse),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "No such module"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_section_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(module_id): Path<Uuid>,
    Json(req): Json<CreateContentRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let module = state.db.get_module(module_id).await.map_err(port_reject)?;
    let lesson = state
        .db
        .get_lesson(module.lesson_id)
        .await
        .map_err(port_reject)?;
    require_course_owner(&state, user_id, lesson.course_id).await?;
    let section = state
        .db
        .create_section(module_id, &req.title, req.position)
        .await
        .map_err(port_reject)?;
    Ok((StatusCode::CREATED, Json(SectionResponse::from(section))))
}

/// GET /api/courses/{course_id}/lessons - Lessons in position order
#[utoipa::path(
    get,
    path = "/api/courses/{course_id}/lessons",
    params(("course_id" = Uuid, Path, description = "Parent course")),
    responses(
        (status = 200, description = "Lessons for the course", body = [LessonResponse]),
        (status = 403, description = "Caller has no access to the course"),
        (status = 404, description = "No such course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_lessons_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_course_access(&state, user_id, course_id).await?;
    let lessons = state.db.list_lessons(course_id).await.map_err(port_reject)?;
    let body: Vec<LessonResponse> = lessons.into_iter().map(LessonResponse::from).collect();
    Ok(Json(body))
}

/// GET /api/lessons/{lesson_id}/modules - Modules in position order
#[utoipa::path(
    get,
    path = "/api/lessons/{lesson_id}/modules",
    params(("lesson_id" = Uuid, Path, description = "Parent lesson")),
    responses(
        (status = 200, description = "Modules for the lesson", body = [ModuleResponse]),
        (status = 403, description = "Caller has no access to the course"),
        (status = 404, description = "No such lesson"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_modules_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(lesson_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let lesson = state.db.get_lesson(lesson_id).await.map_err(port_reject)?;
    ensure_course_access(&state, user_id, lesson.course_id).await?;
    let modules = state.db.list_modules(lesson_id).await.map_err(port_reject)?;
    let body: Vec<ModuleResponse> = modules.into_iter().map(ModuleResponse::from).collect();
    Ok(Json(body))
}

/// GET /api/modules/{module_id}/sections - Sections in position order
#[utoipa::path(
    get,
    path = "/api/modules/{module_id}/sections",
    params(("module_id" = Uuid, Path, description = "Parent module")),
    responses(
        (status = 200, description = "Sections for the module", body = [SectionResponse]),
        (status = 403, description = "Caller has no access to the course"),
        (status = 404, description = "No such module"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_sections_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(module_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let module = state.db.get_module(module_id).await.map_err(port_reject)?;
    let lesson = state
        .db
        .get_lesson(module.lesson_id)
        .await
        .map_err(port_reject)?;
    ensure_course_access(&state, user_id, lesson.course_id).await?;
    let sections = state
        .db
        .list_sections(module_id)
        .await
        .map_err(port_reject)?;
    let body: Vec<SectionResponse> = sections.into_iter().map(SectionResponse::from).collect();
    Ok(Json(body))
}
