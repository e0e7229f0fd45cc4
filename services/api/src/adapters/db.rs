//! services/api/src/adapters/db.rs
//!
//! PostgreSQL implementation of the `DatabaseService` port. Uniqueness
//! and idempotency guarantees live in the schema (unique indexes, ON
//! CONFLICT upserts); this adapter translates the outcomes into port
//! errors.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use lms_core::domain::{
    Course, CourseStatus, DailyCompletions, DiscussionMessage, DiscussionThread, EnrolledCourse,
    Enrollment, EnrollmentSummary, Invite, Lesson, Module, NewCourse, NewInvite, NewPayment,
    NewStkRequest, NewUser, Payment, Section, StkRequest, User, UserCredentials, UserRole,
};
use lms_core::ports::{DatabaseService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending migrations; called once at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(e: sqlx::Error, what: impl Into<String>) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what.into()),
        _ => unexpected(e),
    }
}

/// Maps a unique constraint violation onto `AlreadyExists`; everything else
/// stays `Unexpected`.
fn duplicate(e: sqlx::Error, what: impl Into<String>) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::AlreadyExists(what.into())
        }
        _ => unexpected(e),
    }
}

/// Maps a foreign key violation onto `NotFound`, for inserts whose parent
/// row may be missing.
fn missing_parent(e: sqlx::Error, what: impl Into<String>) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::NotFound(what.into())
        }
        _ => unexpected(e),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    full_name: String,
    role: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            role: UserRole::from(self.role.as_str()),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    trainer_id: Uuid,
    title: String,
    description: Option<String>,
    price: Decimal,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            trainer_id: self.trainer_id,
            title: self.title,
            description: self.description,
            price: self.price,
            currency: self.currency,
            status: CourseStatus::from(self.status.as_str()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const COURSE_COLUMNS: &str =
    "id, trainer_id, title, description, price, currency, status, created_at, updated_at";

#[derive(FromRow)]
struct LessonRecord {
    id: Uuid,
    course_id: Uuid,
    title: String,
    position: i32,
}
impl LessonRecord {
    fn to_domain(self) -> Lesson {
        Lesson {
            id: self.id,
            course_id: self.course_id,
            title: self.title,
            position: self.position,
        }
    }
}

#[derive(FromRow)]
struct ModuleRecord {
    id: Uuid,
    lesson_id: Uuid,
    title: String,
    position: i32,
}
impl ModuleRecord {
    fn to_domain(self) -> Module {
        Module {
            id: self.id,
            lesson_id: self.lesson_id,
            title: self.title,
            position: self.position,
        }
    }
}

#[derive(FromRow)]
struct SectionRecord {
    id: Uuid,
    module_id: Uuid,
    title: String,
    position: i32,
}
impl SectionRecord {
    fn to_domain(self) -> Section {
        Section {
            id: self.id,
            module_id: self.module_id,
            title: self.title,
            position: self.position,
        }
    }
}

#[derive(FromRow)]
struct EnrollmentRecord {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    status: String,
    payment_status: String,
    progress: i16,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    enrolled_at: DateTime<Utc>,
}
impl EnrollmentRecord {
    fn to_domain(self) -> Enrollment {
        Enrollment {
            id: self.id,
            user_id: self.user_id,
            course_id: self.course_id,
            status: self.status,
            payment_status: self.payment_status,
            progress: self.progress,
            is_completed: self.is_completed,
            completed_at: self.completed_at,
            enrolled_at: self.enrolled_at,
        }
    }
}

const ENROLLMENT_COLUMNS: &str = "id, user_id, course_id, status, payment_status, progress, \
     is_completed, completed_at, enrolled_at";

#[derive(FromRow)]
struct PaymentRecord {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    reference: String,
    amount: Decimal,
    currency: String,
    channel: String,
    plan_code: Option<String>,
    paid_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    status: String,
    settled_at: Option<DateTime<Utc>>,
}
impl PaymentRecord {
    fn to_domain(self) -> Payment {
        Payment {
            id: self.id,
            user_id: self.user_id,
            course_id: self.course_id,
            reference: self.reference,
            amount: self.amount,
            currency: self.currency,
            channel: self.channel,
            plan_code: self.plan_code,
            paid_at: self.paid_at,
            recorded_at: self.recorded_at,
            status: self.status,
            settled_at: self.settled_at,
        }
    }
}

const PAYMENT_COLUMNS: &str = "id, user_id, course_id, reference, amount, currency, channel, \
     plan_code, paid_at, recorded_at, status, settled_at";

#[derive(FromRow)]
struct StkRequestRecord {
    checkout_request_id: String,
    merchant_request_id: String,
    user_id: Uuid,
    course_id: Uuid,
    amount: Decimal,
    currency: String,
    phone_number: String,
    created_at: DateTime<Utc>,
}
impl StkRequestRecord {
    fn to_domain(self) -> StkRequest {
        StkRequest {
            checkout_request_id: self.checkout_request_id,
            merchant_request_id: self.merchant_request_id,
            user_id: self.user_id,
            course_id: self.course_id,
            amount: self.amount,
            currency: self.currency,
            phone_number: self.phone_number,
            created_at: self.created_at,
        }
    }
}

const STK_REQUEST_COLUMNS: &str = "checkout_request_id, merchant_request_id, user_id, \
     course_id, amount, currency, phone_number, created_at";

#[derive(FromRow)]
struct InviteRecord {
    id: Uuid,
    course_id: Uuid,
    email: String,
    token: String,
    invited_by: Uuid,
    expires_at: DateTime<Utc>,
    accepted: bool,
    created_at: DateTime<Utc>,
}
impl InviteRecord {
    fn to_domain(self) -> Invite {
        Invite {
            id: self.id,
            course_id: self.course_id,
            email: self.email,
            token: self.token,
            invited_by: self.invited_by,
            expires_at: self.expires_at,
            accepted: self.accepted,
            created_at: self.created_at,
        }
    }
}

const INVITE_COLUMNS: &str =
    "id, course_id, email, token, invited_by, expires_at, accepted, created_at";

#[derive(FromRow)]
struct ThreadRecord {
    id: Uuid,
    course_id: Uuid,
    author_id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
}
impl ThreadRecord {
    fn to_domain(self) -> DiscussionThread {
        DiscussionThread {
            id: self.id,
            course_id: self.course_id,
            author_id: self.author_id,
            title: self.title,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    thread_id: Uuid,
    author_id: Uuid,
    body: String,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
}
impl MessageRecord {
    fn to_domain(self) -> DiscussionMessage {
        DiscussionMessage {
            id: self.id,
            thread_id: self.thread_id,
            author_id: self.author_id,
            body: self.body,
            created_at: self.created_at,
            edited_at: self.edited_at,
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, thread_id, author_id, body, created_at, edited_at";

#[derive(FromRow)]
struct SummaryRecord {
    total: i64,
    completed: i64,
    in_progress: i64,
}

#[derive(FromRow)]
struct EnrolledCourseRecord {
    course_id: Uuid,
    title: String,
    progress: i16,
    is_completed: bool,
    enrolled_at: DateTime<Utc>,
}
impl EnrolledCourseRecord {
    fn to_domain(self) -> EnrolledCourse {
        EnrolledCourse {
            course_id: self.course_id,
            title: self.title,
            progress: self.progress,
            is_completed: self.is_completed,
            enrolled_at: self.enrolled_at,
        }
    }
}

#[derive(FromRow)]
struct DailyCompletionsRecord {
    date: NaiveDate,
    completed: i64,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- User Management ---
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, full_name, hashed_password, role) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, email, full_name, role, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.hashed_password)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| duplicate(e, format!("user {}", user.email)))?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, full_name, role, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("user {user_id}")))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id AS user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("user {email}")))?;
        Ok(record.to_domain())
    }

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => unexpected(e),
        })?;
        Ok(user_id)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Course Management ---
    async fn create_course(&self, course: NewCourse) -> PortResult<Course> {
        let sql = format!(
            "INSERT INTO courses (id, trainer_id, title, description, price, currency, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'draft') RETURNING {COURSE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(course.trainer_id)
            .bind(&course.title)
            .bind(&course.description)
            .bind(course.price)
            .bind(&course.currency)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1");
        let record = sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(course_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, format!("course {course_id}")))?;
        Ok(record.to_domain())
    }

    async fn list_published_courses(&self) -> PortResult<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE status = 'published' \
             ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, CourseRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_courses_by_trainer(&self, trainer_id: Uuid) -> PortResult<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE trainer_id = $1 ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(trainer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn set_course_status(
        &self,
        course_id: Uuid,
        status: CourseStatus,
    ) -> PortResult<Course> {
        let sql = format!(
            "UPDATE courses SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {COURSE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(course_id)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, format!("course {course_id}")))?;
        Ok(record.to_domain())
    }

    // --- Content Hierarchy ---
    async fn create_lesson(
        &self,
        course_id: Uuid,
        title: &str,
        position: i32,
    ) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(
            "INSERT INTO lessons (id, course_id, title, position) VALUES ($1, $2, $3, $4) \
             RETURNING id, course_id, title, position",
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(title)
        .bind(position)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, format!("course {course_id}")))?;
        Ok(record.to_domain())
    }

    async fn create_module(
        &self,
        lesson_id: Uuid,
        title: &str,
        position: i32,
    ) -> PortResult<Module> {
        let record = sqlx::query_as::<_, ModuleRecord>(
            "INSERT INTO modules (id, lesson_id, title, position) VALUES ($1, $2, $3, $4) \
             RETURNING id, lesson_id, title, position",
        )
        .bind(Uuid::new_v4())
        .bind(lesson_id)
        .bind(title)
        .bind(position)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, format!("lesson {lesson_id}")))?;
        Ok(record.to_domain())
    }

    async fn create_section(
        &self,
        module_id: Uuid,
        title: &str,
        position: i32,
    ) -> PortResult<Section> {
        let record = sqlx::query_as::<_, SectionRecord>(
            "INSERT INTO sections (id, module_id, title, position) VALUES ($1, $2, $3, $4) \
             RETURNING id, module_id, title, position",
        )
        .bind(Uuid::new_v4())
        .bind(module_id)
        .bind(title)
        .bind(position)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, format!("module {module_id}")))?;
        Ok(record.to_domain())
    }

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        let record = sqlx::query_as::<_, LessonRecord>(
            "SELECT id, course_id, title, position FROM lessons WHERE id = $1",
        )
        .bind(lesson_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("lesson {lesson_id}")))?;
        Ok(record.to_domain())
    }

    async fn get_module(&self, module_id: Uuid) -> PortResult<Module> {
        let record = sqlx::query_as::<_, ModuleRecord>(
            "SELECT id, lesson_id, title, position FROM modules WHERE id = $1",
        )
        .bind(module_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("module {module_id}")))?;
        Ok(record.to_domain())
    }

    async fn get_section(&self, section_id: Uuid) -> PortResult<Section> {
        let record = sqlx::query_as::<_, SectionRecord>(
            "SELECT id, module_id, title, position FROM sections WHERE id = $1",
        )
        .bind(section_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("section {section_id}")))?;
        Ok(record.to_domain())
    }

    async fn list_lessons(&self, course_id: Uuid) -> PortResult<Vec<Lesson>> {
        let records = sqlx::query_as::<_, LessonRecord>(
            "SELECT id, course_id, title, position FROM lessons WHERE course_id = $1 \
             ORDER BY position ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_modules(&self, lesson_id: Uuid) -> PortResult<Vec<Module>> {
        let records = sqlx::query_as::<_, ModuleRecord>(
            "SELECT id, lesson_id, title, position FROM modules WHERE lesson_id = $1 \
             ORDER BY position ASC",
        )
        .bind(lesson_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_sections(&self, module_id: Uuid) -> PortResult<Vec<Section>> {
        let records = sqlx::query_as::<_, SectionRecord>(
            "SELECT id, module_id, title, position FROM sections WHERE module_id = $1 \
             ORDER BY position ASC",
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Progress Tracking ---
    async fn upsert_section_progress(
        &self,
        user_id: Uuid,
        section_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO section_progress (user_id, section_id, completed_at) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id, section_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(section_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn upsert_module_progress(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO module_progress (user_id, module_id, completed_at) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id, module_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(module_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn upsert_lesson_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO lesson_progress (user_id, lesson_id, completed_at) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id, lesson_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(lesson_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn count_completed_sections(
        &self,
        user_id: Uuid,
        section_ids: &[Uuid],
    ) -> PortResult<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM section_progress WHERE user_id = $1 AND section_id = ANY($2)",
        )
        .bind(user_id)
        .bind(section_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count as usize)
    }

    async fn count_completed_modules(
        &self,
        user_id: Uuid,
        module_ids: &[Uuid],
    ) -> PortResult<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM module_progress WHERE user_id = $1 AND module_id = ANY($2)",
        )
        .bind(user_id)
        .bind(module_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count as usize)
    }

    async fn count_completed_lessons(
        &self,
        user_id: Uuid,
        lesson_ids: &[Uuid],
    ) -> PortResult<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM lesson_progress WHERE user_id = $1 AND lesson_id = ANY($2)",
        )
        .bind(user_id)
        .bind(lesson_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count as usize)
    }

    async fn update_course_progress(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        percent: i16,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        // COALESCE keeps the first completion timestamp across replays.
        sqlx::query(
            "UPDATE enrollments SET progress = $3, is_completed = $4, \
             completed_at = CASE WHEN $4 THEN COALESCE(enrollments.completed_at, $5) \
             ELSE NULL END \
             WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(percent)
        .bind(is_completed)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    // --- Enrollment Management ---
    async fn upsert_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_status: &str,
    ) -> PortResult<Enrollment> {
        // On conflict only the status is reasserted; progress and the
        // original payment_status survive replayed grants.
        let sql = format!(
            "INSERT INTO enrollments (id, user_id, course_id, status, payment_status) \
             VALUES ($1, $2, $3, 'active', $4) \
             ON CONFLICT (user_id, course_id) DO UPDATE SET status = 'active' \
             RETURNING {ENROLLMENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, EnrollmentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(course_id)
            .bind(payment_status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| missing_parent(e, format!("course {course_id}")))?;
        Ok(record.to_domain())
    }

    async fn get_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<Option<Enrollment>> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 AND course_id = $2"
        );
        let record = sqlx::query_as::<_, EnrollmentRecord>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn list_enrollments(&self, user_id: Uuid) -> PortResult<Vec<Enrollment>> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 \
             ORDER BY enrolled_at DESC"
        );
        let records = sqlx::query_as::<_, EnrollmentRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Payment Records ---
    async fn get_payment_by_reference(&self, reference: &str) -> PortResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1");
        let record = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn insert_payment(&self, payment: NewPayment) -> PortResult<Payment> {
        let sql = format!(
            "INSERT INTO payments \
             (id, user_id, course_id, reference, amount, currency, channel, plan_code, paid_at, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'recorded') \
             RETURNING {PAYMENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(payment.user_id)
            .bind(payment.course_id)
            .bind(&payment.reference)
            .bind(payment.amount)
            .bind(&payment.currency)
            .bind(&payment.channel)
            .bind(&payment.plan_code)
            .bind(payment.paid_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| duplicate(e, format!("payment {}", payment.reference)))?;
        Ok(record.to_domain())
    }

    async fn mark_payment_settled(&self, payment_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'settled', settled_at = NOW() WHERE id = $1",
        )
        .bind(payment_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("payment {payment_id}")));
        }
        Ok(())
    }

    async fn list_unsettled_payments(&self, limit: usize) -> PortResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE status = 'recorded' \
             ORDER BY recorded_at ASC LIMIT $1"
        );
        let records = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn record_stk_request(&self, request: NewStkRequest) -> PortResult<StkRequest> {
        let sql = format!(
            "INSERT INTO stk_requests \
             (checkout_request_id, merchant_request_id, user_id, course_id, amount, currency, phone_number) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {STK_REQUEST_COLUMNS}"
        );
        let record = sqlx::query_as::<_, StkRequestRecord>(&sql)
            .bind(&request.checkout_request_id)
            .bind(&request.merchant_request_id)
            .bind(request.user_id)
            .bind(request.course_id)
            .bind(request.amount)
            .bind(&request.currency)
            .bind(&request.phone_number)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| duplicate(e, format!("stk request {}", request.checkout_request_id)))?;
        Ok(record.to_domain())
    }

    async fn get_stk_request(
        &self,
        checkout_request_id: &str,
    ) -> PortResult<Option<StkRequest>> {
        let sql =
            format!("SELECT {STK_REQUEST_COLUMNS} FROM stk_requests WHERE checkout_request_id = $1");
        let record = sqlx::query_as::<_, StkRequestRecord>(&sql)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    // --- Invites ---
    async fn create_invite(&self, invite: NewInvite) -> PortResult<Invite> {
        let sql = format!(
            "INSERT INTO invites (id, course_id, email, token, invited_by, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {INVITE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, InviteRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(invite.course_id)
            .bind(&invite.email)
            .bind(&invite.token)
            .bind(invite.invited_by)
            .bind(invite.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| missing_parent(e, format!("course {}", invite.course_id)))?;
        Ok(record.to_domain())
    }

    async fn get_invite_by_token(&self, token: &str) -> PortResult<Invite> {
        let sql = format!("SELECT {INVITE_COLUMNS} FROM invites WHERE token = $1");
        let record = sqlx::query_as::<_, InviteRecord>(&sql)
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, "invite".to_string()))?;
        Ok(record.to_domain())
    }

    async fn mark_invite_accepted(&self, invite_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE invites SET accepted = TRUE WHERE id = $1")
            .bind(invite_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("invite {invite_id}")));
        }
        Ok(())
    }

    async fn list_invites_for_course(&self, course_id: Uuid) -> PortResult<Vec<Invite>> {
        let sql = format!(
            "SELECT {INVITE_COLUMNS} FROM invites WHERE course_id = $1 ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, InviteRecord>(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Discussions ---
    async fn create_thread(
        &self,
        course_id: Uuid,
        author_id: Uuid,
        title: &str,
    ) -> PortResult<DiscussionThread> {
        let record = sqlx::query_as::<_, ThreadRecord>(
            "INSERT INTO discussion_threads (id, course_id, author_id, title) \
             VALUES ($1, $2, $3, $4) RETURNING id, course_id, author_id, title, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(author_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, format!("course {course_id}")))?;
        Ok(record.to_domain())
    }

    async fn get_thread(&self, thread_id: Uuid) -> PortResult<DiscussionThread> {
        let record = sqlx::query_as::<_, ThreadRecord>(
            "SELECT id, course_id, author_id, title, created_at FROM discussion_threads \
             WHERE id = $1",
        )
        .bind(thread_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("thread {thread_id}")))?;
        Ok(record.to_domain())
    }

    async fn list_threads(&self, course_id: Uuid) -> PortResult<Vec<DiscussionThread>> {
        let records = sqlx::query_as::<_, ThreadRecord>(
            "SELECT id, course_id, author_id, title, created_at FROM discussion_threads \
             WHERE course_id = $1 ORDER BY created_at DESC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_message(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> PortResult<DiscussionMessage> {
        let sql = format!(
            "INSERT INTO discussion_messages (id, thread_id, author_id, body) \
             VALUES ($1, $2, $3, $4) RETURNING {MESSAGE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(thread_id)
            .bind(author_id)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| missing_parent(e, format!("thread {thread_id}")))?;
        Ok(record.to_domain())
    }

    async fn update_message(
        &self,
        message_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> PortResult<DiscussionMessage> {
        let owner = sqlx::query_scalar::<_, Uuid>(
            "SELECT author_id FROM discussion_messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("message {message_id}")))?;

        if owner != author_id {
            return Err(PortError::Unauthorized);
        }

        let sql = format!(
            "UPDATE discussion_messages SET body = $2, edited_at = NOW() WHERE id = $1 \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message_id)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found(e, format!("message {message_id}")))?;
        Ok(record.to_domain())
    }

    async fn list_messages(&self, thread_id: Uuid) -> PortResult<Vec<DiscussionMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM discussion_messages WHERE thread_id = $1 \
             ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Dashboard Reads ---
    async fn enrollment_summary(&self, user_id: Uuid) -> PortResult<EnrollmentSummary> {
        let record = sqlx::query_as::<_, SummaryRecord>(
            "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE is_completed) AS completed, \
             COUNT(*) FILTER (WHERE NOT is_completed) AS in_progress \
             FROM enrollments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(EnrollmentSummary {
            total: record.total,
            completed: record.completed,
            in_progress: record.in_progress,
        })
    }

    async fn list_active_courses(&self, user_id: Uuid) -> PortResult<Vec<EnrolledCourse>> {
        let records = sqlx::query_as::<_, EnrolledCourseRecord>(
            "SELECT c.id AS course_id, c.title, e.progress, e.is_completed, e.enrolled_at \
             FROM enrollments e JOIN courses c ON c.id = e.course_id \
             WHERE e.user_id = $1 AND e.status = 'active' \
             ORDER BY e.enrolled_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn section_completion_series(
        &self,
        user_id: Uuid,
        days: u32,
    ) -> PortResult<Vec<DailyCompletions>> {
        let cutoff = Utc::now() - Duration::days(days as i64);
        let records = sqlx::query_as::<_, DailyCompletionsRecord>(
            "SELECT completed_at::date AS date, COUNT(*) AS completed \
             FROM section_progress WHERE user_id = $1 AND completed_at >= $2 \
             GROUP BY 1 ORDER BY 1 ASC",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| DailyCompletions {
                date: r.date,
                completed: r.completed,
            })
            .collect())
    }
}
