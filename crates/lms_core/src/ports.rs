//! crates/lms_core/src/ports.rs
//!
//! The traits the domain services are written against. Storage and the
//! two payment providers sit behind these, so the roll-up and settlement
//! logic never sees sqlx or HTTP directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    ChargeVerification, Course, CourseStatus, DailyCompletions, DiscussionMessage,
    DiscussionThread, EnrolledCourse, Enrollment, EnrollmentSummary, InitializedTransaction,
    Invite, Lesson, Module, NewCourse, NewInvite, NewPayment, NewStkRequest, NewUser, Payment,
    Section, StkPushHandle, StkRequest, StkStatus, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// What any port call can fail with. Adapters fold their own error types
/// (sqlx, reqwest) into these four cases.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness rule was hit (duplicate email, payment reference, ...).
    /// Callers use this to detect concurrent duplicate writes.
    #[error("Item already exists: {0}")]
    AlreadyExists(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Course Management ---
    async fn create_course(&self, course: NewCourse) -> PortResult<Course>;

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course>;

    async fn list_published_courses(&self) -> PortResult<Vec<Course>>;

    async fn list_courses_by_trainer(&self, trainer_id: Uuid) -> PortResult<Vec<Course>>;

    async fn set_course_status(&self, course_id: Uuid, status: CourseStatus)
        -> PortResult<Course>;

    // --- Content Hierarchy ---
    async fn create_lesson(&self, course_id: Uuid, title: &str, position: i32)
        -> PortResult<Lesson>;

    async fn create_module(&self, lesson_id: Uuid, title: &str, position: i32)
        -> PortResult<Module>;

    async fn create_section(
        &self,
        module_id: Uuid,
        title: &str,
        position: i32,
    ) -> PortResult<Section>;

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson>;

    async fn get_module(&self, module_id: Uuid) -> PortResult<Module>;

    async fn get_section(&self, section_id: Uuid) -> PortResult<Section>;

    async fn list_lessons(&self, course_id: Uuid) -> PortResult<Vec<Lesson>>;

    async fn list_modules(&self, lesson_id: Uuid) -> PortResult<Vec<Module>>;

    async fn list_sections(&self, module_id: Uuid) -> PortResult<Vec<Section>>;

    // --- Progress Tracking ---
    async fn upsert_section_progress(
        &self,
        user_id: Uuid,
        section_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn upsert_module_progress(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn upsert_lesson_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn count_completed_sections(&self, user_id: Uuid, section_ids: &[Uuid])
        -> PortResult<usize>;

    async fn count_completed_modules(&self, user_id: Uuid, module_ids: &[Uuid])
        -> PortResult<usize>;

    async fn count_completed_lessons(&self, user_id: Uuid, lesson_ids: &[Uuid])
        -> PortResult<usize>;

    /// Writes the rolled-up percent onto the learner's enrollment row.
    async fn update_course_progress(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        percent: i16,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> PortResult<()>;

    // --- Enrollment Management ---
    /// Inserts the enrollment, or reactivates the existing row on conflict.
    /// Existing progress is never reset by a replayed grant.
    async fn upsert_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_status: &str,
    ) -> PortResult<Enrollment>;

    async fn get_enrollment(&self, user_id: Uuid, course_id: Uuid)
        -> PortResult<Option<Enrollment>>;

    async fn list_enrollments(&self, user_id: Uuid) -> PortResult<Vec<Enrollment>>;

    // --- Payment Records ---
    async fn get_payment_by_reference(&self, reference: &str) -> PortResult<Option<Payment>>;

    /// Inserts a confirmed charge with status "recorded". Returns
    /// `PortError::AlreadyExists` when the reference was already stored.
    async fn insert_payment(&self, payment: NewPayment) -> PortResult<Payment>;

    async fn mark_payment_settled(&self, payment_id: Uuid) -> PortResult<()>;

    async fn list_unsettled_payments(&self, limit: usize) -> PortResult<Vec<Payment>>;

    /// Stores the user/course context of an in-flight STK push so the
    /// asynchronous callback can resolve it later.
    async fn record_stk_request(&self, request: NewStkRequest) -> PortResult<StkRequest>;

    async fn get_stk_request(&self, checkout_request_id: &str)
        -> PortResult<Option<StkRequest>>;

    // --- Invites ---
    async fn create_invite(&self, invite: NewInvite) -> PortResult<Invite>;

    async fn get_invite_by_token(&self, token: &str) -> PortResult<Invite>;

    async fn mark_invite_accepted(&self, invite_id: Uuid) -> PortResult<()>;

    async fn list_invites_for_course(&self, course_id: Uuid) -> PortResult<Vec<Invite>>;

    // --- Discussions ---
    async fn create_thread(
        &self,
        course_id: Uuid,
        author_id: Uuid,
        title: &str,
    ) -> PortResult<DiscussionThread>;

    async fn get_thread(&self, thread_id: Uuid) -> PortResult<DiscussionThread>;

    async fn list_threads(&self, course_id: Uuid) -> PortResult<Vec<DiscussionThread>>;

    async fn create_message(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> PortResult<DiscussionMessage>;

    /// Edits a message body in place. Fails with `Unauthorized` when
    /// `author_id` is not the original author.
    async fn update_message(
        &self,
        message_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> PortResult<DiscussionMessage>;

    async fn list_messages(&self, thread_id: Uuid) -> PortResult<Vec<DiscussionMessage>>;

    // --- Dashboard Reads ---
    async fn enrollment_summary(&self, user_id: Uuid) -> PortResult<EnrollmentSummary>;

    async fn list_active_courses(&self, user_id: Uuid) -> PortResult<Vec<EnrolledCourse>>;

    async fn section_completion_series(
        &self,
        user_id: Uuid,
        days: u32,
    ) -> PortResult<Vec<DailyCompletions>>;
}

/// Card checkout via a hosted payment page (Paystack-style).
#[async_trait]
pub trait CardPaymentGateway: Send + Sync {
    /// Creates a checkout and returns the redirect URL plus the reference
    /// to verify later. The user and course are tagged into the transaction
    /// metadata so webhook and verify flows can resolve them.
    async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: i64,
        currency: &str,
        plan_code: Option<&str>,
        user_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<InitializedTransaction>;

    /// Looks a transaction up by reference and reports the provider's view.
    async fn verify_transaction(&self, reference: &str) -> PortResult<ChargeVerification>;
}

/// Mobile money checkout pushed to the customer's handset (M-Pesa STK).
#[async_trait]
pub trait MobileMoneyGateway: Send + Sync {
    async fn stk_push(
        &self,
        phone_number: &str,
        amount: Decimal,
        account_reference: &str,
    ) -> PortResult<StkPushHandle>;

    async fn query_status(&self, checkout_request_id: &str) -> PortResult<StkStatus>;
}
