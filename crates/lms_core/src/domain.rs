//! crates/lms_core/src/domain.rs
//!
//! Plain data types for the platform: users, the course content tree,
//! enrollments, payments, invites, and discussions. Nothing here knows
//! about storage or the wire.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

// The role a user acts in. Trainers own courses; learners enroll in them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Trainer,
    Learner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trainer => "trainer",
            Self::Learner => "learner",
        }
    }
}

impl From<&str> for UserRole {
    fn from(s: &str) -> Self {
        match s {
            "trainer" => Self::Trainer,
            _ => Self::Learner,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// Login-path view of a user; the only type that carries the hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// Input for creating a user at signup.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub hashed_password: String,
    pub role: UserRole,
}

/// A browser session; the id travels in the auth cookie.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle state of a course. Transitions only move forward:
/// draft -> published -> archived. There is no un-archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseStatus {
    Draft,
    Published,
    Archived,
}

impl CourseStatus {
    fn ordinal(&self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Published => 1,
            Self::Archived => 2,
        }
    }

    /// Whether moving to `next` is a legal (strictly forward) transition.
    pub fn can_advance_to(&self, next: CourseStatus) -> bool {
        next.ordinal() > self.ordinal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl From<&str> for CourseStatus {
    fn from(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

impl std::fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A course owned by a trainer. Content hangs off it as
/// lessons -> modules -> sections.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Price in major currency units (e.g. 5000.00 KES).
    pub price: Decimal,
    pub currency: String,
    pub status: CourseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a course. New courses always start as drafts.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub trainer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
}

/// A lesson groups modules under a course.
#[derive(Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
}

/// A module groups sections under a lesson.
#[derive(Debug, Clone)]
pub struct Module {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub title: String,
    pub position: i32,
}

/// The leaf of the content hierarchy; completion is recorded per section.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub position: i32,
}

/// Links a learner to a course and carries the course-level progress fields.
/// At most one row exists per (user_id, course_id).
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub status: String,
    /// How access was granted: "paid", "invited" or "free".
    pub payment_status: String,
    /// 0..=100, recomputed by the roll-up after each section completion.
    pub progress: i16,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
}

/// The caller-facing view of course-level completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseCompletion {
    pub percent: i16,
    pub is_completed: bool,
}

/// An immutable record of a confirmed transaction, keyed by the provider
/// reference. `status` is the settlement marker: "recorded" until the
/// enrollment side effect has been applied, then "settled".
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub reference: String,
    /// Amount in major currency units (minor units / 100 at the boundary).
    pub amount: Decimal,
    pub currency: String,
    /// "card" (Paystack) or "mobile_money" (M-Pesa).
    pub channel: String,
    pub plan_code: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub status: String,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_settled(&self) -> bool {
        self.status == "settled"
    }
}

/// A confirmed charge waiting to be recorded and settled.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub channel: String,
    pub plan_code: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// What the card gateway returns when a checkout is initialized.
#[derive(Debug, Clone)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// The gateway's view of a transaction looked up by reference.
#[derive(Debug, Clone)]
pub struct ChargeVerification {
    pub reference: String,
    /// Provider status string; only "success" grants access.
    pub status: String,
    /// Amount in the provider's minor currency unit (e.g. kobo, cents).
    pub amount_minor: i64,
    pub currency: String,
    pub channel: String,
    pub customer_email: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// The course tagged in the transaction metadata at initialize time.
    pub course_id: Option<Uuid>,
}

impl ChargeVerification {
    pub fn is_successful(&self) -> bool {
        self.status == "success"
    }
}

/// Handle returned by an STK push initiation.
#[derive(Debug, Clone)]
pub struct StkPushHandle {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
}

/// Result of querying an STK push by checkout request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StkStatus {
    /// The customer has not completed the prompt yet.
    Pending,
    /// Payment confirmed; carries the M-Pesa receipt number when present.
    Succeeded { receipt: Option<String> },
    /// Cancelled, timed out on the handset, or otherwise rejected.
    Failed { reason: String },
}

/// Context for an in-flight STK push, keyed by the checkout request id.
///
/// Daraja's asynchronous callback only carries provider identifiers, so the
/// user and course being paid for are persisted at initiation time and looked
/// up again when the confirmation arrives.
#[derive(Debug, Clone)]
pub struct StkRequest {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    /// Amount in major currency units.
    pub amount: Decimal,
    pub currency: String,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStkRequest {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub phone_number: String,
}

/// An email invitation to a course, redeemable once before `expires_at`.
#[derive(Debug, Clone)]
pub struct Invite {
    pub id: Uuid,
    pub course_id: Uuid,
    pub email: String,
    pub token: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewInvite {
    pub course_id: Uuid,
    pub email: String,
    pub token: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A course-scoped discussion thread.
#[derive(Debug, Clone)]
pub struct DiscussionThread {
    pub id: Uuid,
    pub course_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A message within a thread. The author may edit in place, which
/// sets `edited_at`.
#[derive(Debug, Clone)]
pub struct DiscussionMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Aggregate enrollment counts for a learner's dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentSummary {
    pub total: i64,
    pub completed: i64,
    pub in_progress: i64,
}

/// A course joined with the caller's enrollment progress.
#[derive(Debug, Clone)]
pub struct EnrolledCourse {
    pub course_id: Uuid,
    pub title: String,
    pub progress: i16,
    pub is_completed: bool,
    pub enrolled_at: DateTime<Utc>,
}

/// One day of section-completion counts, for the dashboard chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCompletions {
    pub date: chrono::NaiveDate,
    pub completed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_status_moves_forward_only() {
        assert!(CourseStatus::Draft.can_advance_to(CourseStatus::Published));
        assert!(CourseStatus::Published.can_advance_to(CourseStatus::Archived));
        assert!(CourseStatus::Draft.can_advance_to(CourseStatus::Archived));

        assert!(!CourseStatus::Published.can_advance_to(CourseStatus::Draft));
        assert!(!CourseStatus::Archived.can_advance_to(CourseStatus::Published));
        assert!(!CourseStatus::Archived.can_advance_to(CourseStatus::Archived));
    }

    #[test]
    fn course_status_round_trips_through_strings() {
        for status in [CourseStatus::Draft, CourseStatus::Published, CourseStatus::Archived] {
            assert_eq!(CourseStatus::from(status.as_str()), status);
        }
    }

    #[test]
    fn invite_expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let invite = Invite {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            email: "learner@example.com".into(),
            token: "tok".into(),
            invited_by: Uuid::new_v4(),
            expires_at: now,
            accepted: false,
            created_at: now - chrono::Duration::days(7),
        };
        assert!(invite.is_expired(now));
        assert!(!invite.is_expired(now - chrono::Duration::seconds(1)));
    }
}
