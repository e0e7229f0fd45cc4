//! crates/lms_core/src/memory.rs
//!
//! An in-memory `DatabaseService` backed by hash maps behind one async
//! RwLock. It enforces the same uniqueness rules as the SQL schema
//! (email, payment reference, one enrollment per learner and course), so
//! the services behave identically when tested against it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    AuthSession, ChargeVerification, Course, CourseStatus, DailyCompletions, DiscussionMessage,
    DiscussionThread, EnrolledCourse, Enrollment, EnrollmentSummary, InitializedTransaction,
    Invite, Lesson, Module, NewCourse, NewInvite, NewPayment, NewStkRequest, NewUser, Payment,
    Section, StkPushHandle, StkRequest, StkStatus, User, UserCredentials,
};
use crate::ports::{DatabaseService, PortError, PortResult};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    credentials: HashMap<String, UserCredentials>,
    auth_sessions: HashMap<String, AuthSession>,
    courses: HashMap<Uuid, Course>,
    lessons: HashMap<Uuid, Lesson>,
    modules: HashMap<Uuid, Module>,
    sections: HashMap<Uuid, Section>,
    section_progress: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    module_progress: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    lesson_progress: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    enrollments: HashMap<(Uuid, Uuid), Enrollment>,
    payments: HashMap<String, Payment>,
    stk_requests: HashMap<String, StkRequest>,
    invites: HashMap<Uuid, Invite>,
    threads: HashMap<Uuid, DiscussionThread>,
    messages: HashMap<Uuid, DiscussionMessage>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatabaseService for MemoryStore {
    // --- User Management ---
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let mut inner = self.inner.write().await;
        if inner.credentials.contains_key(&user.email) {
            return Err(PortError::AlreadyExists(format!("user {}", user.email)));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            full_name: user.full_name,
            role: user.role,
            created_at: Utc::now(),
        };
        inner.credentials.insert(
            user.email.clone(),
            UserCredentials {
                user_id: created.id,
                email: user.email,
                hashed_password: user.hashed_password,
            },
        );
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let inner = self.inner.read().await;
        inner
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let inner = self.inner.read().await;
        inner
            .credentials
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("user {email}")))
    }

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        inner.auth_sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let inner = self.inner.read().await;
        match inner.auth_sessions.get(session_id) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        inner.auth_sessions.remove(session_id);
        Ok(())
    }

    // --- Course Management ---
    async fn create_course(&self, course: NewCourse) -> PortResult<Course> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let created = Course {
            id: Uuid::new_v4(),
            trainer_id: course.trainer_id,
            title: course.title,
            description: course.description,
            price: course.price,
            currency: course.currency,
            status: CourseStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        inner.courses.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let inner = self.inner.read().await;
        inner
            .courses
            .get(&course_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("course {course_id}")))
    }

    async fn list_published_courses(&self) -> PortResult<Vec<Course>> {
        let inner = self.inner.read().await;
        let mut courses: Vec<Course> = inner
            .courses
            .values()
            .filter(|c| c.status == CourseStatus::Published)
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }

    async fn list_courses_by_trainer(&self, trainer_id: Uuid) -> PortResult<Vec<Course>> {
        let inner = self.inner.read().await;
        let mut courses: Vec<Course> = inner
            .courses
            .values()
            .filter(|c| c.trainer_id == trainer_id)
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }

    async fn set_course_status(
        &self,
        course_id: Uuid,
        status: CourseStatus,
    ) -> PortResult<Course> {
        let mut inner = self.inner.write().await;
        let course = inner
            .courses
            .get_mut(&course_id)
            .ok_or_else(|| PortError::NotFound(format!("course {course_id}")))?;
        course.status = status;
        course.updated_at = Utc::now();
        Ok(course.clone())
    }

    // --- Content Hierarchy ---
    async fn create_lesson(
        &self,
        course_id: Uuid,
        title: &str,
        position: i32,
    ) -> PortResult<Lesson> {
        let mut inner = self.inner.write().await;
        if !inner.courses.contains_key(&course_id) {
            return Err(PortError::NotFound(format!("course {course_id}")));
        }
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id,
            title: title.to_string(),
            position,
        };
        inner.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn create_module(
        &self,
        lesson_id: Uuid,
        title: &str,
        position: i32,
    ) -> PortResult<Module> {
        let mut inner = self.inner.write().await;
        if !inner.lessons.contains_key(&lesson_id) {
            return Err(PortError::NotFound(format!("lesson {lesson_id}")));
        }
        let module = Module {
            id: Uuid::new_v4(),
            lesson_id,
            title: title.to_string(),
            position,
        };
        inner.modules.insert(module.id, module.clone());
        Ok(module)
    }

    async fn create_section(
        &self,
        module_id: Uuid,
        title: &str,
        position: i32,
    ) -> PortResult<Section> {
        let mut inner = self.inner.write().await;
        if !inner.modules.contains_key(&module_id) {
            return Err(PortError::NotFound(format!("module {module_id}")));
        }
        let section = Section {
            id: Uuid::new_v4(),
            module_id,
            title: title.to_string(),
            position,
        };
        inner.sections.insert(section.id, section.clone());
        Ok(section)
    }

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        let inner = self.inner.read().await;
        inner
            .lessons
            .get(&lesson_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("lesson {lesson_id}")))
    }

    async fn get_module(&self, module_id: Uuid) -> PortResult<Module> {
        let inner = self.inner.read().await;
        inner
            .modules
            .get(&module_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("module {module_id}")))
    }

    async fn get_section(&self, section_id: Uuid) -> PortResult<Section> {
        let inner = self.inner.read().await;
        inner
            .sections
            .get(&section_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("section {section_id}")))
    }

    async fn list_lessons(&self, course_id: Uuid) -> PortResult<Vec<Lesson>> {
        let inner = self.inner.read().await;
        let mut lessons: Vec<Lesson> = inner
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.position);
        Ok(lessons)
    }

    async fn list_modules(&self, lesson_id: Uuid) -> PortResult<Vec<Module>> {
        let inner = self.inner.read().await;
        let mut modules: Vec<Module> = inner
            .modules
            .values()
            .filter(|m| m.lesson_id == lesson_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.position);
        Ok(modules)
    }

    async fn list_sections(&self, module_id: Uuid) -> PortResult<Vec<Section>> {
        let inner = self.inner.read().await;
        let mut sections: Vec<Section> = inner
            .sections
            .values()
            .filter(|s| s.module_id == module_id)
            .cloned()
            .collect();
        sections.sort_by_key(|s| s.position);
        Ok(sections)
    }

    // --- Progress Tracking ---
    async fn upsert_section_progress(
        &self,
        user_id: Uuid,
        section_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .section_progress
            .entry((user_id, section_id))
            .or_insert(completed_at);
        Ok(())
    }

    async fn upsert_module_progress(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .module_progress
            .entry((user_id, module_id))
            .or_insert(completed_at);
        Ok(())
    }

    async fn upsert_lesson_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .lesson_progress
            .entry((user_id, lesson_id))
            .or_insert(completed_at);
        Ok(())
    }

    async fn count_completed_sections(
        &self,
        user_id: Uuid,
        section_ids: &[Uuid],
    ) -> PortResult<usize> {
        let inner = self.inner.read().await;
        Ok(section_ids
            .iter()
            .filter(|id| inner.section_progress.contains_key(&(user_id, **id)))
            .count())
    }

    async fn count_completed_modules(
        &self,
        user_id: Uuid,
        module_ids: &[Uuid],
    ) -> PortResult<usize> {
        let inner = self.inner.read().await;
        Ok(module_ids
            .iter()
            .filter(|id| inner.module_progress.contains_key(&(user_id, **id)))
            .count())
    }

    async fn count_completed_lessons(
        &self,
        user_id: Uuid,
        lesson_ids: &[Uuid],
    ) -> PortResult<usize> {
        let inner = self.inner.read().await;
        Ok(lesson_ids
            .iter()
            .filter(|id| inner.lesson_progress.contains_key(&(user_id, **id)))
            .count())
    }

    async fn update_course_progress(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        percent: i16,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        // No enrollment means nothing to update, same as an UPDATE
        // matching zero rows.
        if let Some(enrollment) = inner.enrollments.get_mut(&(user_id, course_id)) {
            enrollment.progress = percent;
            enrollment.is_completed = is_completed;
            enrollment.completed_at = if is_completed {
                enrollment.completed_at.or(completed_at)
            } else {
                None
            };
        }
        Ok(())
    }

    // --- Enrollment Management ---
    async fn upsert_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_status: &str,
    ) -> PortResult<Enrollment> {
        let mut inner = self.inner.write().await;
        if !inner.courses.contains_key(&course_id) {
            return Err(PortError::NotFound(format!("course {course_id}")));
        }

        let enrollment = inner
            .enrollments
            .entry((user_id, course_id))
            .and_modify(|e| e.status = "active".to_string())
            .or_insert_with(|| Enrollment {
                id: Uuid::new_v4(),
                user_id,
                course_id,
                status: "active".to_string(),
                payment_status: payment_status.to_string(),
                progress: 0,
                is_completed: false,
                completed_at: None,
                enrolled_at: Utc::now(),
            });
        Ok(enrollment.clone())
    }

    async fn get_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<Option<Enrollment>> {
        let inner = self.inner.read().await;
        Ok(inner.enrollments.get(&(user_id, course_id)).cloned())
    }

    async fn list_enrollments(&self, user_id: Uuid) -> PortResult<Vec<Enrollment>> {
        let inner = self.inner.read().await;
        let mut enrollments: Vec<Enrollment> = inner
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(enrollments)
    }

    // --- Payment Records ---
    async fn get_payment_by_reference(&self, reference: &str) -> PortResult<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner.payments.get(reference).cloned())
    }

    async fn insert_payment(&self, payment: NewPayment) -> PortResult<Payment> {
        let mut inner = self.inner.write().await;
        if inner.payments.contains_key(&payment.reference) {
            return Err(PortError::AlreadyExists(format!(
                "payment {}",
                payment.reference
            )));
        }

        let stored = Payment {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            course_id: payment.course_id,
            reference: payment.reference.clone(),
            amount: payment.amount,
            currency: payment.currency,
            channel: payment.channel,
            plan_code: payment.plan_code,
            paid_at: payment.paid_at,
            recorded_at: Utc::now(),
            status: "recorded".to_string(),
            settled_at: None,
        };
        inner.payments.insert(payment.reference, stored.clone());
        Ok(stored)
    }

    async fn mark_payment_settled(&self, payment_id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        let payment = inner
            .payments
            .values_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| PortError::NotFound(format!("payment {payment_id}")))?;
        payment.status = "settled".to_string();
        payment.settled_at = Some(Utc::now());
        Ok(())
    }

    async fn list_unsettled_payments(&self, limit: usize) -> PortResult<Vec<Payment>> {
        let inner = self.inner.read().await;
        let mut stuck: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| !p.is_settled())
            .cloned()
            .collect();
        stuck.sort_by_key(|p| p.recorded_at);
        stuck.truncate(limit);
        Ok(stuck)
    }

    async fn record_stk_request(&self, request: NewStkRequest) -> PortResult<StkRequest> {
        let mut inner = self.inner.write().await;
        if inner.stk_requests.contains_key(&request.checkout_request_id) {
            return Err(PortError::AlreadyExists(format!(
                "stk request {}",
                request.checkout_request_id
            )));
        }
        let stored = StkRequest {
            checkout_request_id: request.checkout_request_id.clone(),
            merchant_request_id: request.merchant_request_id,
            user_id: request.user_id,
            course_id: request.course_id,
            amount: request.amount,
            currency: request.currency,
            phone_number: request.phone_number,
            created_at: Utc::now(),
        };
        inner
            .stk_requests
            .insert(request.checkout_request_id, stored.clone());
        Ok(stored)
    }

    async fn get_stk_request(
        &self,
        checkout_request_id: &str,
    ) -> PortResult<Option<StkRequest>> {
        let inner = self.inner.read().await;
        Ok(inner.stk_requests.get(checkout_request_id).cloned())
    }

    // --- Invites ---
    async fn create_invite(&self, invite: NewInvite) -> PortResult<Invite> {
        let mut inner = self.inner.write().await;
        if !inner.courses.contains_key(&invite.course_id) {
            return Err(PortError::NotFound(format!("course {}", invite.course_id)));
        }
        let created = Invite {
            id: Uuid::new_v4(),
            course_id: invite.course_id,
            email: invite.email,
            token: invite.token,
            invited_by: invite.invited_by,
            expires_at: invite.expires_at,
            accepted: false,
            created_at: Utc::now(),
        };
        inner.invites.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_invite_by_token(&self, token: &str) -> PortResult<Invite> {
        let inner = self.inner.read().await;
        inner
            .invites
            .values()
            .find(|i| i.token == token)
            .cloned()
            .ok_or_else(|| PortError::NotFound("invite".to_string()))
    }

    async fn mark_invite_accepted(&self, invite_id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.write().await;
        let invite = inner
            .invites
            .get_mut(&invite_id)
            .ok_or_else(|| PortError::NotFound(format!("invite {invite_id}")))?;
        invite.accepted = true;
        Ok(())
    }

    async fn list_invites_for_course(&self, course_id: Uuid) -> PortResult<Vec<Invite>> {
        let inner = self.inner.read().await;
        let mut invites: Vec<Invite> = inner
            .invites
            .values()
            .filter(|i| i.course_id == course_id)
            .cloned()
            .collect();
        invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invites)
    }

    // --- Discussions ---
    async fn create_thread(
        &self,
        course_id: Uuid,
        author_id: Uuid,
        title: &str,
    ) -> PortResult<DiscussionThread> {
        let mut inner = self.inner.write().await;
        if !inner.courses.contains_key(&course_id) {
            return Err(PortError::NotFound(format!("course {course_id}")));
        }
        let thread = DiscussionThread {
            id: Uuid::new_v4(),
            course_id,
            author_id,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        inner.threads.insert(thread.id, thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: Uuid) -> PortResult<DiscussionThread> {
        let inner = self.inner.read().await;
        inner
            .threads
            .get(&thread_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("thread {thread_id}")))
    }

    async fn list_threads(&self, course_id: Uuid) -> PortResult<Vec<DiscussionThread>> {
        let inner = self.inner.read().await;
        let mut threads: Vec<DiscussionThread> = inner
            .threads
            .values()
            .filter(|t| t.course_id == course_id)
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(threads)
    }

    async fn create_message(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> PortResult<DiscussionMessage> {
        let mut inner = self.inner.write().await;
        if !inner.threads.contains_key(&thread_id) {
            return Err(PortError::NotFound(format!("thread {thread_id}")));
        }
        let message = DiscussionMessage {
            id: Uuid::new_v4(),
            thread_id,
            author_id,
            body: body.to_string(),
            created_at: Utc::now(),
            edited_at: None,
        };
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn update_message(
        &self,
        message_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> PortResult<DiscussionMessage> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| PortError::NotFound(format!("message {message_id}")))?;
        if message.author_id != author_id {
            return Err(PortError::Unauthorized);
        }
        message.body = body.to_string();
        message.edited_at = Some(Utc::now());
        Ok(message.clone())
    }

    async fn list_messages(&self, thread_id: Uuid) -> PortResult<Vec<DiscussionMessage>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<DiscussionMessage> = inner
            .messages
            .values()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    // --- Dashboard Reads ---
    async fn enrollment_summary(&self, user_id: Uuid) -> PortResult<EnrollmentSummary> {
        let inner = self.inner.read().await;
        let mut summary = EnrollmentSummary::default();
        for enrollment in inner.enrollments.values().filter(|e| e.user_id == user_id) {
            summary.total += 1;
            if enrollment.is_completed {
                summary.completed += 1;
            } else {
                summary.in_progress += 1;
            }
        }
        Ok(summary)
    }

    async fn list_active_courses(&self, user_id: Uuid) -> PortResult<Vec<EnrolledCourse>> {
        let inner = self.inner.read().await;
        let mut active: Vec<EnrolledCourse> = inner
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id && e.status == "active")
            .filter_map(|e| {
                inner.courses.get(&e.course_id).map(|c| EnrolledCourse {
                    course_id: c.id,
                    title: c.title.clone(),
                    progress: e.progress,
                    is_completed: e.is_completed,
                    enrolled_at: e.enrolled_at,
                })
            })
            .collect();
        active.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(active)
    }

    async fn section_completion_series(
        &self,
        user_id: Uuid,
        days: u32,
    ) -> PortResult<Vec<DailyCompletions>> {
        let inner = self.inner.read().await;
        let cutoff = Utc::now() - Duration::days(days as i64);

        let mut by_day: HashMap<chrono::NaiveDate, i64> = HashMap::new();
        for ((uid, _), completed_at) in &inner.section_progress {
            if *uid == user_id && *completed_at >= cutoff {
                *by_day.entry(completed_at.date_naive()).or_insert(0) += 1;
            }
        }

        let mut series: Vec<DailyCompletions> = by_day
            .into_iter()
            .map(|(date, completed)| DailyCompletions { date, completed })
            .collect();
        series.sort_by_key(|d| d.date);
        Ok(series)
    }
}

//=========================================================================================
// Gateway stand-ins for tests and local runs
//=========================================================================================

/// A `CardPaymentGateway` that approves everything. The reported charge is
/// configured up front so settlement tests control amounts and references.
#[derive(Clone)]
pub struct StaticCardGateway {
    verification: Arc<RwLock<HashMap<String, ChargeVerification>>>,
}

impl Default for StaticCardGateway {
    fn default() -> Self {
        Self {
            verification: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl StaticCardGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the verification result returned for `reference`.
    pub async fn stage_charge(&self, charge: ChargeVerification) {
        let mut map = self.verification.write().await;
        map.insert(charge.reference.clone(), charge);
    }
}

#[async_trait]
impl crate::ports::CardPaymentGateway for StaticCardGateway {
    async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: i64,
        currency: &str,
        _plan_code: Option<&str>,
        _user_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<InitializedTransaction> {
        let reference = format!("ref_{}", Uuid::new_v4().simple());
        // Every initialized checkout is immediately verifiable as paid.
        self.stage_charge(ChargeVerification {
            reference: reference.clone(),
            status: "success".to_string(),
            amount_minor,
            currency: currency.to_string(),
            channel: "card".to_string(),
            customer_email: Some(email.to_string()),
            paid_at: Some(Utc::now()),
            course_id: Some(course_id),
        })
        .await;
        Ok(InitializedTransaction {
            authorization_url: format!("https://checkout.example.com/{reference}"),
            access_code: format!("ac_{}", Uuid::new_v4().simple()),
            reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> PortResult<ChargeVerification> {
        let map = self.verification.read().await;
        map.get(reference)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("transaction {reference}")))
    }
}

/// A `MobileMoneyGateway` whose status answers are staged by tests.
#[derive(Clone)]
pub struct StaticMobileGateway {
    statuses: Arc<RwLock<HashMap<String, StkStatus>>>,
}

impl Default for StaticMobileGateway {
    fn default() -> Self {
        Self {
            statuses: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl StaticMobileGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stage_status(&self, checkout_request_id: &str, status: StkStatus) {
        let mut map = self.statuses.write().await;
        map.insert(checkout_request_id.to_string(), status);
    }
}

#[async_trait]
impl crate::ports::MobileMoneyGateway for StaticMobileGateway {
    async fn stk_push(
        &self,
        _phone_number: &str,
        _amount: rust_decimal::Decimal,
        _account_reference: &str,
    ) -> PortResult<StkPushHandle> {
        Ok(StkPushHandle {
            merchant_request_id: format!("mr_{}", Uuid::new_v4().simple()),
            checkout_request_id: format!("ws_CO_{}", Uuid::new_v4().simple()),
        })
    }

    async fn query_status(&self, checkout_request_id: &str) -> PortResult<StkStatus> {
        let map = self.statuses.read().await;
        Ok(map
            .get(checkout_request_id)
            .cloned()
            .unwrap_or(StkStatus::Pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_payment(reference: &str) -> NewPayment {
        NewPayment {
            user_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            reference: reference.to_string(),
            amount: dec!(5000.00),
            currency: "KES".to_string(),
            channel: "card".to_string(),
            plan_code: None,
            paid_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_payment_reference_is_rejected() {
        let store = MemoryStore::new();
        store.insert_payment(sample_payment("ref_1")).await.unwrap();

        let err = store.insert_payment(sample_payment("ref_1")).await;
        assert!(matches!(err, Err(PortError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn enrollment_upsert_keeps_the_existing_row() {
        let store = MemoryStore::new();
        let trainer = Uuid::new_v4();
        let learner = Uuid::new_v4();
        let course = store
            .create_course(NewCourse {
                trainer_id: trainer,
                title: "Rust".into(),
                description: None,
                price: dec!(0),
                currency: "KES".into(),
            })
            .await
            .unwrap();

        let first = store
            .upsert_enrollment(learner, course.id, "paid")
            .await
            .unwrap();
        store
            .update_course_progress(learner, course.id, 40, false, None)
            .await
            .unwrap();

        let second = store
            .upsert_enrollment(learner, course.id, "invited")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.payment_status, "paid");
        assert_eq!(second.progress, 40);
    }

    #[tokio::test]
    async fn duplicate_email_signup_is_rejected() {
        let store = MemoryStore::new();
        let user = NewUser {
            email: "learner@example.com".into(),
            full_name: "Learner".into(),
            hashed_password: "hash".into(),
            role: crate::domain::UserRole::Learner,
        };
        store.create_user(user.clone()).await.unwrap();

        let err = store.create_user(user).await;
        assert!(matches!(err, Err(PortError::AlreadyExists(_))));
    }
}
