//! services/api/tests/common/mod.rs
//!
//! Harness for exercising the web handlers against the in-memory store
//! and the static payment gateways, with no network or Postgres.

use std::sync::Arc;

use api_lib::config::Config;
use api_lib::web::state::AppState;
use axum::response::Response;
use lms_core::domain::{Course, CourseStatus, NewCourse, NewUser, Section, User, UserRole};
use lms_core::memory::{MemoryStore, StaticCardGateway, StaticMobileGateway};
use lms_core::ports::DatabaseService;
use rust_decimal::Decimal;
use uuid::Uuid;

pub const PAYSTACK_TEST_SECRET: &str = "sk_test_webhook_secret";

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub card_gateway: StaticCardGateway,
    pub mobile_gateway: StaticMobileGateway,
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().expect("bind address"),
        database_url: String::new(),
        log_level: tracing::Level::INFO,
        paystack_secret_key: PAYSTACK_TEST_SECRET.to_string(),
        paystack_base_url: "https://api.paystack.co".to_string(),
        mpesa_base_url: "https://sandbox.safaricom.co.ke".to_string(),
        mpesa_consumer_key: "consumer_key".to_string(),
        mpesa_consumer_secret: "consumer_secret".to_string(),
        mpesa_shortcode: "174379".to_string(),
        mpesa_passkey: "passkey".to_string(),
        mpesa_callback_url: "https://example.com/api/mpesa/callback".to_string(),
        reconcile_interval_secs: 300,
    }
}

pub fn harness() -> TestHarness {
    let store = MemoryStore::new();
    let card_gateway = StaticCardGateway::new();
    let mobile_gateway = StaticMobileGateway::new();
    let state = Arc::new(AppState::new(
        Arc::new(store.clone()),
        Arc::new(test_config()),
        Arc::new(card_gateway.clone()),
        Arc::new(mobile_gateway.clone()),
    ));
    TestHarness {
        state,
        store,
        card_gateway,
        mobile_gateway,
    }
}

pub async fn trainer(store: &MemoryStore) -> User {
    store
        .create_user(NewUser {
            email: format!("trainer+{}@example.com", Uuid::new_v4().simple()),
            full_name: "Grace Mwangi".to_string(),
            hashed_password: "not-a-real-hash".to_string(),
            role: UserRole::Trainer,
        })
        .await
        .expect("create trainer")
}

pub async fn learner(store: &MemoryStore) -> User {
    store
        .create_user(NewUser {
            email: format!("learner+{}@example.com", Uuid::new_v4().simple()),
            full_name: "Brian Otieno".to_string(),
            hashed_password: "not-a-real-hash".to_string(),
            role: UserRole::Learner,
        })
        .await
        .expect("create learner")
}

pub async fn published_course(store: &MemoryStore, trainer_id: Uuid, price: Decimal) -> Course {
    let course = store
        .create_course(NewCourse {
            trainer_id,
            title: "Intro to Bookkeeping".to_string(),
            description: Some("Double-entry from scratch".to_string()),
            price,
            currency: "KES".to_string(),
        })
        .await
        .expect("create course");
    store
        .set_course_status(course.id, CourseStatus::Published)
        .await
        .expect("publish course")
}

/// A published course with one lesson, one module, and `sections`
/// sections under it.
pub async fn course_with_sections(
    store: &MemoryStore,
    trainer_id: Uuid,
    price: Decimal,
    sections: usize,
) -> (Course, Vec<Section>) {
    let course = published_course(store, trainer_id, price).await;
    let lesson = store
        .create_lesson(course.id, "Week 1", 1)
        .await
        .expect("create lesson");
    let module = store
        .create_module(lesson.id, "Ledgers", 1)
        .await
        .expect("create module");
    let mut created = Vec::with_capacity(sections);
    for i in 0..sections {
        let section = store
            .create_section(module.id, &format!("Part {}", i + 1), (i + 1) as i32)
            .await
            .expect("create section");
        created.push(section);
    }
    (course, created)
}

/// A published course with `lessons` lessons, each holding one module
/// with a single section. Finishing a returned section finishes its
/// whole lesson, so the course percent moves in visible steps.
pub async fn course_with_lessons(
    store: &MemoryStore,
    trainer_id: Uuid,
    price: Decimal,
    lessons: usize,
) -> (Course, Vec<Section>) {
    let course = published_course(store, trainer_id, price).await;
    let mut created = Vec::with_capacity(lessons);
    for i in 0..lessons {
        let lesson = store
            .create_lesson(course.id, &format!("Week {}", i + 1), (i + 1) as i32)
            .await
            .expect("create lesson");
        let module = store
            .create_module(lesson.id, "Core ideas", 1)
            .await
            .expect("create module");
        let section = store
            .create_section(module.id, "Reading", 1)
            .await
            .expect("create section");
        created.push(section);
    }
    (course, created)
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
