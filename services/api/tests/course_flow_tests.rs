//! services/api/tests/course_flow_tests.rs
//!
//! Drives the course lifecycle and content authoring handlers directly,
//! over the in-memory store.

mod common;

use api_lib::web::courses::{
    archive_course_handler, create_course_handler, create_lesson_handler, create_module_handler,
    create_section_handler, get_course_handler, list_courses_handler, list_sections_handler,
    publish_course_handler, CreateContentRequest, CreateCourseRequest,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::{body_json, harness, learner, trainer};
use lms_core::ports::DatabaseService;
use rust_decimal_macros::dec;

#[tokio::test]
async fn a_course_walks_draft_published_archived() {
    let h = harness();
    let owner = trainer(&h.store).await;

    let created = create_course_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Json(CreateCourseRequest {
            title: "Farm Accounting".to_string(),
            description: None,
            price: Some(dec!(2500.00)),
            currency: None,
        }),
    )
    .await
    .expect("create course")
    .into_response();
    assert_eq!(created.status(), StatusCode::CREATED);
    let course = body_json(created).await;
    assert_eq!(course["status"], "draft");
    assert_eq!(course["currency"], "KES");
    let course_id = course["id"].as_str().unwrap().parse().unwrap();

    let published = publish_course_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Path(course_id),
    )
    .await
    .expect("publish")
    .into_response();
    assert_eq!(body_json(published).await["status"], "published");

    let archived = archive_course_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Path(course_id),
    )
    .await
    .expect("archive")
    .into_response();
    assert_eq!(body_json(archived).await["status"], "archived");
}

#[tokio::test]
async fn learners_cannot_create_courses() {
    let h = harness();
    let user = learner(&h.store).await;

    let err = create_course_handler(
        State(h.state.clone()),
        Extension(user.id),
        Json(CreateCourseRequest {
            title: "Nope".to_string(),
            description: None,
            price: None,
            currency: None,
        }),
    )
    .await
    .err()
    .expect("should be rejected");
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_the_owner_changes_course_status() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let rival = trainer(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(0)).await;

    let err = archive_course_handler(
        State(h.state.clone()),
        Extension(rival.id),
        Path(course.id),
    )
    .await
    .err()
    .expect("should be rejected");
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn an_archived_course_stays_archived() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(0)).await;
    archive_course_handler(State(h.state.clone()), Extension(owner.id), Path(course.id))
        .await
        .expect("archive");

    let err = publish_course_handler(State(h.state.clone()), Extension(owner.id), Path(course.id))
        .await
        .err()
        .expect("should be rejected");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn the_catalog_hides_drafts() {
    let h = harness();
    let owner = trainer(&h.store).await;

    let created = create_course_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Json(CreateCourseRequest {
            title: "Hidden Draft".to_string(),
            description: None,
            price: None,
            currency: None,
        }),
    )
    .await
    .expect("create course")
    .into_response();
    let course_id = body_json(created).await["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let listing = list_courses_handler(State(h.state.clone()))
        .await
        .expect("list")
        .into_response();
    assert_eq!(body_json(listing).await.as_array().unwrap().len(), 0);

    let err = get_course_handler(State(h.state.clone()), Path(course_id))
        .await
        .err()
        .expect("draft should 404");
    assert_eq!(err.0, StatusCode::NOT_FOUND);

    publish_course_handler(State(h.state.clone()), Extension(owner.id), Path(course_id))
        .await
        .expect("publish");

    let listing = list_courses_handler(State(h.state.clone()))
        .await
        .expect("list")
        .into_response();
    assert_eq!(body_json(listing).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn content_authoring_is_owner_only_and_nested() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let stranger = learner(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(0)).await;

    let lesson = create_lesson_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Path(course.id),
        Json(CreateContentRequest {
            title: "Week 1".to_string(),
            position: 1,
        }),
    )
    .await
    .expect("create lesson")
    .into_response();
    assert_eq!(lesson.status(), StatusCode::CREATED);
    let lesson_id = body_json(lesson).await["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let module = create_module_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Path(lesson_id),
        Json(CreateContentRequest {
            title: "Ledgers".to_string(),
            position: 1,
        }),
    )
    .await
    .expect("create module")
    .into_response();
    let module_id: uuid::Uuid = body_json(module).await["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let err = create_section_handler(
        State(h.state.clone()),
        Extension(stranger.id),
        Path(module_id),
        Json(CreateContentRequest {
            title: "Not yours".to_string(),
            position: 1,
        }),
    )
    .await
    .err()
    .expect("stranger cannot author");
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    create_section_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Path(module_id),
        Json(CreateContentRequest {
            title: "Debits and credits".to_string(),
            position: 1,
        }),
    )
    .await
    .expect("create section");

    // Content reads are enrollment-gated for everyone but the owner.
    let err = list_sections_handler(
        State(h.state.clone()),
        Extension(stranger.id),
        Path(module_id),
    )
    .await
    .err()
    .expect("stranger cannot read");
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    h.store
        .upsert_enrollment(stranger.id, course.id, "free")
        .await
        .expect("enroll");
    let sections = list_sections_handler(
        State(h.state.clone()),
        Extension(stranger.id),
        Path(module_id),
    )
    .await
    .expect("enrolled learner reads")
    .into_response();
    assert_eq!(body_json(sections).await.as_array().unwrap().len(), 1);
}
