//! services/api/tests/progress_flow_tests.rs
//!
//! Section completion through the handlers, with the roll-up visible in
//! the progress and dashboard reads.

mod common;

use api_lib::web::progress::{complete_section_handler, course_progress_handler};
use api_lib::web::rest::dashboard_handler;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Extension;
use common::{body_json, course_with_lessons, course_with_sections, harness, learner, trainer};
use lms_core::ports::DatabaseService;
use rust_decimal_macros::dec;

#[tokio::test]
async fn completing_sections_rolls_up_to_the_course() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let student = learner(&h.store).await;
    // Two lessons, one section each: every completed section finishes a
    // whole lesson and moves the course percent by half.
    let (course, sections) = course_with_lessons(&h.store, owner.id, dec!(0), 2).await;
    h.store
        .upsert_enrollment(student.id, course.id, "free")
        .await
        .expect("enroll");

    let first = complete_section_handler(
        State(h.state.clone()),
        Extension(student.id),
        Path(sections[0].id),
    )
    .await
    .expect("first section")
    .into_response();
    let first = body_json(first).await;
    assert_eq!(first["section_completed"], true);
    assert_eq!(first["module_completed"], true);
    assert_eq!(first["lesson_completed"], true);
    assert_eq!(first["course_progress"], 50);
    assert_eq!(first["course_completed"], false);

    let second = complete_section_handler(
        State(h.state.clone()),
        Extension(student.id),
        Path(sections[1].id),
    )
    .await
    .expect("second section")
    .into_response();
    let second = body_json(second).await;
    assert_eq!(second["course_progress"], 100);
    assert_eq!(second["course_completed"], true);

    let progress = course_progress_handler(
        State(h.state.clone()),
        Extension(student.id),
        Path(course.id),
    )
    .await
    .expect("progress read")
    .into_response();
    let progress = body_json(progress).await;
    assert_eq!(progress["progress"], 100);
    assert_eq!(progress["is_completed"], true);
}

#[tokio::test]
async fn a_half_finished_lesson_moves_nothing_upward() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let student = learner(&h.store).await;
    let (course, sections) = course_with_sections(&h.store, owner.id, dec!(0), 2).await;
    h.store
        .upsert_enrollment(student.id, course.id, "free")
        .await
        .expect("enroll");

    let outcome = complete_section_handler(
        State(h.state.clone()),
        Extension(student.id),
        Path(sections[0].id),
    )
    .await
    .expect("first section")
    .into_response();
    let outcome = body_json(outcome).await;
    assert_eq!(outcome["section_completed"], true);
    assert_eq!(outcome["module_completed"], false);
    assert_eq!(outcome["lesson_completed"], false);
    assert_eq!(outcome["course_progress"], 0);
}

#[tokio::test]
async fn progress_needs_an_active_enrollment() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let student = learner(&h.store).await;
    let (_, sections) = course_with_sections(&h.store, owner.id, dec!(0), 1).await;

    let err = complete_section_handler(
        State(h.state.clone()),
        Extension(student.id),
        Path(sections[0].id),
    )
    .await
    .err()
    .expect("should be rejected");
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn replaying_a_completion_changes_nothing() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let student = learner(&h.store).await;
    let (course, sections) = course_with_lessons(&h.store, owner.id, dec!(0), 2).await;
    h.store
        .upsert_enrollment(student.id, course.id, "free")
        .await
        .expect("enroll");

    for _ in 0..2 {
        let outcome = complete_section_handler(
            State(h.state.clone()),
            Extension(student.id),
            Path(sections[0].id),
        )
        .await
        .expect("complete")
        .into_response();
        assert_eq!(body_json(outcome).await["course_progress"], 50);
    }

    let enrollment = h
        .store
        .get_enrollment(student.id, course.id)
        .await
        .expect("read enrollment")
        .expect("enrolled");
    assert_eq!(enrollment.progress, 50);
    assert!(!enrollment.is_completed);
}

#[tokio::test]
async fn the_dashboard_reflects_a_finished_course() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let student = learner(&h.store).await;
    let (course, sections) = course_with_sections(&h.store, owner.id, dec!(0), 2).await;
    h.store
        .upsert_enrollment(student.id, course.id, "free")
        .await
        .expect("enroll");
    for section in &sections {
        complete_section_handler(
            State(h.state.clone()),
            Extension(student.id),
            Path(section.id),
        )
        .await
        .expect("complete");
    }

    let dashboard = dashboard_handler(State(h.state.clone()), Extension(student.id))
        .await
        .expect("dashboard")
        .into_response();
    let dashboard = body_json(dashboard).await;
    assert_eq!(dashboard["summary"]["total"], 1);
    assert_eq!(dashboard["summary"]["completed"], 1);
    assert_eq!(dashboard["summary"]["in_progress"], 0);
    assert_eq!(dashboard["active_courses"][0]["progress"], 100);
    assert_eq!(dashboard["daily_completions"][0]["completed"], 2);
}

#[tokio::test]
async fn missing_enrollment_reads_as_not_found() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let student = learner(&h.store).await;
    let (course, _) = course_with_sections(&h.store, owner.id, dec!(0), 1).await;

    let err = course_progress_handler(
        State(h.state.clone()),
        Extension(student.id),
        Path(course.id),
    )
    .await
    .err()
    .expect("should 404");
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}
