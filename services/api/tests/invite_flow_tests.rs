//! services/api/tests/invite_flow_tests.rs
//!
//! Invite issuance and redemption through the handlers.

mod common;

use api_lib::web::invites::{
    accept_invite_handler, create_invite_handler, list_invites_handler, AcceptInviteRequest,
    CreateInviteRequest,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use common::{body_json, harness, learner, trainer};
use lms_core::domain::NewInvite;
use lms_core::ports::DatabaseService;
use rust_decimal_macros::dec;

#[tokio::test]
async fn an_invite_enrolls_its_holder_once() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let guest = learner(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(5000.00)).await;

    let created = create_invite_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Path(course.id),
        Json(CreateInviteRequest {
            email: "guest@example.com".to_string(),
            expires_in_days: None,
        }),
    )
    .await
    .expect("create invite")
    .into_response();
    assert_eq!(created.status(), StatusCode::CREATED);
    let invite = body_json(created).await;
    let token = invite["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 64);

    let accepted = accept_invite_handler(
        State(h.state.clone()),
        Extension(guest.id),
        Json(AcceptInviteRequest {
            token: token.clone(),
        }),
    )
    .await
    .expect("accept invite")
    .into_response();
    assert_eq!(accepted.status(), StatusCode::OK);
    let enrollment = body_json(accepted).await;
    assert_eq!(enrollment["payment_status"], "invited");
    assert_eq!(enrollment["status"], "active");

    // The token is burned on first use.
    let err = accept_invite_handler(
        State(h.state.clone()),
        Extension(guest.id),
        Json(AcceptInviteRequest { token }),
    )
    .await
    .err()
    .expect("second use rejected");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_invites_are_rejected() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let guest = learner(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(5000.00)).await;

    h.store
        .create_invite(NewInvite {
            course_id: course.id,
            email: "late@example.com".to_string(),
            token: "stale-token".to_string(),
            invited_by: owner.id,
            expires_at: Utc::now() - Duration::days(1),
        })
        .await
        .expect("seed invite");

    let err = accept_invite_handler(
        State(h.state.clone()),
        Extension(guest.id),
        Json(AcceptInviteRequest {
            token: "stale-token".to_string(),
        }),
    )
    .await
    .err()
    .expect("expired invite rejected");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
    assert!(h
        .store
        .get_enrollment(guest.id, course.id)
        .await
        .expect("read enrollment")
        .is_none());
}

#[tokio::test]
async fn only_the_owner_issues_and_lists_invites() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let rival = trainer(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(5000.00)).await;

    let err = create_invite_handler(
        State(h.state.clone()),
        Extension(rival.id),
        Path(course.id),
        Json(CreateInviteRequest {
            email: "someone@example.com".to_string(),
            expires_in_days: Some(3),
        }),
    )
    .await
    .err()
    .expect("rival cannot invite");
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    create_invite_handler(
        State(h.state.clone()),
        Extension(owner.id),
        Path(course.id),
        Json(CreateInviteRequest {
            email: "someone@example.com".to_string(),
            expires_in_days: Some(3),
        }),
    )
    .await
    .expect("owner invites");

    let listed = list_invites_handler(State(h.state.clone()), Extension(owner.id), Path(course.id))
        .await
        .expect("owner lists")
        .into_response();
    assert_eq!(body_json(listed).await.as_array().unwrap().len(), 1);

    let err = list_invites_handler(State(h.state.clone()), Extension(rival.id), Path(course.id))
        .await
        .err()
        .expect("rival cannot list");
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}
