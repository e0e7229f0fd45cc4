//! services/api/tests/auth_flow_tests.rs
//!
//! Signup, login, and logout, with the session cookie checked against
//! the store.

mod common;

use api_lib::web::auth::{login_handler, logout_handler, signup_handler, LoginRequest, SignupRequest};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::{body_json, harness};
use lms_core::ports::DatabaseService;
use uuid::Uuid;

fn session_id_from(response: &Response) -> String {
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .expect("cookie is ascii");
    cookie
        .strip_prefix("session=")
        .and_then(|rest| rest.split(';').next())
        .expect("session cookie")
        .to_string()
}

fn signup_request(email: &str, role: Option<&str>) -> SignupRequest {
    SignupRequest {
        email: email.to_string(),
        password: "correct horse battery".to_string(),
        full_name: "Wanjiku Test".to_string(),
        role: role.map(str::to_string),
    }
}

#[tokio::test]
async fn signup_opens_a_usable_session() {
    let h = harness();

    let response = signup_handler(
        State(h.state.clone()),
        Json(signup_request("new@example.com", Some("trainer"))),
    )
    .await
    .expect("signup")
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session_id = session_id_from(&response);
    let body = body_json(response).await;
    assert_eq!(body["role"], "trainer");
    assert_eq!(body["full_name"], "Wanjiku Test");
    let user_id: Uuid = body["user_id"].as_str().unwrap().parse().unwrap();

    let resolved = h
        .store
        .validate_auth_session(&session_id)
        .await
        .expect("session resolves");
    assert_eq!(resolved, user_id);

    let user = h.store.get_user(user_id).await.expect("user exists");
    assert_eq!(user.email, "new@example.com");
}

#[tokio::test]
async fn duplicate_emails_cannot_sign_up() {
    let h = harness();
    signup_handler(
        State(h.state.clone()),
        Json(signup_request("taken@example.com", None)),
    )
    .await
    .expect("first signup");

    let err = signup_handler(
        State(h.state.clone()),
        Json(signup_request("taken@example.com", None)),
    )
    .await
    .err()
    .expect("second signup rejected");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_checks_the_password() {
    let h = harness();
    signup_handler(
        State(h.state.clone()),
        Json(signup_request("login@example.com", None)),
    )
    .await
    .expect("signup");

    // Email casing is normalized, so the stored lowercase form matches.
    let ok = login_handler(
        State(h.state.clone()),
        Json(LoginRequest {
            email: "Login@Example.com".to_string(),
            password: "correct horse battery".to_string(),
        }),
    )
    .await
    .expect("login")
    .into_response();
    assert_eq!(ok.status(), StatusCode::OK);

    let err = login_handler(
        State(h.state.clone()),
        Json(LoginRequest {
            email: "login@example.com".to_string(),
            password: "wrong password".to_string(),
        }),
    )
    .await
    .err()
    .expect("bad password rejected");
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_burns_the_session() {
    let h = harness();
    let response = signup_handler(
        State(h.state.clone()),
        Json(signup_request("leaver@example.com", None)),
    )
    .await
    .expect("signup")
    .into_response();
    let session_id = session_id_from(&response);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&format!("session={session_id}")).expect("cookie"),
    );
    let out = logout_handler(State(h.state.clone()), headers)
        .await
        .expect("logout")
        .into_response();
    assert_eq!(out.status(), StatusCode::OK);

    assert!(h.store.validate_auth_session(&session_id).await.is_err());
}
