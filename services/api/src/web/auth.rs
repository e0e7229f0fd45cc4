//! services/api/src/web/auth.rs
//!
//! Signup, login, and logout. Sessions are opaque ids stored server-side
//! and handed to the browser in an HttpOnly cookie.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{reject, HttpError};
use crate::web::middleware::{session_id_from, SESSION_COOKIE};
use crate::web::state::AppState;
use lms_core::domain::{NewUser, User, UserRole};
use lms_core::ports::PortError;

/// Browser sessions live this long; there is no sliding refresh.
const SESSION_TTL_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    /// "trainer" or "learner". Anything else falls back to learner.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    /// Drives the trainer/learner split in the client.
    pub role: String,
}

impl From<User> for AuthResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role.to_string(),
        }
    }
}

//=========================================================================================
// Password and Cookie Plumbing
//=========================================================================================

fn hash_password(password: &str) -> Result<String, HttpError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password")
        })
}

fn password_matches(hashed: &str, password: &str) -> Result<bool, HttpError> {
    let parsed = PasswordHash::new(hashed).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        reject(StatusCode::INTERNAL_SERVER_ERROR, "Authentication error")
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Opens a server-side session for the user and returns the Set-Cookie
/// value carrying its id.
async fn open_session(state: &AppState, user_id: Uuid) -> Result<String, HttpError> {
    let session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);
    state
        .db
        .create_auth_session(&session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session")
        })?;
    Ok(format!(
        "{SESSION_COOKIE}={session_id}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        Duration::days(SESSION_TTL_DAYS).num_seconds()
    ))
}

fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/signup - Create an account and sign straight in
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let password_hash = hash_password(&req.password)?;
    let role = req
        .role
        .as_deref()
        .map(UserRole::from)
        .unwrap_or(UserRole::Learner);

    // Emails are stored lowercased so logins are case-insensitive.
    let user = state
        .db
        .create_user(NewUser {
            email: req.email.trim().to_lowercase(),
            full_name: req.full_name,
            hashed_password: password_hash,
            role,
        })
        .await
        .map_err(|e| match e {
            PortError::AlreadyExists(_) => reject(
                StatusCode::BAD_REQUEST,
                "An account with this email already exists",
            ),
            other => {
                error!("Failed to create user: {:?}", other);
                reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user")
            }
        })?;

    let cookie = open_session(&state, user.id).await?;
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(user)),
    ))
}

/// POST /api/auth/login - Exchange credentials for a session cookie
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // A missing account and a wrong password answer identically.
    let creds = state
        .db
        .get_user_by_email(&req.email.trim().to_lowercase())
        .await
        .map_err(|e| {
            if !matches!(e, PortError::NotFound(_)) {
                error!("Failed to load credentials: {:?}", e);
            }
            reject(StatusCode::UNAUTHORIZED, "Invalid email or password")
        })?;
    if !password_matches(&creds.hashed_password, &req.password)? {
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    }

    let user = state.db.get_user(creds.user_id).await.map_err(|e| {
        error!("Failed to load user after login: {:?}", e);
        reject(StatusCode::INTERNAL_SERVER_ERROR, "Authentication error")
    })?;

    let cookie = open_session(&state, user.id).await?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(user)),
    ))
}

/// POST /api/auth/logout - Drop the session and expire the cookie
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let session_id = session_id_from(&headers)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "No session found"))?;

    state
        .db
        .delete_auth_session(session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout")
        })?;

    Ok((StatusCode::OK, [(header::SET_COOKIE, expired_cookie())]))
}
