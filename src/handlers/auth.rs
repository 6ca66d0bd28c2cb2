use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    middleware_layer::session::session_cookie,
    session::{FlashKind, FormReplay, Session},
    state::AppState,
    validation::auth::*,
};

/// The request payload for account registration.
#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// The request payload for login.
#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Unwraps a validator outcome into a per-field message, letting
/// non-validation errors propagate.
fn field_error(result: Result<()>) -> Result<Option<String>> {
    match result {
        Ok(()) => Ok(None),
        Err(AppError::Validation(msg)) => Ok(Some(msg)),
        Err(e) => Err(e),
    }
}

/// Queues the one-shot state for a failed submission: an error flash plus
/// the form-replay payload echoing the submitted username (never the
/// password) with per-field errors.
async fn reject_submission(
    state: &AppState,
    session: &mut Session,
    username: &str,
    errors: HashMap<String, Vec<String>>,
) -> Result<()> {
    state
        .sessions
        .add_flash(session, FlashKind::Error, "Your input is invalid")
        .await?;
    state
        .sessions
        .put_form_data(
            session,
            FormReplay {
                data: Some(HashMap::from([(
                    "username".to_string(),
                    sonic_rs::json!(username),
                )])),
                errors: Some(errors),
            },
        )
        .await
}

/// Handles account registration.
///
/// Success and failure both talk back through the session's one-shot
/// channels, so the page the client lands on next can show the outcome.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt for username: {}", payload.username);
    let mut session = session;

    let mut errors: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(msg) = field_error(validate_username(&payload.username))? {
        errors.insert("username".to_string(), vec![msg]);
    }
    if let Some(msg) = field_error(validate_password(&payload.password))? {
        errors.insert("password".to_string(), vec![msg]);
    }

    if !errors.is_empty() {
        reject_submission(&state, &mut session, &payload.username, errors).await?;
        let response = AuthResponse {
            success: false,
            message: "Your input is invalid".to_string(),
        };
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(response)).into_response());
    }

    match state
        .directory
        .create(&payload.username, &payload.password)
        .await
    {
        Ok(account) => {
            tracing::info!("✅ Account registered: {}", account.id);
            state
                .sessions
                .add_flash(
                    &mut session,
                    FlashKind::Success,
                    "Account created successfully, you can now login",
                )
                .await?;

            let response = AuthResponse {
                success: true,
                message: "Account created successfully, you can now login".to_string(),
            };
            Ok((StatusCode::CREATED, Json(response)).into_response())
        }
        Err(AppError::Validation(msg)) => {
            let errors = HashMap::from([("username".to_string(), vec![msg.clone()])]);
            reject_submission(&state, &mut session, &payload.username, errors).await?;
            let response = AuthResponse {
                success: false,
                message: msg,
            };
            Ok((StatusCode::CONFLICT, Json(response)).into_response())
        }
        Err(e) => Err(e),
    }
}

/// Handles login.
///
/// On success the session is **rotated**: the old id is deleted and a new
/// one is issued with the user attached, so a privilege change never
/// reuses an id. The refreshed cookie overwrites the client's copy.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for username: {}", payload.username);
    let mut session = session;

    match state
        .directory
        .verify(&payload.username, &payload.password)
        .await?
    {
        Some(account) => {
            let session = state.sessions.rotate_for_user(session, account).await?;
            cookies.add(session_cookie(&session, state.config.cookie_secure()));
            tracing::info!("✅ Login rotated session to: {}", session.id());

            let response = AuthResponse {
                success: true,
                message: "Login successful".to_string(),
            };
            Ok((StatusCode::OK, Json(response)).into_response())
        }
        None => {
            state
                .sessions
                .add_flash(&mut session, FlashKind::Error, "Invalid username or password")
                .await?;
            Err(AppError::Authentication(
                "Invalid username or password".to_string(),
            ))
        }
    }
}

/// Handles logout.
///
/// Logout is also a rotation: the authenticated record is deleted and a
/// fresh anonymous one replaces it, keeping any queued flash messages so
/// a "logged out" notice survives onto the next page.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
) -> Result<Response> {
    let mut session = session;
    if session.is_authenticated() {
        tracing::info!("👋 Logout for session: {}", session.id());
        state
            .sessions
            .add_flash(&mut session, FlashKind::Success, "You have been logged out")
            .await?;
    }

    let session = state.sessions.invalidate(session).await?;
    cookies.add(session_cookie(&session, state.config.cookie_secure()));

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}
