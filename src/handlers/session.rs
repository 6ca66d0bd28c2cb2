use axum::{Extension, Json, extract::State};
use serde::Serialize;

use crate::{
    error::Result,
    session::{Flash, FormReplay, Session},
    state::AppState,
};

/// The response payload describing the caller's session.
#[derive(Serialize)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub is_bot: bool,
    pub expiry: i64,
}

/// Reports the caller's session state: anonymous or authenticated, and
/// when the record expires.
#[axum::debug_handler]
pub async fn whoami(Extension(session): Extension<Session>) -> Json<SessionInfo> {
    Json(SessionInfo {
        authenticated: session.is_authenticated(),
        user_id: session.user().map(|u| u.id.clone()),
        is_bot: session.is_bot(),
        expiry: session.expiry(),
    })
}

/// Drains pending flash messages. Read-once: the drain is persisted
/// before the response goes out, so a refresh shows nothing.
#[axum::debug_handler]
pub async fn drain_flashes(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Flash>>> {
    let mut session = session;
    let flashes = state.sessions.take_flashes(&mut session).await?;
    Ok(Json(flashes))
}

/// Drains the form-replay payload queued by the last failed submission.
/// Read-once, like flashes.
#[axum::debug_handler]
pub async fn drain_form_data(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Option<FormReplay>>> {
    let mut session = session;
    let form = state.sessions.take_form_data(&mut session).await?;
    Ok(Json(form))
}
