//! Server-side session core: signed opaque session tokens backed by a
//! swappable key-value store, with per-state TTL policies, one-shot flash
//! and form-replay channels, and rotate-on-privilege-change invalidation.

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod botcheck;
pub mod config;
pub mod directory;
pub mod error;
pub mod kv;
pub mod session;
pub mod signer;
pub mod state;

pub mod handlers {
    pub mod auth;
    pub mod session;
}

pub mod middleware_layer {
    pub mod session;
}

pub mod validation {
    pub mod auth;
}

use state::AppState;

/// Builds the application router.
///
/// Every application route sits behind the session middleware; the static
/// fallback does not, so asset requests never touch the session store.
/// The cookie layer is outermost so the middleware can read and write the
/// session cookie.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/session", get(handlers::session::whoami))
        .route("/api/session/flash", get(handlers::session::drain_flashes))
        .route(
            "/api/session/form-data",
            get(handlers::session::drain_form_data),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::session::attach_session,
        ))
        .with_state(state);

    Router::new()
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CookieManagerLayer::new())
        .fallback_service(ServeDir::new("public"))
}
