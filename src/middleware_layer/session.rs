use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::OffsetDateTime;
use tower_cookies::{Cookie, Cookies};

use crate::{error::AppError, session::Session, state::AppState};

/// Name of the session cookie; its value is `"<id>.<signature>"`.
pub const SESSION_COOKIE: &str = "session_id";

/// Builds the session cookie from the record's current state.
///
/// `HttpOnly`, `SameSite=Lax`, expiry mirroring the record's own, and
/// `Secure` only when the deployment says so.
pub fn session_cookie(session: &Session, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, session.signed_id());
    cookie.set_http_only(true);
    if secure {
        cookie.set_secure(true);
    }
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(session.expiry()) {
        cookie.set_expires(expires);
    }
    cookie
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Edge middleware: every request leaves with a live session.
///
/// A missing, forged, or expired token is silently replaced with a fresh
/// anonymous session; the client just looks signed out. Top-level human
/// page views (HTML-accepting, not bot traffic) get their validity
/// extended; everything else passes through with the session attached to
/// the request unchanged. The resolved `Session` is inserted into request
/// extensions so same-request handlers observe it, and any newly issued
/// cookie goes onto the outbound response.
pub async fn attach_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let presented = cookies.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let session = match presented {
        Some(token) => state.sessions.get(&token).await?,
        None => None,
    };

    let is_bot = state.bots.is_bot(
        request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok()),
    );

    match session {
        None => {
            let session = state.sessions.create(is_bot).await?;
            tracing::debug!("🔑 Issued session {} (bot: {})", session.id(), is_bot);
            cookies.add(session_cookie(&session, state.config.cookie_secure()));
            request.extensions_mut().insert(session);
        }
        Some(mut session) => {
            if accepts_html(request.headers()) && !is_bot && !session.is_bot() {
                state.sessions.extend_validity(&mut session).await?;
                cookies.add(session_cookie(&session, state.config.cookie_secure()));
            }
            request.extensions_mut().insert(session);
        }
    }

    Ok(next.run(request).await)
}
