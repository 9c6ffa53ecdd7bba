use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{session::SESSION_COOKIE, state::AppState};

/// Resolves the session cookie to an authenticated user id, if any.
pub(crate) async fn session_user(parts: &Parts, state: &AppState) -> Option<Uuid> {
    let jar = CookieJar::from_headers(&parts.headers);
    let session_id = jar
        .get(SESSION_COOKIE)?
        .value()
        .parse::<Uuid>()
        .ok()?;
    state.sessions.get(session_id).await
}

/// Guard for authenticated-only routes. Unauthenticated requests are
/// redirected to the login form with a notice (flash-equivalent).
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match session_user(parts, state).await {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => {
                debug!("unauthenticated request to guarded route");
                Err(Redirect::to("/login?notice=not_authorized").into_response())
            }
        }
    }
}

/// Guard for anonymous-only routes (login, register, the reset flow).
/// A logged-in visitor is bounced to a context-appropriate location derived
/// from the Referer header.
pub struct RequireAnonymous;

#[async_trait]
impl FromRequestParts<AppState> for RequireAnonymous {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if session_user(parts, state).await.is_none() {
            return Ok(RequireAnonymous);
        }
        let referer = parts
            .headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok());
        Err(already_logged_in_response(referer))
    }
}

/// Where to send an already-authenticated visitor: back to the profile page
/// they came from, home for any other parseable referrer, and an error when
/// the referrer does not match a known route shape.
fn already_logged_in_response(referer: Option<&str>) -> Response {
    let Some(referer) = referer else {
        return Redirect::to("/").into_response();
    };
    let segments: Vec<&str> = referer.split('/').collect();
    match (segments.get(3).copied(), segments.get(4).copied()) {
        (Some("users"), Some(username)) if !username.is_empty() => {
            Redirect::to(&format!("/users/{username}")).into_response()
        }
        (Some(_), _) => Redirect::to("/").into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Route Error" })),
        )
            .into_response(),
    }
}
