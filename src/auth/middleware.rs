/// Authentication Middleware
///
/// Projects the session records of every request into a [`User`] in the
/// request extensions, and guards routes that need one.
use crate::auth::AuthManager;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Identity attached to a request.
///
/// Only ever attached with a non-empty `user_id`; anonymous requests carry
/// no `User` at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub email: String,
    /// Provider of the most recent login, empty when unknown
    pub provider: String,
}

/// Attach the session's [`User`], if any, to the request
pub async fn with_user(
    State(auth_manager): State<Arc<AuthManager>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(user) = auth_manager.resolve_user(&jar) {
        debug!(user_id = %user.user_id, provider = %user.provider, "user found in session");
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}

/// Send requests without a user to the login page, remembering the path
///
/// Must run after [`with_user`].
pub async fn require_auth(
    State(auth_manager): State<Arc<AuthManager>>,
    req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<User>().is_some() {
        return next.run(req).await;
    }

    let path = req.uri().path();
    let query = serde_urlencoded::to_string([("redirect", path)]).unwrap_or_default();
    debug!(path, "anonymous request to guarded route");

    Redirect::to(&format!("{}?{}", auth_manager.login_path(), query)).into_response()
}

/// Extractor for the authenticated user; rejects with 401 when absent
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(CurrentUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<User>().cloned().map(CurrentUser))
    }
}
