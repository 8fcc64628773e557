/// Authentication Routes
///
/// HTTP route handlers for the login-continuation flow: login page, login
/// initiation, provider callback and logout, plus the signed-in user and
/// liveness endpoints.
use crate::auth::manager::{AuthQuery, FlowResponse};
use crate::auth::middleware::{CurrentUser, User, require_auth, with_user};
use crate::auth::AuthManager;
use crate::auth::providers::CallbackParams;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::{Html, Redirect},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Login page parameters
#[derive(Debug, Deserialize)]
pub struct LoginPageParams {
    /// Where to go after a successful login; relative paths are resolved
    /// against the service host
    redirect: Option<String>,
}

/// Human label for a provider button
fn provider_label(provider: &str) -> String {
    let name = match provider {
        "amazon" => "Amazon",
        "apple" => "Apple",
        "discord" => "Discord",
        "facebook" => "Facebook",
        "google" => "Google",
        "twitch" => "Twitch",
        "twitterv2" => "X (Twitter)",
        other => other,
    };
    format!("Sign in with {}", name)
}

/// Absolute destination for the provider links
fn resolve_redirect(auth_manager: &AuthManager, redirect: Option<&str>) -> String {
    let redirect = redirect.filter(|r| !r.is_empty()).unwrap_or("/");
    match url::Url::parse(redirect) {
        Ok(url) => url.to_string(),
        Err(_) => auth_manager
            .validator()
            .host_url()
            .join(redirect)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| redirect.to_string()),
    }
}

/// Login page handler - displays available providers
async fn login_page(
    State(auth_manager): State<Arc<AuthManager>>,
    Query(params): Query<LoginPageParams>,
) -> Html<String> {
    let redirect = resolve_redirect(&auth_manager, params.redirect.as_deref());
    let encoded_redirect = urlencoding::encode(&redirect);

    let buttons = auth_manager
        .list_providers()
        .iter()
        .map(|p| {
            let href = format!("/auth/{}?redirect={}", urlencoding::encode(p), encoded_redirect);
            format!(
                r#"<a href="{}" class="provider-btn provider-{}">{}</a>"#,
                html_escape::encode_double_quoted_attribute(&href),
                html_escape::encode_double_quoted_attribute(p),
                html_escape::encode_text(&provider_label(p)),
            )
        })
        .collect::<Vec<_>>()
        .join("\n            ");

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sign In</title>
</head>
<body>
    <main>
        <h1>Sign In</h1>
        <p>Choose a provider to continue:</p>
        <nav>
            {}
        </nav>
    </main>
</body>
</html>"#,
        buttons
    ))
}

/// Start (or silently complete) the login flow for a provider
async fn begin_auth(
    State(auth_manager): State<Arc<AuthManager>>,
    Path(provider): Path<String>,
    Query(query): Query<AuthQuery>,
    jar: CookieJar,
) -> FlowResponse {
    auth_manager.begin_auth(&provider, &query, jar).await
}

/// Handle OAuth2 callback from provider
async fn oauth_callback(
    State(auth_manager): State<Arc<AuthManager>>,
    Path(provider): Path<String>,
    Query(query): Query<AuthQuery>,
    jar: CookieJar,
) -> FlowResponse {
    auth_manager.complete_auth(&provider, &query, jar).await
}

/// `response_mode=form_post` callback (Apple)
///
/// The cross-site POST carries no `SameSite=Lax` cookies, so the parameters
/// are moved onto a top-level GET of the callback route, which does.
async fn oauth_callback_form(
    Path(provider): Path<String>,
    Form(params): Form<CallbackParams>,
) -> Redirect {
    let path = format!("/auth/{}/callback", urlencoding::encode(&provider));
    match serde_urlencoded::to_string(&params) {
        Ok(query) if !query.is_empty() => Redirect::to(&format!("{}?{}", path, query)),
        Ok(_) => Redirect::to(&path),
        Err(e) => {
            tracing::warn!("Dropping unencodable callback form for {}: {}", provider, e);
            Redirect::to(&path)
        }
    }
}

/// Logout handler - ends the session
async fn logout(
    State(auth_manager): State<Arc<AuthManager>>,
    Path(provider): Path<String>,
    Query(query): Query<AuthQuery>,
    jar: CookieJar,
) -> FlowResponse {
    auth_manager.logout(&provider, &query, jar).await
}

/// The signed-in user
async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create authentication router with all routes
pub fn create_auth_router(auth_manager: Arc<AuthManager>) -> Router {
    let guarded = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            auth_manager.clone(),
            require_auth,
        ));

    Router::new()
        .route("/login", get(login_page))
        .route("/auth/{provider}", get(begin_auth))
        .route(
            "/auth/{provider}/callback",
            get(oauth_callback).post(oauth_callback_form),
        )
        .route("/logout/{provider}", get(logout))
        .route("/health", get(health))
        .merge(guarded)
        .layer(middleware::from_fn_with_state(
            auth_manager.clone(),
            with_user,
        ))
        .with_state(auth_manager)
}
