#![allow(dead_code)]

use authbroker::{auth::ProviderSettings, config, start_server_with_config};
use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::Cookie;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const AUTH_CODE: &str = "mock-auth-code";
pub const ACCESS_TOKEN: &str = "mock-access-token";
pub const REFRESH_TOKEN: &str = "mock-refresh-token";
pub const USER_ID: &str = "108234567890";
pub const USER_EMAIL: &str = "jane@example.com";

/// Stand-in OAuth2 provider serving authorize, token and userinfo endpoints
pub struct MockProvider {
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProvider {
    pub async fn start() -> anyhow::Result<Self> {
        let app = Router::new()
            .route("/authorize", get(|| async { "consent screen" }))
            .route("/token", post(handle_token))
            .route("/userinfo", get(handle_userinfo));

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock provider failed to start");
        });

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Provider settings pointing every endpoint at this mock
    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            key: "mock-client-id".to_string(),
            secret: "mock-client-secret".to_string(),
            auth_url: Some(self.url("/authorize")),
            token_url: Some(self.url("/token")),
            userinfo_url: Some(self.url("/userinfo")),
            ..Default::default()
        }
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_token(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
    let valid = form.get("grant_type").map(String::as_str) == Some("authorization_code")
        && form.get("code").map(String::as_str) == Some(AUTH_CODE)
        && form.get("code_verifier").is_some_and(|v| v.len() >= 43)
        && form.get("client_secret").map(String::as_str) == Some("mock-client-secret");

    if !valid {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": REFRESH_TOKEN,
        })),
    )
}

async fn handle_userinfo(headers: HeaderMap) -> impl IntoResponse {
    let expected = format!("Bearer {}", ACCESS_TOKEN);
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value == expected.as_str() => (
            StatusCode::OK,
            Json(json!({ "sub": USER_ID, "email": USER_EMAIL, "name": "Jane" })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_token" })),
        ),
    }
}

/// Auth server with proper shutdown support
pub struct TestServer {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Start the auth server on a free port with `google` backed by `provider`
    pub async fn start(provider: &MockProvider) -> anyhow::Result<Self> {
        Self::start_with(provider, |_| {}).await
    }

    pub async fn start_with(
        provider: &MockProvider,
        customize: impl FnOnce(&mut config::Config),
    ) -> anyhow::Result<Self> {
        let mut providers = BTreeMap::new();
        providers.insert("google".to_string(), provider.settings());

        let mut test_config = config::Config {
            auth_host: "http://localhost".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            session_secret: SECRET.to_string(),
            providers,
            ..Default::default()
        };
        customize(&mut test_config);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let port = start_server_with_config(test_config, shutdown_rx).await?;

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// HTTP client that never follows redirects
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client should build")
}

/// Minimal browser cookie jar: applies Set-Cookie headers, honouring removals
#[derive(Debug, Default)]
pub struct CookieBag {
    cookies: BTreeMap<String, String>,
}

impl CookieBag {
    pub fn absorb(&mut self, response: &reqwest::Response) {
        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let Ok(cookie) = Cookie::parse(raw.to_string()) else {
                continue;
            };

            let expired = cookie.max_age().is_some_and(|age| age.is_zero())
                || cookie.value().is_empty();
            if expired {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.cookies.is_empty() {
            request
        } else {
            request.header(COOKIE, self.header())
        }
    }
}

/// Location header of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
