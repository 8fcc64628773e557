mod common;

use common::{
    AUTH_CODE, CookieBag, MockProvider, TestServer, USER_EMAIL, USER_ID, client, location,
};
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

/// Starts a login and returns the `state` handed to the provider
async fn begin_login(server: &TestServer, cookies: &mut CookieBag, redirect: &str) -> String {
    let response = cookies
        .apply(client().get(server.url("/auth/google")))
        .query(&[("redirect", redirect)])
        .send()
        .await
        .expect("begin request");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    cookies.absorb(&response);

    let provider_url = Url::parse(&location(&response)).expect("provider URL");
    assert_eq!(provider_url.path(), "/authorize");

    let params: std::collections::HashMap<_, _> = provider_url.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "mock-client-id");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["access_type"], "offline");
    assert_eq!(
        params["redirect_uri"],
        "http://localhost/auth/google/callback"
    );
    params["state"].clone()
}

async fn callback(
    server: &TestServer,
    cookies: &CookieBag,
    code: &str,
    state: &str,
) -> reqwest::Response {
    cookies
        .apply(client().get(server.url("/auth/google/callback")))
        .query(&[("code", code), ("state", state)])
        .send()
        .await
        .expect("callback request")
}

async fn me(server: &TestServer, cookies: &CookieBag) -> reqwest::Response {
    cookies
        .apply(client().get(server.url("/me")))
        .send()
        .await
        .expect("me request")
}

#[tokio::test]
async fn test_full_login_logout_flow() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");
    let mut cookies = CookieBag::default();

    let state = begin_login(&server, &mut cookies, "http://localhost/dashboard").await;
    assert!(cookies.contains("oauthState"));
    assert!(cookies.contains("redirectTo"));

    let response = callback(&server, &cookies, AUTH_CODE, &state).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost/dashboard");
    cookies.absorb(&response);
    assert!(cookies.contains("user"));
    assert!(cookies.contains("long"));
    assert!(!cookies.contains("oauthState"));
    assert!(!cookies.contains("redirectTo"));

    let response = me(&server, &cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user: Value = response.json().await.expect("user JSON");
    assert_eq!(user["userId"], USER_ID);
    assert_eq!(user["email"], USER_EMAIL);
    assert_eq!(user["provider"], "google");

    // The handshake is consumed; replaying the callback fails
    let replay = callback(&server, &cookies, AUTH_CODE, &state).await;
    assert_eq!(replay.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = cookies
        .apply(client().get(server.url("/logout/google")))
        .query(&[("redirect", "http://localhost/goodbye")])
        .send()
        .await
        .expect("logout request");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost/goodbye");
    cookies.absorb(&response);
    assert!(!cookies.contains("user"));
    assert!(cookies.contains("long"));

    let response = me(&server, &cookies).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_handshake_on_begin_route_completes_silently() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");
    let mut cookies = CookieBag::default();

    let state = begin_login(&server, &mut cookies, "http://localhost/home").await;

    let response = cookies
        .apply(client().get(server.url("/auth/google")))
        .query(&[("code", AUTH_CODE), ("state", state.as_str())])
        .send()
        .await
        .expect("begin request");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost/home");
    cookies.absorb(&response);
    assert!(cookies.contains("user"));
}

#[tokio::test]
async fn test_tampered_state_is_rejected() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");
    let mut cookies = CookieBag::default();

    begin_login(&server, &mut cookies, "http://localhost/dashboard").await;

    let response = callback(&server, &cookies, AUTH_CODE, "forged-state").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    cookies.absorb(&response);
    assert!(!cookies.contains("user"));

    let body: Value = response.json().await.expect("error JSON");
    assert_eq!(body["error"], "Authentication failed");
}

#[tokio::test]
async fn test_rejected_code_exchange_creates_no_session() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");
    let mut cookies = CookieBag::default();

    let state = begin_login(&server, &mut cookies, "http://localhost/dashboard").await;

    let response = callback(&server, &cookies, "stolen-code", &state).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    cookies.absorb(&response);
    assert!(!cookies.contains("user"));
}

#[tokio::test]
async fn test_provider_error_is_reported() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");
    let mut cookies = CookieBag::default();

    begin_login(&server, &mut cookies, "http://localhost/dashboard").await;

    let response = cookies
        .apply(client().get(server.url("/auth/google/callback")))
        .query(&[("error", "access_denied")])
        .send()
        .await
        .expect("callback request");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_unsafe_redirect_is_rejected() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");

    for target in [
        "https://localhost/x",
        "http://evil.com/x",
        "not a url",
        "http://localhost/x\r\nSet-Cookie: pwn=1",
    ] {
        let response = client()
            .get(server.url("/auth/google"))
            .query(&[("redirect", target)])
            .send()
            .await
            .expect("begin request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{target}");

        let body: Value = response.json().await.expect("error JSON");
        assert_eq!(body["error"], "Invalid redirect target");
    }
}

#[tokio::test]
async fn test_unknown_provider_is_rejected() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");

    for path in ["/auth/myspace", "/auth/myspace/callback", "/logout/myspace"] {
        let response = client()
            .get(server.url(path))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
    }
}

#[tokio::test]
async fn test_anonymous_me_redirects_to_login() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");

    let response = client()
        .get(server.url("/me"))
        .send()
        .await
        .expect("me request");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?redirect=%2Fme");
}

#[tokio::test]
async fn test_login_page_lists_providers() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");

    let response = client()
        .get(server.url("/login"))
        .send()
        .await
        .expect("login request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.expect("login page");
    assert!(body.contains("/auth/google?redirect="));
}

#[tokio::test]
async fn test_encrypted_records_flow() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start_with(&provider, |config| config.encrypt_cookies = true)
        .await
        .expect("server");
    let mut cookies = CookieBag::default();

    let state = begin_login(&server, &mut cookies, "http://localhost/dashboard").await;
    let response = callback(&server, &cookies, AUTH_CODE, &state).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    cookies.absorb(&response);

    // Sealed values do not expose the user id
    let session = cookies.get("user").expect("session cookie");
    assert!(!session.contains(USER_ID));

    let response = me(&server, &cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user: Value = response.json().await.expect("user JSON");
    assert_eq!(user["email"], USER_EMAIL);
}

#[tokio::test]
async fn test_health_echoes_request_id() {
    let provider = MockProvider::start().await.expect("mock provider");
    let server = TestServer::start(&provider).await.expect("server");

    let response = client()
        .get(server.url("/health"))
        .header("x-request-id", "health-check-1")
        .send()
        .await
        .expect("health request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "health-check-1");

    let body: Value = response.json().await.expect("health JSON");
    assert_eq!(body["status"], "ok");
}
