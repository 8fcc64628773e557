use axum::{Router, middleware::from_fn};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

pub mod auth;
pub mod config;
pub mod middleware;

use auth::{
    AuthError, AuthManager, CookiePolicy, IdentityBroker, OAuthBroker, RecordStore, Records,
    RedirectValidator, SealedCodec, SealedCookieStore, SignedCodec, SignedCookieStore,
    create_auth_router,
};

/// Builds the application router from validated configuration.
///
/// The record store, OAuth broker and flow controller are constructed here
/// once and shared by every request.
pub fn build_app(config: &config::Config) -> Result<Router, AuthError> {
    let host_url = config.host_url()?;
    let policy = CookiePolicy::for_host(&host_url);
    let secret = config.session_secret.as_bytes();

    let store: Arc<dyn RecordStore> = if config.encrypt_cookies {
        Arc::new(SealedCookieStore::new(SealedCodec::new(secret), policy))
    } else {
        Arc::new(SignedCookieStore::new(SignedCodec::new(secret), policy))
    };
    let records = Records::new(store, config.record_ttl());

    let mut broker = OAuthBroker::new(records.clone());
    for (name, provider_config) in config.enabled_providers(&host_url) {
        broker.register_provider(&name, provider_config)?;
    }
    if broker.providers().is_empty() {
        warn!("no OAuth2 providers configured; every login will be rejected");
    }

    let manager = Arc::new(AuthManager::new(
        Arc::new(broker),
        records,
        RedirectValidator::new(host_url),
        config.login_path.clone(),
    ));

    Ok(create_auth_router(manager)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(middleware::request_id_middleware)))
}

/// Starts the web server with custom configuration
///
/// Binds `BIND_ADDRESS:PORT` (port 0 picks a free port), serves until
/// `shutdown_rx` fires and returns the bound port.
pub async fn start_server_with_config(
    config: config::Config,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<u16> {
    let app = build_app(&config)?;

    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    let addr = listener.local_addr()?;

    info!("listening on {}", addr);
    debug!(
        "Server configuration - auth host: {}, encrypted records: {}",
        config.auth_host, config.encrypt_cookies
    );

    tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("server error: {}", e);
        }
    });

    Ok(addr.port())
}
