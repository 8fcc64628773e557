/// Configuration for the authbroker server
///
/// Layered with figment: built-in defaults, then an optional TOML file, then
/// environment variables. Read once at start-up and immutable afterwards.
use std::collections::BTreeMap;
use std::path::Path;

use chrono::Duration;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::auth::config::{ProviderSettings, provider_env_field};
use crate::auth::providers::OAuth2ProviderConfig;
use crate::auth::{AuthError, RecordTtl};

/// Environment variables parsed into numbers and booleans
const TYPED_ENV_KEYS: &[&str] = &[
    "PORT",
    "SESSION_TTL_DAYS",
    "LONG_SESSION_TTL_DAYS",
    "REDIRECT_TTL_SECONDS",
    "HANDSHAKE_TTL_SECONDS",
    "ENCRYPT_COOKIES",
];

/// Environment variables taken byte-for-byte. Provider credentials are
/// handled the same way.
const STRING_ENV_KEYS: &[&str] = &["AUTH_HOST", "BIND_ADDRESS", "SESSION_SECRET", "LOGIN_PATH"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Public URL of this service; scheme and apex domain govern cookies
    /// and redirect validation
    pub auth_host: String,

    pub port: u16,

    pub bind_address: String,

    /// Key for signing (and optionally sealing) records, at least 32 bytes
    pub session_secret: String,

    pub session_ttl_days: i64,

    pub long_session_ttl_days: i64,

    pub redirect_ttl_seconds: i64,

    pub handshake_ttl_seconds: i64,

    /// Seal records with AES-GCM instead of only signing them
    pub encrypt_cookies: bool,

    /// Where RequireAuth sends anonymous requests
    pub login_path: String,

    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_host: String::new(), // Must be set explicitly
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            session_secret: String::new(), // Must be set explicitly
            session_ttl_days: 30,
            long_session_ttl_days: 365,
            redirect_ttl_seconds: 3600,
            handshake_ttl_seconds: 600,
            encrypt_cookies: false,
            login_path: "/login".to_string(),
            providers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load and validate configuration
    ///
    /// `path` names an optional TOML file; environment variables override it.
    pub fn load(path: Option<&Path>) -> Result<Self, AuthError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(AuthError::ConfigError(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: Config = figment
            .merge(Env::raw().only(TYPED_ENV_KEYS))
            .merge(Serialized::defaults(string_env()))
            .extract()
            .map_err(|e| AuthError::ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AuthError> {
        self.host_url()?;

        if self.session_secret.len() < 32 {
            return Err(AuthError::InvalidConfig {
                key: "SESSION_SECRET".to_string(),
                reason: "must be at least 32 characters".to_string(),
            });
        }

        for (key, value) in [
            ("SESSION_TTL_DAYS", self.session_ttl_days),
            ("LONG_SESSION_TTL_DAYS", self.long_session_ttl_days),
            ("REDIRECT_TTL_SECONDS", self.redirect_ttl_seconds),
            ("HANDSHAKE_TTL_SECONDS", self.handshake_ttl_seconds),
        ] {
            if value <= 0 {
                return Err(AuthError::InvalidConfig {
                    key: key.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }

        if !self.login_path.starts_with('/') {
            return Err(AuthError::InvalidConfig {
                key: "LOGIN_PATH".to_string(),
                reason: "must be an absolute path".to_string(),
            });
        }

        Ok(())
    }

    /// The parsed `AUTH_HOST`
    pub fn host_url(&self) -> Result<Url, AuthError> {
        let invalid = |reason: &str| AuthError::InvalidConfig {
            key: "AUTH_HOST".to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&self.auth_host)
            .map_err(|e| invalid(&format!("not a valid URL ({})", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid("must use http or https"));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("must include a host"));
        }
        Ok(url)
    }

    pub fn record_ttl(&self) -> RecordTtl {
        RecordTtl {
            session: Duration::days(self.session_ttl_days),
            long_session: Duration::days(self.long_session_ttl_days),
            redirect_intent: Duration::seconds(self.redirect_ttl_seconds),
            handshake: Duration::seconds(self.handshake_ttl_seconds),
        }
    }

    /// Providers with credentials, as OAuth2 configurations
    pub fn enabled_providers(&self, host_url: &Url) -> Vec<(String, OAuth2ProviderConfig)> {
        self.providers
            .iter()
            .filter_map(|(name, settings)| {
                if settings.is_enabled() {
                    Some((name.clone(), settings.to_provider_config(name, host_url)))
                } else {
                    warn!(provider = %name, "provider has no client key, skipping");
                    None
                }
            })
            .collect()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// String settings from the environment, nested the way [`Config`] expects.
///
/// figment's `Env` would parse `0001` as a number or `[x` as an array, so
/// these values bypass it.
fn string_env() -> Value {
    let mut root = Map::new();

    for (var, value) in std::env::vars_os() {
        let (Ok(var), Ok(value)) = (var.into_string(), value.into_string()) else {
            continue;
        };

        if STRING_ENV_KEYS.contains(&var.as_str()) {
            root.insert(var.to_ascii_lowercase(), Value::String(value));
        } else if let Some((provider, field)) = provider_env_field(&var) {
            let providers = root
                .entry("providers")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(settings) = providers
                .as_object_mut()
                .map(|p| p.entry(provider).or_insert_with(|| Value::Object(Map::new())))
                .and_then(Value::as_object_mut)
            {
                settings.insert(field.to_string(), Value::String(value));
            }
        }
    }

    Value::Object(root)
}
