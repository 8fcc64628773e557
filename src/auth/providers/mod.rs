/// OAuth2 Provider implementations
///
/// A generic OAuth2Provider trait, one preset-driven implementation covering
/// most supported providers, Sign in with Apple, and the IdentityBroker seam
/// the flow controller depends on.
use crate::auth::error::AuthError;
use async_trait::async_trait;
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod apple;
pub mod broker;
pub mod preset;
pub mod standard;

pub use apple::{APPLE, AppleProvider, ClientSecretKey, generate_client_secret};
pub use broker::{OAuthBroker, PendingHandshake};
pub use preset::{ClientAuth, ProviderPreset};
pub use standard::StandardProvider;

/// User information returned from OAuth2 providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2UserInfo {
    /// Unique user identifier from the provider
    pub provider_user_id: String,

    /// User's email address, empty when the provider does not share it
    pub email: String,

    /// The full profile document
    pub raw_data: serde_json::Value,
}

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2TokenResponse {
    /// Access token for API requests
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: Option<String>,

    /// Token expiration time in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Refresh token for obtaining new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// OAuth2 scopes granted
    #[serde(default)]
    pub scope: Option<String>,

    /// OpenID Connect ID token
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Configuration for an OAuth2 provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuth2ProviderConfig {
    /// Client ID from the provider
    pub client_id: String,

    /// Client secret from the provider
    pub client_secret: String,

    /// OAuth2 scopes to request; empty means the preset defaults
    pub scopes: Vec<String>,

    /// Redirect URI (callback URL)
    pub redirect_uri: String,

    /// Authorization endpoint URL (if custom)
    pub auth_url: Option<String>,

    /// Token endpoint URL (if custom)
    pub token_url: Option<String>,

    /// UserInfo endpoint URL (if custom)
    pub userinfo_url: Option<String>,

    /// Additional authorization request parameters
    pub extra_params: HashMap<String, String>,

    /// Key material for providers that take a signed JWT as client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_key: Option<ClientSecretKey>,
}

impl OAuth2ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.is_empty() {
            return Err(AuthError::ConfigError(
                "OAuth2 client_id cannot be empty".to_string(),
            ));
        }

        if self.client_secret.is_empty() && self.client_secret_key.is_none() {
            return Err(AuthError::ConfigError(
                "OAuth2 client_secret cannot be empty".to_string(),
            ));
        }

        url::Url::parse(&self.redirect_uri)
            .map_err(|e| AuthError::ConfigError(format!("Invalid redirect_uri: {}", e)))?;

        for endpoint in [&self.auth_url, &self.token_url, &self.userinfo_url]
            .into_iter()
            .flatten()
        {
            url::Url::parse(endpoint).map_err(|e| {
                AuthError::ConfigError(format!("Invalid endpoint URL {}: {}", endpoint, e))
            })?;
        }

        Ok(())
    }
}

/// Generic OAuth2 provider trait
///
/// Authorization-code flow with PKCE. Each implementation knows how to
/// address one provider's endpoints and read its profile document.
#[async_trait]
pub trait OAuth2Provider: Send + Sync {
    /// Provider name as used in routes (e.g. "google", "twitterv2")
    fn name(&self) -> &str;

    /// Build the URL the client is sent to in order to authorize
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, AuthError>;

    /// Exchange the authorization code for tokens
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuth2TokenResponse, AuthError>;

    /// Read the user's identity from the token response, typically by
    /// calling the userinfo endpoint with the access token
    async fn get_user_info(&self, tokens: &OAuth2TokenResponse) -> Result<OAuth2UserInfo, AuthError>;
}

/// Provider factory for creating OAuth2 providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create an OAuth2 provider from configuration
    ///
    /// Known names use their preset; any other name needs all three
    /// endpoint URLs configured.
    pub fn create_provider(
        provider_name: &str,
        config: OAuth2ProviderConfig,
    ) -> Result<Box<dyn OAuth2Provider>, AuthError> {
        config.validate()?;

        let name = provider_name.to_lowercase();
        if name == APPLE {
            return Ok(Box::new(AppleProvider::new(config)?));
        }

        let preset = match ProviderPreset::find(&name) {
            Some(preset) => preset.clone(),
            None => ProviderPreset::custom(&name, &config)?,
        };

        Ok(Box::new(StandardProvider::new(name, preset, config)?))
    }
}

/// Parameters a provider sends back to the callback route, as a query
/// string or a `form_post` body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    /// Authorization code from provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// CSRF state token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Error from provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error description from provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Identity established by a completed handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub user_id: String,
    pub email: String,
    pub provider: String,
    pub refresh_token: String,
}

/// The OAuth handshake as seen by the flow controller.
///
/// Handshake state travels in the cookie jar, so every operation takes the
/// jar and hands back the one to send with the response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityBroker: Send + Sync {
    /// Names of the configured providers, sorted
    fn providers(&self) -> Vec<String>;

    /// Finish a pending handshake for `provider`
    async fn complete_auth(
        &self,
        provider: &str,
        params: &CallbackParams,
        jar: CookieJar,
    ) -> Result<(CookieJar, ProviderIdentity), AuthError>;

    /// Start a handshake; returns the provider authorization URL
    async fn begin_auth(
        &self,
        provider: &str,
        jar: CookieJar,
    ) -> Result<(CookieJar, String), AuthError>;

    /// Drop any handshake state held for the client
    async fn logout(&self, provider: &str, jar: CookieJar) -> CookieJar;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuth2ProviderConfig {
        OAuth2ProviderConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            scopes: vec!["email".to_string()],
            redirect_uri: "https://auth.example.com/auth/google/callback".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_config_validation() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_provider_config_validation_empty_client_id() {
        let config = OAuth2ProviderConfig {
            client_id: "".to_string(),
            ..config()
        };

        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_provider_config_validation_invalid_redirect_uri() {
        let config = OAuth2ProviderConfig {
            redirect_uri: "not-a-url".to_string(),
            ..config()
        };

        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_provider_config_validation_invalid_endpoint() {
        let config = OAuth2ProviderConfig {
            token_url: Some("::".to_string()),
            ..config()
        };

        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_factory_uses_preset() {
        let provider = ProviderFactory::create_provider("Google", config()).unwrap();
        assert_eq!(provider.name(), "google");
    }

    #[test]
    fn test_factory_builds_apple_provider() {
        let config = OAuth2ProviderConfig {
            redirect_uri: "https://auth.example.com/auth/apple/callback".to_string(),
            ..config()
        };
        let provider = ProviderFactory::create_provider("apple", config).unwrap();
        assert_eq!(provider.name(), "apple");

        let url = provider.authorization_url("s", "c").unwrap();
        assert!(url.starts_with("https://appleid.apple.com/auth/authorize?"));
    }

    #[test]
    fn test_signing_key_stands_in_for_client_secret() {
        let key = ClientSecretKey {
            team_id: "TEAM".to_string(),
            key_id: "KEY".to_string(),
            private_key: "pem".to_string(),
        };
        let config = OAuth2ProviderConfig {
            client_secret: String::new(),
            client_secret_key: Some(key),
            ..config()
        };
        assert!(config.validate().is_ok());

        let config = OAuth2ProviderConfig {
            client_secret: String::new(),
            ..self::config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_factory_rejects_unknown_provider_without_endpoints() {
        let result = ProviderFactory::create_provider("myspace", config());
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_factory_accepts_custom_provider_with_endpoints() {
        let config = OAuth2ProviderConfig {
            auth_url: Some("https://id.example.net/authorize".to_string()),
            token_url: Some("https://id.example.net/token".to_string()),
            userinfo_url: Some("https://id.example.net/userinfo".to_string()),
            ..config()
        };
        let provider = ProviderFactory::create_provider("corp", config).unwrap();
        assert_eq!(provider.name(), "corp");
    }
}
