/// Provider Presets
///
/// Endpoint and profile-mapping tables for the providers supported out of
/// the box. Anything not listed here can still be configured as a custom
/// provider by supplying all three endpoint URLs.
use super::OAuth2ProviderConfig;
use crate::auth::error::AuthError;

/// Names of the providers that have a preset, in routing form
pub const KNOWN_PROVIDERS: &[&str] = &[
    "amazon",
    "discord",
    "facebook",
    "google",
    "twitch",
    "twitterv2",
];

/// How the client credentials are presented to the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// HTTP Basic `client_id:client_secret`
    Basic,
    /// `client_id` and `client_secret` in the form body
    Form,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPreset {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    /// JSON pointer to the stable user id in the profile document
    pub id_pointer: String,
    /// JSON pointer to the email address; may be missing from the document
    pub email_pointer: String,
    pub client_auth: ClientAuth,
    /// Send `Client-Id: <client_id>` with profile requests
    pub client_id_header: bool,
    /// Fixed authorization request parameters
    pub auth_params: Vec<(String, String)>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl ProviderPreset {
    fn new(
        auth_url: &str,
        token_url: &str,
        userinfo_url: &str,
        scopes: &[&str],
        id_pointer: &str,
        email_pointer: &str,
    ) -> Self {
        Self {
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            userinfo_url: userinfo_url.to_string(),
            scopes: strings(scopes),
            id_pointer: id_pointer.to_string(),
            email_pointer: email_pointer.to_string(),
            client_auth: ClientAuth::Form,
            client_id_header: false,
            auth_params: Vec::new(),
        }
    }

    /// Look up the preset for a lower-case provider name
    pub fn find(name: &str) -> Option<Self> {
        let preset = match name {
            "amazon" => Self::new(
                "https://www.amazon.com/ap/oa",
                "https://api.amazon.com/auth/o2/token",
                "https://api.amazon.com/user/profile",
                &["profile"],
                "/user_id",
                "/email",
            ),
            "discord" => Self::new(
                "https://discord.com/api/oauth2/authorize",
                "https://discord.com/api/oauth2/token",
                "https://discord.com/api/users/@me",
                &["identify", "email"],
                "/id",
                "/email",
            ),
            "facebook" => Self::new(
                "https://www.facebook.com/v18.0/dialog/oauth",
                "https://graph.facebook.com/v18.0/oauth/access_token",
                "https://graph.facebook.com/me?fields=id,email",
                &["email"],
                "/id",
                "/email",
            ),
            "google" => Self {
                auth_params: vec![
                    ("access_type".to_string(), "offline".to_string()),
                    ("prompt".to_string(), "consent".to_string()),
                ],
                ..Self::new(
                    "https://accounts.google.com/o/oauth2/v2/auth",
                    "https://oauth2.googleapis.com/token",
                    "https://openidconnect.googleapis.com/v1/userinfo",
                    &["openid", "email", "profile"],
                    "/sub",
                    "/email",
                )
            },
            "twitch" => Self {
                client_id_header: true,
                ..Self::new(
                    "https://id.twitch.tv/oauth2/authorize",
                    "https://id.twitch.tv/oauth2/token",
                    "https://api.twitch.tv/helix/users",
                    &["user:read:email"],
                    "/data/0/id",
                    "/data/0/email",
                )
            },
            "twitterv2" => Self {
                client_auth: ClientAuth::Basic,
                ..Self::new(
                    "https://twitter.com/i/oauth2/authorize",
                    "https://api.twitter.com/2/oauth2/token",
                    "https://api.twitter.com/2/users/me",
                    &["users.read", "tweet.read", "offline.access"],
                    "/data/id",
                    "/data/email",
                )
            },
            _ => return None,
        };
        Some(preset)
    }

    /// Preset for a provider without a table entry: all endpoints must be
    /// configured; the profile is read with OIDC claim names.
    pub fn custom(name: &str, config: &OAuth2ProviderConfig) -> Result<Self, AuthError> {
        let required = |value: &Option<String>, field: &str| {
            value.clone().ok_or_else(|| {
                AuthError::ConfigError(format!(
                    "Unknown OAuth2 provider {}: {} must be configured",
                    name, field
                ))
            })
        };

        Ok(Self::new(
            &required(&config.auth_url, "auth_url")?,
            &required(&config.token_url, "token_url")?,
            &required(&config.userinfo_url, "userinfo_url")?,
            &["openid", "email"],
            "/sub",
            "/email",
        ))
    }

    /// Environment prefix for this provider's settings
    pub fn env_prefix(name: &str) -> String {
        match name {
            "twitterv2" => "TWITTER".to_string(),
            other => other.to_uppercase(),
        }
    }
}
