// Authentication Configuration
// Per-provider OAuth2 credentials and the environment variables they come from

use serde::{Deserialize, Serialize};
use url::Url;

use super::providers::preset::{KNOWN_PROVIDERS, ProviderPreset};
use super::providers::{APPLE, ClientSecretKey, OAuth2ProviderConfig};

/// Environment suffixes and the provider setting each one fills
const PROVIDER_ENV_FIELDS: &[(&str, &str)] = &[
    ("_KEY", "key"),
    ("_SECRET", "secret"),
    ("_AUTH_URL", "auth_url"),
    ("_TOKEN_URL", "token_url"),
    ("_USERINFO_URL", "userinfo_url"),
    ("_SCOPES", "scopes"),
    ("_TEAM_ID", "team_id"),
    ("_KEY_ID", "key_id"),
    ("_PRIVATE_KEY", "private_key"),
];

/// OAuth2 provider credentials and endpoint overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// OAuth2 client ID
    #[serde(default)]
    pub key: String,

    /// OAuth2 client secret
    #[serde(default)]
    pub secret: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_url: Option<String>,

    /// Space or comma separated; empty means the preset defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,

    /// Apple: with `key_id` and `private_key`, replaces a pre-generated
    /// client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl ProviderSettings {
    /// A provider without a client ID is not offered
    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }

    /// Build the OAuth2 configuration, with the callback URL derived from
    /// the service host
    pub fn to_provider_config(&self, name: &str, auth_host: &Url) -> OAuth2ProviderConfig {
        OAuth2ProviderConfig {
            client_id: self.key.clone(),
            client_secret: self.secret.clone(),
            scopes: self
                .scopes
                .as_deref()
                .unwrap_or_default()
                .split([' ', ','])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            redirect_uri: callback_url(auth_host, name),
            auth_url: self.auth_url.clone(),
            token_url: self.token_url.clone(),
            userinfo_url: self.userinfo_url.clone(),
            extra_params: Default::default(),
            client_secret_key: self.client_secret_key(),
        }
    }

    fn client_secret_key(&self) -> Option<ClientSecretKey> {
        match (&self.team_id, &self.key_id, &self.private_key) {
            (Some(team_id), Some(key_id), Some(private_key))
                if !team_id.is_empty() && !key_id.is_empty() && !private_key.is_empty() =>
            {
                Some(ClientSecretKey {
                    team_id: team_id.clone(),
                    key_id: key_id.clone(),
                    private_key: private_key.clone(),
                })
            }
            _ => None,
        }
    }
}

/// `<AUTH_HOST>/auth/<name>/callback`
pub fn callback_url(auth_host: &Url, name: &str) -> String {
    format!(
        "{}/auth/{}/callback",
        auth_host.as_str().trim_end_matches('/'),
        name
    )
}

/// Map a provider environment variable such as `GOOGLE_KEY` or
/// `TWITTER_SECRET` to its provider and setting (`("google", "key")`).
pub fn provider_env_field(var: &str) -> Option<(&'static str, &'static str)> {
    let var = var.to_ascii_uppercase();
    std::iter::once(&APPLE).chain(KNOWN_PROVIDERS).find_map(|name| {
        let prefix = ProviderPreset::env_prefix(name);
        let suffix = var.strip_prefix(&prefix)?;
        PROVIDER_ENV_FIELDS
            .iter()
            .find(|(env_suffix, _)| *env_suffix == suffix)
            .map(|(_, field)| (*name, *field))
    })
}
