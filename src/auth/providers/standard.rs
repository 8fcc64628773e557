/// Standard OAuth2 Provider Implementation
///
/// Authorization-code flow with PKCE against any provider described by a
/// [`ProviderPreset`]. Configured endpoint URLs and scopes take precedence
/// over the preset's.
use super::{
    ClientAuth, OAuth2Provider, OAuth2ProviderConfig, OAuth2TokenResponse, OAuth2UserInfo,
    ProviderPreset,
};
use crate::auth::error::AuthError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// OAuth2 token request
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

pub struct StandardProvider {
    name: String,
    preset: ProviderPreset,
    config: OAuth2ProviderConfig,
    http_client: reqwest::Client,
}

impl StandardProvider {
    pub fn new(
        name: String,
        preset: ProviderPreset,
        config: OAuth2ProviderConfig,
    ) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::OAuth2Error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name,
            preset,
            config,
            http_client,
        })
    }

    fn auth_url(&self) -> &str {
        self.config.auth_url.as_deref().unwrap_or(&self.preset.auth_url)
    }

    fn token_url(&self) -> &str {
        self.config
            .token_url
            .as_deref()
            .unwrap_or(&self.preset.token_url)
    }

    fn userinfo_url(&self) -> &str {
        self.config
            .userinfo_url
            .as_deref()
            .unwrap_or(&self.preset.userinfo_url)
    }

    fn scopes(&self) -> &[String] {
        if self.config.scopes.is_empty() {
            &self.preset.scopes
        } else {
            &self.config.scopes
        }
    }

    /// Map a provider profile document onto [`OAuth2UserInfo`]
    fn convert_userinfo(&self, profile: Value) -> Result<OAuth2UserInfo, AuthError> {
        let provider_user_id = profile
            .pointer(&self.preset.id_pointer)
            .and_then(scalar_to_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AuthError::UserInfoFailed(format!(
                    "profile has no user id at {}",
                    self.preset.id_pointer
                ))
            })?;

        let email = profile
            .pointer(&self.preset.email_pointer)
            .and_then(scalar_to_string)
            .unwrap_or_default();

        Ok(OAuth2UserInfo {
            provider_user_id,
            email,
            raw_data: profile,
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl OAuth2Provider for StandardProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, AuthError> {
        let mut url = url::Url::parse(self.auth_url())
            .map_err(|e| AuthError::ConfigError(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.scopes().join(" "));
            query.append_pair("state", state);
            query.append_pair("code_challenge", code_challenge);
            query.append_pair("code_challenge_method", "S256");

            for (key, value) in &self.preset.auth_params {
                query.append_pair(key, value);
            }

            for (key, value) in &self.config.extra_params {
                query.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuth2TokenResponse, AuthError> {
        let token_request = TokenRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.config.redirect_uri,
            code_verifier,
            client_id: &self.config.client_id,
            client_secret: match self.preset.client_auth {
                ClientAuth::Form => Some(&self.config.client_secret),
                ClientAuth::Basic => None,
            },
        };

        let mut request = self
            .http_client
            .post(self.token_url())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&token_request);

        if self.preset.client_auth == ClientAuth::Basic {
            request = request.basic_auth(&self.config.client_id, Some(&self.config.client_secret));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::CodeExchangeFailed(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::CodeExchangeFailed(format!(
                "Token request failed with status {}: {}",
                status, error_text
            )));
        }

        let tokens: OAuth2TokenResponse = response.json().await.map_err(|e| {
            AuthError::CodeExchangeFailed(format!("Failed to parse token response: {}", e))
        })?;

        debug!(
            provider = %self.name,
            has_refresh_token = tokens.refresh_token.is_some(),
            "authorization code exchanged"
        );
        Ok(tokens)
    }

    async fn get_user_info(&self, tokens: &OAuth2TokenResponse) -> Result<OAuth2UserInfo, AuthError> {
        let mut request = self
            .http_client
            .get(self.userinfo_url())
            .bearer_auth(&tokens.access_token)
            .header(reqwest::header::ACCEPT, "application/json");

        if self.preset.client_id_header {
            request = request.header("Client-Id", &self.config.client_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::UserInfoFailed(format!("UserInfo request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::UserInfoFailed(format!(
                "UserInfo request failed with status {}: {}",
                status, error_text
            )));
        }

        let profile: Value = response
            .json()
            .await
            .map_err(|e| AuthError::UserInfoFailed(format!("Failed to parse userinfo: {}", e)))?;

        self.convert_userinfo(profile)
    }
}
