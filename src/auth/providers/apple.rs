/// Sign in with Apple
///
/// Apple has no userinfo endpoint: the user id and email come from the
/// `id_token` returned by the token endpoint, verified against Apple's
/// published keys. The client secret is either configured as-is (a
/// pre-generated JWT) or minted here as an ES256 JWT from the team id, key
/// id and private key.
///
/// Apple posts the callback (`response_mode=form_post`) and does not take
/// part in PKCE; the broker's state check still applies.
use super::{OAuth2Provider, OAuth2ProviderConfig, OAuth2TokenResponse, OAuth2UserInfo};
use crate::auth::error::AuthError;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub const APPLE: &str = "apple";

const APPLE_AUTH_URL: &str = "https://appleid.apple.com/auth/authorize";
const APPLE_TOKEN_URL: &str = "https://appleid.apple.com/auth/token";
const APPLE_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";
const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Six months, the longest lifetime Apple accepts for a client secret
const CLIENT_SECRET_TTL_SECS: i64 = 15_777_000;

/// Key material for minting Apple client secrets
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSecretKey {
    /// Apple Developer Team ID
    pub team_id: String,

    /// Sign in with Apple key ID
    pub key_id: String,

    /// PKCS#8 PEM; literal `\n` sequences are accepted for single-line
    /// environment values
    pub private_key: String,
}

impl fmt::Debug for ClientSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretKey")
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ClientSecretClaims<'a> {
    iss: &'a str,
    iat: i64,
    exp: i64,
    aud: &'a str,
    sub: &'a str,
}

/// Mint the client secret JWT Apple expects at its token endpoint
pub fn generate_client_secret(
    key: &ClientSecretKey,
    client_id: &str,
    now: i64,
) -> Result<String, AuthError> {
    let claims = ClientSecretClaims {
        iss: &key.team_id,
        iat: now,
        exp: now + CLIENT_SECRET_TTL_SECS,
        aud: APPLE_ISSUER,
        sub: client_id,
    };

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(key.key_id.clone());

    let pem = key.private_key.replace("\\n", "\n");
    let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes())
        .map_err(|e| AuthError::ConfigError(format!("Invalid Apple private key: {}", e)))?;

    encode(&header, &claims, &encoding_key)
        .map_err(|e| AuthError::Internal(format!("Failed to sign Apple client secret: {}", e)))
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

pub struct AppleProvider {
    config: OAuth2ProviderConfig,
    http_client: reqwest::Client,
}

impl AppleProvider {
    pub fn new(mut config: OAuth2ProviderConfig) -> Result<Self, AuthError> {
        if config.scopes.is_empty() {
            config.scopes = vec!["name".to_string(), "email".to_string()];
        }

        // Fail at start-up rather than on the first login
        if let Some(key) = &config.client_secret_key {
            generate_client_secret(key, &config.client_id, Utc::now().timestamp())?;
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::OAuth2Error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn client_secret(&self) -> Result<String, AuthError> {
        match &self.config.client_secret_key {
            Some(key) => generate_client_secret(key, &self.config.client_id, Utc::now().timestamp()),
            None => Ok(self.config.client_secret.clone()),
        }
    }

    /// The key set document; a configured userinfo URL replaces it
    fn jwks_url(&self) -> &str {
        self.config.userinfo_url.as_deref().unwrap_or(APPLE_JWKS_URL)
    }

    /// Verify an `id_token` against a JWKS document and read the identity
    fn decode_id_token(&self, id_token: &str, jwks: &Value) -> Result<OAuth2UserInfo, AuthError> {
        let invalid = |reason: String| AuthError::UserInfoFailed(format!("Invalid id_token: {}", reason));

        let header = decode_header(id_token).map_err(|e| invalid(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| invalid("missing key id".to_string()))?;

        let jwk = jwks["keys"]
            .as_array()
            .and_then(|keys| keys.iter().find(|k| k["kid"].as_str() == Some(kid.as_str())))
            .ok_or_else(|| invalid(format!("unknown key id {}", kid)))?;
        let (Some(n), Some(e)) = (jwk["n"].as_str(), jwk["e"].as_str()) else {
            return Err(invalid("key is not an RSA key".to_string()));
        };
        let decoding_key = DecodingKey::from_rsa_components(n, e).map_err(|e| invalid(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.config.client_id]);
        validation.set_issuer(&[APPLE_ISSUER]);

        let claims = decode::<Value>(id_token, &decoding_key, &validation)
            .map_err(|e| invalid(e.to_string()))?
            .claims;

        let provider_user_id = claims["sub"]
            .as_str()
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| invalid("missing subject".to_string()))?
            .to_string();
        let email = claims["email"].as_str().unwrap_or_default().to_string();

        Ok(OAuth2UserInfo {
            provider_user_id,
            email,
            raw_data: claims,
        })
    }
}

#[async_trait]
impl OAuth2Provider for AppleProvider {
    fn name(&self) -> &str {
        APPLE
    }

    fn authorization_url(&self, state: &str, _code_challenge: &str) -> Result<String, AuthError> {
        let auth_url = self.config.auth_url.as_deref().unwrap_or(APPLE_AUTH_URL);
        let mut url = url::Url::parse(auth_url)
            .map_err(|e| AuthError::ConfigError(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", state);
            query.append_pair("response_mode", "form_post");

            for (key, value) in &self.config.extra_params {
                query.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
    ) -> Result<OAuth2TokenResponse, AuthError> {
        let client_secret = self.client_secret()?;
        let token_request = TokenRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.config.redirect_uri,
            client_id: &self.config.client_id,
            client_secret: &client_secret,
        };

        let token_url = self.config.token_url.as_deref().unwrap_or(APPLE_TOKEN_URL);
        let response = self
            .http_client
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&token_request)
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
            provider = APPLE,
            has_refresh_token = tokens.refresh_token.is_some(),
            has_id_token = tokens.id_token.is_some(),
            "authorization code exchanged"
        );
        Ok(tokens)
    }

    async fn get_user_info(&self, tokens: &OAuth2TokenResponse) -> Result<OAuth2UserInfo, AuthError> {
        let id_token = tokens.id_token.as_deref().ok_or_else(|| {
            AuthError::UserInfoFailed("Apple token response carried no id_token".to_string())
        })?;

        let response = self
            .http_client
            .get(self.jwks_url())
            .send()
            .await
            .map_err(|e| AuthError::UserInfoFailed(format!("JWKS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::UserInfoFailed(format!(
                "JWKS request failed with status {}",
                response.status()
            )));
        }

        let jwks: Value = response
            .json()
            .await
            .map_err(|e| AuthError::UserInfoFailed(format!("Failed to parse JWKS: {}", e)))?;

        self.decode_id_token(id_token, &jwks)
    }
}
