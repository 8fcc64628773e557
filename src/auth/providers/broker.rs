/// OAuth Broker
///
/// Runs the authorization-code handshake for the registered providers. The
/// only server-side state a handshake needs (state token, PKCE verifier) is
/// kept in a short-lived `oauthState` record in the client's cookie jar.
use super::{CallbackParams, IdentityBroker, OAuth2Provider, OAuth2ProviderConfig, ProviderFactory, ProviderIdentity};
use crate::auth::error::AuthError;
use crate::auth::pkce::{PkcePair, generate_state};
use crate::auth::records::{Record, RecordTtl, Records, field, values_of};
use crate::auth::store::RecordValues;
use async_trait::async_trait;
use axum_extra::extract::CookieJar;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Handshake in progress: the `oauthState` cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingHandshake {
    pub provider: String,
    pub state: String,
    pub code_verifier: String,
}

impl Record for PendingHandshake {
    const NAME: &'static str = "oauthState";
    const FIELDS: &'static [&'static str] = &["provider", "state", "codeVerifier"];

    fn ttl(ttl: &RecordTtl) -> Duration {
        ttl.handshake
    }

    fn from_values(values: &RecordValues) -> Self {
        Self {
            provider: field(values, "provider"),
            state: field(values, "state"),
            code_verifier: field(values, "codeVerifier"),
        }
    }

    fn to_values(&self) -> RecordValues {
        values_of([
            ("provider", self.provider.as_str()),
            ("state", self.state.as_str()),
            ("codeVerifier", self.code_verifier.as_str()),
        ])
    }
}

/// [`IdentityBroker`] over a registry of OAuth2 providers
pub struct OAuthBroker {
    providers: HashMap<String, Arc<Box<dyn OAuth2Provider>>>,
    records: Records,
}

impl OAuthBroker {
    pub fn new(records: Records) -> Self {
        Self {
            providers: HashMap::new(),
            records,
        }
    }

    /// Register an OAuth2 provider from configuration
    pub fn register_provider(
        &mut self,
        provider_name: &str,
        provider_config: OAuth2ProviderConfig,
    ) -> Result<(), AuthError> {
        let provider = ProviderFactory::create_provider(provider_name, provider_config)?;
        self.register(provider);
        Ok(())
    }

    /// Register an already constructed provider under its own name
    pub fn register(&mut self, provider: Box<dyn OAuth2Provider>) {
        info!(provider = %provider.name(), "registered OAuth2 provider");
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get_provider(&self, provider_name: &str) -> Result<Arc<Box<dyn OAuth2Provider>>, AuthError> {
        self.providers
            .get(provider_name)
            .cloned()
            .ok_or_else(|| AuthError::UnsupportedProvider(provider_name.to_string()))
    }
}

#[async_trait]
impl IdentityBroker for OAuthBroker {
    fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    async fn complete_auth(
        &self,
        provider_name: &str,
        params: &CallbackParams,
        jar: CookieJar,
    ) -> Result<(CookieJar, ProviderIdentity), AuthError> {
        let provider = self.get_provider(provider_name)?;

        let pending = self
            .records
            .load::<PendingHandshake>(&jar)
            .filter(|pending| pending.provider == provider_name)
            .ok_or(AuthError::InvalidState)?;

        if let Some(error) = &params.error {
            return Err(AuthError::ProviderError(format!(
                "{}: {}",
                error,
                params.error_description.as_deref().unwrap_or("no description")
            )));
        }

        let code = params
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::OAuth2Error("callback carries no authorization code".to_string()))?;

        let state = params.state.as_deref().unwrap_or_default();
        if pending.state.is_empty() || !bool::from(pending.state.as_bytes().ct_eq(state.as_bytes())) {
            warn!(provider = %provider_name, "OAuth2 state mismatch");
            return Err(AuthError::InvalidState);
        }

        let tokens = provider.exchange_code(code, &pending.code_verifier).await?;
        let user_info = provider.get_user_info(&tokens).await?;

        info!(provider = %provider_name, user_id = %user_info.provider_user_id, "OAuth2 handshake completed");

        let jar = self.records.clear::<PendingHandshake>(jar);
        Ok((
            jar,
            ProviderIdentity {
                user_id: user_info.provider_user_id,
                email: user_info.email,
                provider: provider_name.to_string(),
                refresh_token: tokens.refresh_token.unwrap_or_default(),
            },
        ))
    }

    async fn begin_auth(
        &self,
        provider_name: &str,
        jar: CookieJar,
    ) -> Result<(CookieJar, String), AuthError> {
        let provider = self.get_provider(provider_name)?;

        let pkce = PkcePair::generate();
        let pending = PendingHandshake {
            provider: provider_name.to_string(),
            state: generate_state(),
            code_verifier: pkce.code_verifier,
        };

        let auth_url = provider.authorization_url(&pending.state, &pkce.code_challenge)?;
        debug!(provider = %provider_name, "starting OAuth2 handshake");

        Ok((self.records.save(jar, &pending), auth_url))
    }

    async fn logout(&self, provider_name: &str, jar: CookieJar) -> CookieJar {
        debug!(provider = %provider_name, "dropping OAuth2 handshake state");
        self.records.clear::<PendingHandshake>(jar)
    }
}
