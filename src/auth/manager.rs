/// Authentication Manager
///
/// Drives the login-continuation flow: begin-auth, the provider callback and
/// logout. All flow state lives in typed records in the client's cookie jar;
/// the OAuth handshake itself is delegated to an [`IdentityBroker`].
use crate::auth::middleware::User;
use crate::auth::providers::{CallbackParams, IdentityBroker, ProviderIdentity};
use crate::auth::records::{LongTermRecord, Records, RedirectIntent, SessionRecord};
use crate::auth::redirect::RedirectValidator;
use crate::auth::AuthError;
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query parameters accepted by the auth and logout routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthQuery {
    /// Where to send the client once the flow finishes
    pub redirect: Option<String>,

    /// Authorization code from provider
    pub code: Option<String>,

    /// CSRF state token
    pub state: Option<String>,

    /// Error from provider
    pub error: Option<String>,

    /// Error description from provider
    pub error_description: Option<String>,
}

impl AuthQuery {
    /// The requested destination; an empty parameter counts as absent.
    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref().filter(|r| !r.is_empty())
    }

    pub fn callback_params(&self) -> CallbackParams {
        CallbackParams {
            code: self.code.clone(),
            state: self.state.clone(),
            error: self.error.clone(),
            error_description: self.error_description.clone(),
        }
    }
}

/// Outcome of a flow step. The jar is returned on both paths so records
/// written before a failure still reach the client.
pub type FlowResponse = (CookieJar, Result<Redirect, AuthError>);

/// Central authentication manager
pub struct AuthManager {
    broker: Arc<dyn IdentityBroker>,
    records: Records,
    validator: RedirectValidator,
    login_path: String,
}

impl AuthManager {
    pub fn new(
        broker: Arc<dyn IdentityBroker>,
        records: Records,
        validator: RedirectValidator,
        login_path: String,
    ) -> Self {
        Self {
            broker,
            records,
            validator,
            login_path,
        }
    }

    /// List all configured providers
    pub fn list_providers(&self) -> Vec<String> {
        self.broker.providers()
    }

    pub fn validator(&self) -> &RedirectValidator {
        &self.validator
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    fn ensure_provider(&self, provider: &str) -> Result<(), AuthError> {
        if self.broker.providers().iter().any(|p| p == provider) {
            Ok(())
        } else {
            warn!(provider, "request for unconfigured provider");
            Err(AuthError::UnsupportedProvider(provider.to_string()))
        }
    }

    /// `GET /auth/{provider}`
    ///
    /// Completes silently when a handshake is already satisfiable; otherwise
    /// records the requested destination and hands the client to the
    /// provider.
    pub async fn begin_auth(&self, provider: &str, query: &AuthQuery, jar: CookieJar) -> FlowResponse {
        if let Err(e) = self.ensure_provider(provider) {
            return (jar, Err(e));
        }

        match self
            .broker
            .complete_auth(provider, &query.callback_params(), jar.clone())
            .await
        {
            Ok((jar, identity)) => return self.on_logged_in(jar, identity, query),
            Err(e) => debug!(provider, error = %e, "no completable handshake, starting a new one"),
        }

        let mut jar = jar;
        if let Some(target) = query.redirect() {
            let Some(target) = self.validator.validate(target) else {
                return (jar, Err(AuthError::InvalidRedirect));
            };
            jar = self.records.save(
                jar,
                &RedirectIntent {
                    target_url: target.into(),
                },
            );
        }

        match self.broker.begin_auth(provider, jar.clone()).await {
            Ok((jar, auth_url)) => (jar, Ok(Redirect::temporary(&auth_url))),
            Err(e) => (jar, Err(e)),
        }
    }

    /// `GET /auth/{provider}/callback`
    pub async fn complete_auth(&self, provider: &str, query: &AuthQuery, jar: CookieJar) -> FlowResponse {
        if let Err(e) = self.ensure_provider(provider) {
            return (jar, Err(e));
        }

        match self
            .broker
            .complete_auth(provider, &query.callback_params(), jar.clone())
            .await
        {
            Ok((jar, identity)) => self.on_logged_in(jar, identity, query),
            Err(e) => (jar, Err(e)),
        }
    }

    /// `GET /logout/{provider}`
    ///
    /// Ends the session but keeps the provider in the long-term record.
    pub async fn logout(&self, provider: &str, query: &AuthQuery, jar: CookieJar) -> FlowResponse {
        if let Err(e) = self.ensure_provider(provider) {
            return (jar, Err(e));
        }

        let jar = self.records.clear::<SessionRecord>(jar);

        let mut long = self.records.load::<LongTermRecord>(&jar).unwrap_or_default();
        long.refresh_token.clear();
        let jar = self.records.save(jar, &long);

        let jar = self.broker.logout(provider, jar).await;
        info!(provider, "user logged out");

        self.redirect_to_destination(jar, query)
    }

    fn on_logged_in(&self, jar: CookieJar, identity: ProviderIdentity, query: &AuthQuery) -> FlowResponse {
        let jar = self.records.save(
            jar,
            &LongTermRecord {
                provider: identity.provider.clone(),
                refresh_token: identity.refresh_token,
            },
        );
        let jar = self.records.save(
            jar,
            &SessionRecord {
                user_id: identity.user_id.clone(),
                email: identity.email,
            },
        );
        info!(provider = %identity.provider, user_id = %identity.user_id, "user logged in");

        self.redirect_to_destination(jar, query)
    }

    /// Send the client to the requested or stored destination. The query
    /// parameter wins over the stored intent; either is validated first.
    fn redirect_to_destination(&self, jar: CookieJar, query: &AuthQuery) -> FlowResponse {
        let target = match query.redirect() {
            Some(target) => Some(target.to_string()),
            None => self
                .records
                .load::<RedirectIntent>(&jar)
                .map(|intent| intent.target_url),
        };

        let Some(target) = target else {
            warn!("no redirect target in query or stored intent");
            return (jar, Err(AuthError::InvalidRedirect));
        };

        let Some(target) = self.validator.validate(&target) else {
            return (jar, Err(AuthError::InvalidRedirect));
        };

        let jar = self.records.clear::<RedirectIntent>(jar);
        (jar, Ok(Redirect::temporary(target.as_str())))
    }

    /// Project the session records of a request into a [`User`].
    ///
    /// `None` unless the session carries a non-empty user id.
    pub fn resolve_user(&self, jar: &CookieJar) -> Option<User> {
        let session = self
            .records
            .load::<SessionRecord>(jar)
            .filter(|session| !session.user_id.is_empty())?;

        let provider = self
            .records
            .load::<LongTermRecord>(jar)
            .map(|long| long.provider)
            .unwrap_or_default();

        Some(User {
            user_id: session.user_id,
            email: session.email,
            provider,
        })
    }
}
