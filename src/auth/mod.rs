// Authentication Module
// OAuth2 login broker with signed cookie-backed session records

pub mod config;
pub mod domain;
pub mod error;
pub mod manager;
pub mod middleware;
pub mod pkce;
pub mod providers;
pub mod records;
pub mod redirect;
pub mod routes;
pub mod store;

pub use config::ProviderSettings;
pub use domain::apex_domain;
pub use error::AuthError;
pub use manager::{AuthManager, AuthQuery};
pub use middleware::{CurrentUser, User, require_auth, with_user};
pub use providers::{IdentityBroker, OAuthBroker, ProviderIdentity};
pub use records::{LongTermRecord, Record, RecordTtl, Records, RedirectIntent, SessionRecord};
pub use redirect::{RedirectValidator, is_safe_redirect};
pub use routes::create_auth_router;
pub use store::{
    CookiePolicy, CookieRecordStore, RecordStore, SealedCodec, SealedCookieStore, SignedCodec,
    SignedCookieStore,
};
