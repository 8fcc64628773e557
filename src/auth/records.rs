/// Typed Session Records
///
/// Each cookie carries exactly one record type with a fixed name, field set
/// and lifetime. Decoding is all-or-nothing: a payload holding any field
/// outside the record's contract is treated as absent.
use std::sync::Arc;

use axum_extra::extract::CookieJar;
use chrono::Duration;
use tracing::debug;

use super::store::{RecordStore, RecordValues};

/// Lifetimes of the records written by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTtl {
    pub session: Duration,
    pub long_session: Duration,
    pub redirect_intent: Duration,
    pub handshake: Duration,
}

impl Default for RecordTtl {
    fn default() -> Self {
        Self {
            session: Duration::days(30),
            long_session: Duration::days(365),
            redirect_intent: Duration::hours(1),
            handshake: Duration::minutes(10),
        }
    }
}

/// A record schema bound to one cookie name.
pub trait Record: Sized {
    /// Cookie name.
    const NAME: &'static str;

    /// Every field the record may carry.
    const FIELDS: &'static [&'static str];

    fn ttl(ttl: &RecordTtl) -> Duration;

    /// Build from values already checked against [`Record::FIELDS`]. Missing
    /// fields read as empty strings.
    fn from_values(values: &RecordValues) -> Self;

    fn to_values(&self) -> RecordValues;

    fn decode(values: &RecordValues) -> Option<Self> {
        if let Some(unknown) = values
            .keys()
            .find(|key| !Self::FIELDS.contains(&key.as_str()))
        {
            debug!(record = Self::NAME, field = %unknown, "record carries unknown field, treating as absent");
            return None;
        }
        Some(Self::from_values(values))
    }
}

pub(crate) fn field(values: &RecordValues, key: &str) -> String {
    values.get(key).cloned().unwrap_or_default()
}

pub(crate) fn values_of<const N: usize>(pairs: [(&str, &str); N]) -> RecordValues {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Short-lived identity: the `user` cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: String,
    pub email: String,
}

impl Record for SessionRecord {
    const NAME: &'static str = "user";
    const FIELDS: &'static [&'static str] = &["userId", "email"];

    fn ttl(ttl: &RecordTtl) -> Duration {
        ttl.session
    }

    fn from_values(values: &RecordValues) -> Self {
        Self {
            user_id: field(values, "userId"),
            email: field(values, "email"),
        }
    }

    fn to_values(&self) -> RecordValues {
        values_of([("userId", self.user_id.as_str()), ("email", self.email.as_str())])
    }
}

/// Long-lived provider data: the `long` cookie.
///
/// `provider` outlives logout so applications can show the last provider used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongTermRecord {
    pub provider: String,
    pub refresh_token: String,
}

impl Record for LongTermRecord {
    const NAME: &'static str = "long";
    const FIELDS: &'static [&'static str] = &["provider", "refreshToken"];

    fn ttl(ttl: &RecordTtl) -> Duration {
        ttl.long_session
    }

    fn from_values(values: &RecordValues) -> Self {
        Self {
            provider: field(values, "provider"),
            refresh_token: field(values, "refreshToken"),
        }
    }

    fn to_values(&self) -> RecordValues {
        values_of([
            ("provider", self.provider.as_str()),
            ("refreshToken", self.refresh_token.as_str()),
        ])
    }
}

/// Where to send the client once login completes: the `redirectTo` cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectIntent {
    pub target_url: String,
}

impl Record for RedirectIntent {
    const NAME: &'static str = "redirectTo";
    const FIELDS: &'static [&'static str] = &["redirectTo"];

    fn ttl(ttl: &RecordTtl) -> Duration {
        ttl.redirect_intent
    }

    fn from_values(values: &RecordValues) -> Self {
        Self {
            target_url: field(values, "redirectTo"),
        }
    }

    fn to_values(&self) -> RecordValues {
        values_of([("redirectTo", self.target_url.as_str())])
    }
}

/// Typed access to records through an explicitly constructed store.
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn RecordStore>,
    ttl: RecordTtl,
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>, ttl: RecordTtl) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> &RecordTtl {
        &self.ttl
    }

    pub fn load<R: Record>(&self, jar: &CookieJar) -> Option<R> {
        self.store
            .get(jar, R::NAME)
            .and_then(|values| R::decode(&values))
    }

    /// Write `record`, resetting its lifetime.
    pub fn save<R: Record>(&self, jar: CookieJar, record: &R) -> CookieJar {
        self.store
            .set(jar, R::NAME, &record.to_values(), R::ttl(&self.ttl))
    }

    pub fn clear<R: Record>(&self, jar: CookieJar) -> CookieJar {
        self.store.clear(jar, R::NAME)
    }
}
