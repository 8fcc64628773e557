/// Cookie-backed Record Store
///
/// Named, flat string-to-string records carried by the client in cookies.
/// Each record is serialized as JSON together with its expiry, then either
/// signed (HMAC-SHA256) or sealed (AES-256-GCM) with the session secret.
/// Anything that fails to open, parse or is past its expiry reads as absent.
use std::collections::BTreeMap;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error};
use url::{Host, Url};

use super::domain::apex_domain;

type HmacSha256 = Hmac<Sha256>;

/// Field values of a single record.
pub type RecordValues = BTreeMap<String, String>;

/// Wire envelope: the values plus an absolute expiry in unix seconds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    exp: i64,
    values: RecordValues,
}

/// Read/write access to named records attached to an HTTP exchange.
///
/// Reads never fail: a missing, tampered, malformed or expired record is
/// `None`. Writes that cannot be encoded leave the jar untouched.
pub trait RecordStore: Send + Sync + 'static {
    fn get(&self, jar: &CookieJar, name: &str) -> Option<RecordValues>;

    fn set(&self, jar: CookieJar, name: &str, values: &RecordValues, ttl: Duration) -> CookieJar;

    fn clear(&self, jar: CookieJar, name: &str) -> CookieJar;
}

/// Turns an envelope into a cookie value and back.
pub trait RecordCodec: Send + Sync + 'static {
    fn seal(&self, name: &str, payload: &[u8]) -> Option<String>;

    fn open(&self, name: &str, value: &str) -> Option<Vec<u8>>;
}

/// HMAC-SHA256 signing. The payload stays readable by the client.
///
/// Value layout: `base64url(payload) "." base64url(mac)` where the MAC covers
/// `name "|" base64url(payload)`.
pub struct SignedCodec {
    secret: Vec<u8>,
}

impl SignedCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    fn mac(&self, name: &str, encoded_payload: &str) -> Option<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret).ok()?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(encoded_payload.as_bytes());
        Some(mac)
    }
}

impl RecordCodec for SignedCodec {
    fn seal(&self, name: &str, payload: &[u8]) -> Option<String> {
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let signature = self.mac(name, &encoded)?.finalize().into_bytes();
        Some(format!("{}.{}", encoded, URL_SAFE_NO_PAD.encode(signature)))
    }

    fn open(&self, name: &str, value: &str) -> Option<Vec<u8>> {
        let (encoded, signature) = value.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.mac(name, encoded)?.verify_slice(&signature).ok()?;
        URL_SAFE_NO_PAD.decode(encoded).ok()
    }
}

/// AES-256-GCM sealing keyed by `SHA-256(secret)`. The cookie name is bound
/// as associated data.
///
/// Value layout: `base64url(nonce || ciphertext)`.
pub struct SealedCodec {
    cipher: Aes256Gcm,
}

impl SealedCodec {
    pub fn new(secret: &[u8]) -> Self {
        let key: [u8; 32] = Sha256::digest(secret).into();
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }
}

impl RecordCodec for SealedCodec {
    fn seal(&self, name: &str, payload: &[u8]) -> Option<String> {
        let nonce_bytes: [u8; 12] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: payload,
                    aad: name.as_bytes(),
                },
            )
            .ok()?;

        let mut sealed = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Some(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn open(&self, name: &str, value: &str) -> Option<Vec<u8>> {
        let sealed = URL_SAFE_NO_PAD.decode(value).ok()?;
        if sealed.len() < 12 {
            return None;
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(12);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: name.as_bytes(),
                },
            )
            .ok()
    }
}

/// Attributes shared by every record cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    /// `Domain` attribute; `None` keeps the cookie host-only.
    pub domain: Option<String>,
    /// `Secure` attribute.
    pub secure: bool,
}

impl CookiePolicy {
    /// Derive the policy from the configured service URL: secure iff https,
    /// scoped to the apex domain. IP-literal hosts stay host-only since a
    /// `Domain` attribute cannot name them.
    pub fn for_host(host_url: &Url) -> Self {
        let domain = match host_url.host() {
            Some(Host::Domain(host)) => Some(apex_domain(host)),
            _ => None,
        };

        Self {
            domain,
            secure: host_url.scheme() == "https",
        }
    }
}

/// Record store over request/response cookies.
pub struct CookieRecordStore<C> {
    codec: C,
    policy: CookiePolicy,
}

/// Store whose cookies are signed but readable.
pub type SignedCookieStore = CookieRecordStore<SignedCodec>;

/// Store whose cookies are encrypted and authenticated.
pub type SealedCookieStore = CookieRecordStore<SealedCodec>;

impl<C: RecordCodec> CookieRecordStore<C> {
    pub fn new(codec: C, policy: CookiePolicy) -> Self {
        Self { codec, policy }
    }

    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    fn build_cookie(&self, name: &str, value: String, max_age: time::Duration) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value))
            .path("/")
            .http_only(true)
            .secure(self.policy.secure)
            .same_site(SameSite::Lax)
            .max_age(max_age);

        if let Some(domain) = &self.policy.domain {
            builder = builder.domain(domain.clone());
        }

        builder.build()
    }

    pub(crate) fn get_at(
        &self,
        jar: &CookieJar,
        name: &str,
        now: DateTime<Utc>,
    ) -> Option<RecordValues> {
        let cookie = jar.get(name)?;
        if cookie.value().is_empty() {
            return None;
        }

        let Some(payload) = self.codec.open(name, cookie.value()) else {
            debug!(record = name, "record failed verification, treating as absent");
            return None;
        };

        let envelope: Envelope = match serde_json::from_slice(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(record = name, error = %e, "record payload malformed, treating as absent");
                return None;
            }
        };

        if envelope.exp <= now.timestamp() {
            debug!(record = name, "record expired");
            return None;
        }

        Some(envelope.values)
    }

    pub(crate) fn set_at(
        &self,
        jar: CookieJar,
        name: &str,
        values: &RecordValues,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> CookieJar {
        let envelope = Envelope {
            exp: (now + ttl).timestamp(),
            values: values.clone(),
        };

        let sealed = serde_json::to_vec(&envelope)
            .ok()
            .and_then(|payload| self.codec.seal(name, &payload));

        match sealed {
            Some(value) => {
                let max_age = time::Duration::seconds(ttl.num_seconds());
                jar.add(self.build_cookie(name, value, max_age))
            }
            None => {
                error!(record = name, "failed to encode record, leaving cookie unchanged");
                jar
            }
        }
    }
}

impl<C: RecordCodec> RecordStore for CookieRecordStore<C> {
    fn get(&self, jar: &CookieJar, name: &str) -> Option<RecordValues> {
        self.get_at(jar, name, Utc::now())
    }

    fn set(&self, jar: CookieJar, name: &str, values: &RecordValues, ttl: Duration) -> CookieJar {
        self.set_at(jar, name, values, ttl, Utc::now())
    }

    fn clear(&self, jar: CookieJar, name: &str) -> CookieJar {
        jar.add(self.build_cookie(name, String::new(), time::Duration::ZERO))
    }
}
