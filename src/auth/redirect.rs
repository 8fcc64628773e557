/// Redirect Validation
///
/// Guards every caller-influenced redirect. A target is accepted only when it
/// shares the scheme and the apex domain of the configured service host. IP
/// literal hosts have no apex and must match exactly.
use tracing::warn;
use url::{Host, Url};

use super::domain::apex_domain;

/// Validates a candidate redirect target against a configured host URL.
///
/// Both arguments are parsed; an unparsable value on either side rejects.
pub fn is_safe_redirect(candidate: &str, configured_host: &str) -> bool {
    let Ok(host_url) = Url::parse(configured_host) else {
        warn!(configured_host, "configured host is not a valid URL");
        return false;
    };

    RedirectValidator::new(host_url).validate(candidate).is_some()
}

/// Redirect validator bound to the service host parsed at start-up.
#[derive(Debug, Clone)]
pub struct RedirectValidator {
    host_url: Url,
}

impl RedirectValidator {
    pub fn new(host_url: Url) -> Self {
        Self { host_url }
    }

    pub fn host_url(&self) -> &Url {
        &self.host_url
    }

    /// Returns the parsed target when `candidate` may be used as a redirect.
    ///
    /// Callers must redirect to (and persist) the returned URL, never the raw
    /// candidate. Candidates carrying whitespace or control characters are
    /// rejected outright since the URL parser would silently drop them.
    pub fn validate(&self, candidate: &str) -> Option<Url> {
        if candidate
            .chars()
            .any(|c| c.is_control() || c.is_whitespace())
        {
            warn!(
                candidate = %candidate.escape_debug(),
                "redirect target contains whitespace or control characters"
            );
            return None;
        }

        let redirect_url = match Url::parse(candidate) {
            Ok(url) => url,
            Err(e) => {
                warn!(candidate, error = %e, "redirect target is not a valid URL");
                return None;
            }
        };

        if redirect_url.scheme() != self.host_url.scheme() {
            warn!(
                candidate,
                scheme = redirect_url.scheme(),
                expected = self.host_url.scheme(),
                "redirect target scheme does not match auth scheme"
            );
            return None;
        }

        let (Some(redirect_host), Some(auth_host)) = (redirect_url.host(), self.host_url.host())
        else {
            warn!(candidate, "redirect target has no host");
            return None;
        };

        let same_site = match (&redirect_host, &auth_host) {
            (Host::Domain(redirect_domain), Host::Domain(auth_domain)) => {
                apex_domain(redirect_domain) == apex_domain(auth_domain)
            }
            _ => redirect_host == auth_host,
        };
        if !same_site {
            warn!(
                candidate,
                "redirect target apex domain does not match auth apex domain"
            );
            return None;
        }

        Some(redirect_url)
    }
}
