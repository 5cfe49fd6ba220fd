//! Referer-based hotlink protection.

use axum::http::{header, HeaderMap};
use url::Url;

/// Admits requests whose `Referer` host is an allowed domain or a subdomain of one.
#[derive(Debug, Clone)]
pub struct HotlinkGuard {
    allowed_domains: Vec<String>,
}

impl HotlinkGuard {
    pub fn new(allowed_domains: &[String]) -> Self {
        Self {
            allowed_domains: allowed_domains.iter().map(|d| d.trim().to_ascii_lowercase()).collect(),
        }
    }

    /// A missing referer is direct access and always allowed. An unparsable one is rejected.
    pub fn check(&self, headers: &HeaderMap) -> bool {
        let Some(referer) = headers.get(header::REFERER) else {
            return true;
        };
        let host = referer
            .to_str()
            .ok()
            .and_then(|value| Url::parse(value).ok())
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));

        match host {
            Some(host) => self.allowed_domains.iter().any(|domain| {
                host == *domain || host.strip_suffix(domain.as_str()).is_some_and(|prefix| prefix.ends_with('.'))
            }),
            None => false,
        }
    }
}
