//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts and intervals in `1..=MAX_DURATION_SECS`, ceilings > 0)
//! - Check origin URLs are usable by the fetch client
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::config::schema::EdgeConfig;

/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Clamp a duration to [`MAX_DURATION_SECS`] so `Instant` arithmetic cannot overflow.
pub fn bounded(duration: Duration) -> Duration {
    duration.min(Duration::from_secs(MAX_DURATION_SECS))
}

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no origins configured")]
    NoOrigins,
    #[error("origin {url}: {reason}")]
    InvalidOrigin { url: String, reason: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} must be at most {max} seconds")]
    TooLarge { field: &'static str, max: u64 },
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("hotlink protection enabled without allowed domains")]
    HotlinkWithoutDomains,
}

fn check_duration(errors: &mut Vec<ValidationError>, secs: u64, field: &'static str) {
    if secs == 0 {
        errors.push(ValidationError::Zero { field });
    } else if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::TooLarge {
            field,
            max: MAX_DURATION_SECS,
        });
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.origins.is_empty() {
        errors.push(ValidationError::NoOrigins);
    }

    for origin in &config.origins {
        match Url::parse(&origin.url) {
            Ok(url) if url.scheme() != "http" => errors.push(ValidationError::InvalidOrigin {
                url: origin.url.clone(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            }),
            Ok(url) if url.host_str().is_none() => errors.push(ValidationError::InvalidOrigin {
                url: origin.url.clone(),
                reason: "missing host".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidOrigin {
                url: origin.url.clone(),
                reason: e.to_string(),
            }),
        }
        check_duration(&mut errors, origin.timeout_secs, "origins.timeout_secs");
    }

    if config.shield.max_requests_per_minute == 0 {
        errors.push(ValidationError::Zero { field: "shield.max_requests_per_minute" });
    }

    let durations = [
        (config.shield.challenge_timeout_secs, "shield.challenge_timeout_secs"),
        (config.shield.verified_window_secs, "shield.verified_window_secs"),
        (config.shield.cleanup_interval_secs, "shield.cleanup_interval_secs"),
        (config.cache.ttl_secs, "cache.ttl_secs"),
        (config.health_check.interval_secs, "health_check.interval_secs"),
        (config.health_check.timeout_secs, "health_check.timeout_secs"),
        (config.timeouts.request_secs, "timeouts.request_secs"),
    ];
    for (value, field) in durations {
        check_duration(&mut errors, value, field);
    }

    let mut addresses = vec![("listener.bind_address", &config.listener.bind_address)];
    if config.admin.enabled {
        addresses.push(("admin.bind_address", &config.admin.bind_address));
    }
    if config.observability.metrics_enabled {
        addresses.push(("observability.metrics_address", &config.observability.metrics_address));
    }
    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress { field, value: value.clone() });
        }
    }

    if config.hotlink.enabled && config.hotlink.allowed_domains.is_empty() {
        errors.push(ValidationError::HotlinkWithoutDomains);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
