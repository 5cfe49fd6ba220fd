//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge node.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Admission gate ("shield") settings.
    pub shield: ShieldConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Upstream origin definitions.
    pub origins: Vec<OriginConfig>,

    /// Origin health probing settings.
    pub health_check: HealthCheckConfig,

    /// Referer-based hotlink protection.
    pub hotlink: HotlinkConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Admission gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Enable the admission gate. When disabled every request is allowed.
    pub enabled: bool,

    /// Seconds a challenge stays answerable after issuance.
    pub challenge_timeout_secs: u64,

    /// Seconds a successful verification keeps an identity admitted.
    pub verified_window_secs: u64,

    /// Requests allowed per identity per 60-second window.
    pub max_requests_per_minute: u32,

    /// Addresses that are always admitted.
    pub whitelist_addresses: Vec<IpAddr>,

    /// Addresses that are always denied.
    pub blacklist_addresses: Vec<IpAddr>,

    /// Case-insensitive user-agent substrings that mark a client as an automated tool.
    pub suspicious_agent_signatures: Vec<String>,

    /// Interval of the sweep that drops expired challenges and rate windows.
    pub cleanup_interval_secs: u64,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            challenge_timeout_secs: 300,
            verified_window_secs: 3600,
            max_requests_per_minute: 60,
            whitelist_addresses: vec![
                IpAddr::from([127, 0, 0, 1]),
                IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1]),
            ],
            blacklist_addresses: Vec::new(),
            suspicious_agent_signatures: default_agent_signatures(),
            cleanup_interval_secs: 60,
        }
    }
}

fn default_agent_signatures() -> Vec<String> {
    [
        "bot", "crawler", "spider", "scraper", "curl", "wget", "python", "java", "masscan", "nmap",
        "sqlmap", "nikto", "dirb", "gobuster",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Order in which cache entries are evicted when the size cap is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionStrategy {
    /// Entries that expire soonest go first.
    #[default]
    ExpiryAscending,
    /// Entries inserted earliest go first.
    InsertionOrder,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store successful origin responses.
    pub enabled: bool,

    /// Lifetime of a cached response in seconds.
    pub ttl_secs: u64,

    /// Aggregate size cap in bytes (0 = unbounded).
    pub max_size_bytes: u64,

    /// Eviction order once the cap is exceeded.
    pub eviction_strategy: EvictionStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_size_bytes: 100 * 1024 * 1024,
            eviction_strategy: EvictionStrategy::ExpiryAscending,
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginConfig {
    /// Base URL of the origin (e.g., "http://10.0.0.5:8000").
    pub url: String,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_origin_timeout")]
    pub timeout_secs: u64,

    /// Configured weight. Reported, not used for selection.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Include this origin in the periodic health probe.
    #[serde(default = "default_health_check_enabled")]
    pub health_check_enabled: bool,
}

fn default_origin_timeout() -> u64 {
    10
}

fn default_weight() -> u32 {
    1
}

fn default_health_check_enabled() -> bool {
    true
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Health probe interval in seconds.
    pub interval_secs: u64,

    /// Health probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe on each origin.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
        }
    }
}

/// Hotlink protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HotlinkConfig {
    /// Reject requests whose Referer is not an allowed domain.
    pub enabled: bool,

    /// Domains (and their subdomains) allowed to embed content.
    pub allowed_domains: Vec<String>,
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for handling one inbound request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest origin response body that will be buffered.
    pub max_response_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
