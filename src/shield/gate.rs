//! Per-request admission decision.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use serde::Serialize;

use crate::config::ShieldConfig;
use crate::error::{EdgeError, Result};
use crate::observability::metrics;
use crate::shield::challenge::{ChallengeDescriptor, ChallengeKind, ChallengeStore, CHALLENGE_COOKIE};
use crate::shield::identity::ClientIdentity;
use crate::shield::rate_limit::RateLimiter;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Blocked,
    SuspiciousAgent,
    RateLimited,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Blocked => "blocked",
            DenyReason::SuspiciousAgent => "suspicious agent",
            DenyReason::RateLimited => "rate limited",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`AdmissionGate::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Challenge(ChallengeDescriptor),
    Deny(DenyReason),
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Challenge(_) => "challenge",
            Decision::Deny(_) => "deny",
        }
    }
}

/// Composes allow/deny lists, agent screening, rate windows, and challenges.
///
/// Evaluation order, first match wins: whitelist, blacklist, suspicious
/// agent, rate window, verified grant (or an echoed cookie-echo token),
/// otherwise issue a challenge.
///
/// An unexpected internal fault while deciding admits the request. This
/// fail-open posture is deliberate and is logged at error level every time
/// it triggers.
#[derive(Debug)]
pub struct AdmissionGate {
    enabled: bool,
    whitelist: HashSet<IpAddr>,
    blacklist: HashSet<IpAddr>,
    agent_signatures: Vec<String>,
    limiter: RateLimiter,
    challenges: ChallengeStore,
}

impl AdmissionGate {
    pub fn new(config: &ShieldConfig) -> Self {
        Self {
            enabled: config.enabled,
            whitelist: config.whitelist_addresses.iter().copied().collect(),
            blacklist: config.blacklist_addresses.iter().copied().collect(),
            agent_signatures: config
                .suspicious_agent_signatures
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            limiter: RateLimiter::new(config.max_requests_per_minute),
            challenges: ChallengeStore::new(
                Duration::from_secs(config.challenge_timeout_secs),
                Duration::from_secs(config.verified_window_secs),
            ),
        }
    }

    pub fn decide(&self, identity: &ClientIdentity, headers: &HeaderMap) -> Decision {
        self.decide_at(identity, headers, Instant::now())
    }

    pub fn decide_at(&self, identity: &ClientIdentity, headers: &HeaderMap, now: Instant) -> Decision {
        if !self.enabled {
            return Decision::Allow;
        }

        let decision = match self.evaluate(identity, headers, now) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(client = %identity, error = %e, "Admission check failed, failing open");
                metrics::record_admission_fail_open();
                Decision::Allow
            }
        };

        match &decision {
            Decision::Deny(reason) => {
                tracing::warn!(client = %identity, reason = %reason, "Request denied");
            }
            Decision::Challenge(descriptor) => {
                tracing::debug!(client = %identity, kind = descriptor.kind().as_str(), "Challenge issued");
            }
            Decision::Allow => {}
        }
        metrics::record_admission(&decision);
        decision
    }

    fn evaluate(&self, identity: &ClientIdentity, headers: &HeaderMap, now: Instant) -> Result<Decision> {
        if self.whitelist.contains(&identity.address) {
            return Ok(Decision::Allow);
        }
        if self.blacklist.contains(&identity.address) {
            return Ok(Decision::Deny(DenyReason::Blocked));
        }
        if self.is_suspicious_agent(&identity.user_agent) {
            return Ok(Decision::Deny(DenyReason::SuspiciousAgent));
        }
        if let Err(EdgeError::RateLimitExceeded) = self.check_rate(identity, now) {
            return Ok(Decision::Deny(DenyReason::RateLimited));
        }
        if self.challenges.is_verified_at(identity, now)? {
            return Ok(Decision::Allow);
        }
        if self.accept_echoed_cookie(identity, headers, now)? {
            return Ok(Decision::Allow);
        }

        let challenge = self.challenges.issue_at(identity, now)?;
        Ok(Decision::Challenge(challenge.descriptor(now)))
    }

    fn check_rate(&self, identity: &ClientIdentity, now: Instant) -> Result<()> {
        if self.limiter.allow_at(identity, now) {
            Ok(())
        } else {
            Err(EdgeError::RateLimitExceeded)
        }
    }

    fn is_suspicious_agent(&self, user_agent: &str) -> bool {
        let agent = user_agent.to_lowercase();
        self.agent_signatures.iter().any(|sig| agent.contains(sig.as_str()))
    }

    /// A cookie-echo challenge completes when the browser returns its cookie.
    fn accept_echoed_cookie(&self, identity: &ClientIdentity, headers: &HeaderMap, now: Instant) -> Result<bool> {
        let Some(token) = challenge_cookie(headers) else {
            return Ok(false);
        };
        if self.challenges.live_kind_at(identity, now)? != Some(ChallengeKind::CookieEcho) {
            return Ok(false);
        }
        match self.challenges.try_verify_at(identity, token, Some(token), now) {
            Ok(()) => Ok(true),
            Err(EdgeError::ChallengeInvalidOrExpired) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn verify(&self, identity: &ClientIdentity, token: &str, answer: Option<&str>) -> bool {
        self.verify_at(identity, token, answer, Instant::now())
    }

    /// Check an answer; success opens the identity's verified window.
    pub fn verify_at(&self, identity: &ClientIdentity, token: &str, answer: Option<&str>, now: Instant) -> bool {
        let verified = self.challenges.verify_at(identity, token, answer, now);
        metrics::record_verification(verified);
        if !verified {
            tracing::info!(client = %identity, "Challenge verification rejected");
        }
        verified
    }

    /// Drop expired challenges, grants, and closed rate windows.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) {
        let windows = self.limiter.cleanup_at(now);
        match self.challenges.cleanup_at(now) {
            Ok((challenges, grants)) => {
                tracing::debug!(windows, challenges, grants, "Shield state swept");
            }
            Err(e) => tracing::error!(error = %e, "Shield sweep failed"),
        }
    }

    /// Snapshot of tracked state for the admin API.
    pub fn stats(&self) -> GateStats {
        let (challenges, verified) = self.challenges.counts().unwrap_or_default();
        GateStats {
            enabled: self.enabled,
            rate_windows: self.limiter.tracked(),
            outstanding_challenges: challenges,
            verified_identities: verified,
        }
    }
}

/// Counts of tracked shield state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GateStats {
    pub enabled: bool,
    pub rate_windows: usize,
    pub outstanding_challenges: usize,
    pub verified_identities: usize,
}

fn challenge_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CHALLENGE_COOKIE)
        .map(|(_, value)| value.trim())
}
