//! Error taxonomy shared by the shield, cache, and origin layers.

use std::time::Duration;

/// Errors raised while admitting, caching, or fetching a request.
///
/// `RateLimitExceeded` and `ChallengeInvalidOrExpired` are ordinary decision
/// outcomes; the gate turns them into a deny or a failed verification. The
/// origin variants surface from the pipeline as a 502.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("challenge invalid or expired")]
    ChallengeInvalidOrExpired,

    #[error("no healthy origins available")]
    NoHealthyOrigin,

    #[error("origin {origin} timed out after {timeout:?}")]
    OriginTimeout { origin: String, timeout: Duration },

    #[error("origin {origin} fetch failed: {message}")]
    OriginFetchError { origin: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EdgeError {
    /// True for failures that originate upstream rather than in the edge itself.
    pub fn is_origin_failure(&self) -> bool {
        matches!(
            self,
            EdgeError::NoHealthyOrigin | EdgeError::OriginTimeout { .. } | EdgeError::OriginFetchError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EdgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_failures_are_told_apart_from_edge_faults() {
        let upstream = [
            EdgeError::NoHealthyOrigin,
            EdgeError::OriginTimeout {
                origin: "http://10.0.0.1/".into(),
                timeout: Duration::from_secs(5),
            },
            EdgeError::OriginFetchError {
                origin: "http://10.0.0.1/".into(),
                message: "connection refused".into(),
            },
        ];
        assert!(upstream.iter().all(EdgeError::is_origin_failure));

        let local = [
            EdgeError::RateLimitExceeded,
            EdgeError::ChallengeInvalidOrExpired,
            EdgeError::Config("bad".into()),
            EdgeError::Internal("poisoned".into()),
        ];
        assert!(!local.iter().any(EdgeError::is_origin_failure));
    }
}
