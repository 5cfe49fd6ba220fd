//! Client identity used as the subject of rate windows and challenges.

use std::fmt;
use std::net::IpAddr;

use axum::http::{header, HeaderMap};

/// A rate/challenge subject: the peer address plus its user-agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    pub address: IpAddr,
    pub user_agent: String,
}

impl ClientIdentity {
    pub fn new(address: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            address,
            user_agent: user_agent.into(),
        }
    }

    /// Build an identity from the peer address and the request's `User-Agent` header.
    /// A missing or non-UTF-8 header yields an empty agent.
    pub fn from_headers(address: IpAddr, headers: &HeaderMap) -> Self {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Self::new(address, user_agent)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.address, self.user_agent)
    }
}
