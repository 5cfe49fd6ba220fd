//! Presentation of gate decisions to clients.
//!
//! Renderers see only the challenge descriptor; the expected answer never
//! leaves the challenge store.

use std::net::IpAddr;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::shield::{ChallengeDescriptor, ChallengePrompt, DenyReason};

/// Turns a challenge descriptor into the response sent to the client.
pub trait ChallengeRenderer: Send + Sync {
    fn render(&self, descriptor: &ChallengeDescriptor) -> Response;
}

/// Renders a 403 JSON document. Cookie-echo challenges also set the
/// challenge cookie so a browser echoes it on the next request.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonChallengeRenderer;

impl ChallengeRenderer for JsonChallengeRenderer {
    fn render(&self, descriptor: &ChallengeDescriptor) -> Response {
        let body = json!({
            "error": "Challenge Required",
            "challenge": descriptor,
            "verify": "/__edge/verify",
        });
        let mut response = (StatusCode::FORBIDDEN, Json(body)).into_response();

        if let ChallengePrompt::CookieEcho { cookie } = &descriptor.prompt {
            let value = format!(
                "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
                cookie, descriptor.token, descriptor.expires_in_secs
            );
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    response.headers_mut().insert(header::SET_COOKIE, value);
                }
                Err(e) => tracing::error!(error = %e, "Challenge cookie is not a valid header value"),
            }
        }
        response
    }
}

/// 403 for a denied request.
pub fn deny_response(reason: DenyReason, ip: IpAddr) -> Response {
    let body = json!({
        "error": "Access Denied",
        "reason": reason.as_str(),
        "ip": ip.to_string(),
    });
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}
