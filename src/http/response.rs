//! Response handling and transformation.
//!
//! # Responsibilities
//! - Buffered response type shared by the cache, origin, and pipeline layers
//! - Strip hop-by-hop headers from origin responses
//! - Convert edge responses into Axum responses
//!
//! # Design Decisions
//! - Bodies are fully buffered so they can be cached and replayed verbatim
//! - Framing headers are recomputed by the server on the way out

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A complete response: status, headers, and buffered body.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EdgeResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Plain-text response generated by the edge itself.
    pub fn text(status: StatusCode, message: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self::new(status, headers, Bytes::from_static(message.as_bytes()))
    }

    /// Response received from an origin, with hop-by-hop and framing headers removed.
    pub fn from_upstream(status: StatusCode, mut headers: HeaderMap, body: Bytes) -> Self {
        for name in HOP_BY_HOP.iter() {
            headers.remove(name);
        }
        headers.remove(header::CONTENT_LENGTH);
        Self::new(status, headers, body)
    }

    /// Size of the response when serialized as HTTP/1.1.
    pub fn encoded_len(&self) -> u64 {
        let status_line = format!("HTTP/1.1 {}\r\n", self.status).len();
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + 2 + value.len() + 2)
            .sum();
        (status_line + headers + 2 + self.body.len()) as u64
    }
}

impl IntoResponse for EdgeResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
