//! Edge node with an admission shield in front of a caching origin fetcher.

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod origin;
pub mod pipeline;
pub mod runtime;
pub mod shield;

pub use config::EdgeConfig;
pub use error::{EdgeError, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::EdgeRequestPipeline;
pub use runtime::{EdgeRuntime, SharedRuntime};
