//! Origin subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline cache miss
//!     → selector.rs select() (uniform over healthy endpoints)
//!     → selector.rs fetch() (per-origin timeout, body buffered)
//!     → EdgeResponse or OriginTimeout / OriginFetchError
//!
//! Health monitor
//!     → endpoint.rs set_healthy() after each probe
//! ```
//!
//! # Design Decisions
//! - Health flags are atomics so probes never block selection
//! - A failed fetch is not retried against another origin

pub mod endpoint;
pub mod selector;

pub use endpoint::OriginEndpoint;
pub use selector::{OriginSelector, EDGE_USER_AGENT};
