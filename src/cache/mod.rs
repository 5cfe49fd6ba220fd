//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline miss → origin fetch succeeds
//!     → store.rs set(path, response, ttl)
//!     → size computed from the HTTP/1.1 encoding
//!     → eviction if aggregate size > cap (down to 80% of cap)
//!
//! Pipeline lookup:
//!     → store.rs get(path)
//!     → expired entries removed on read
//! ```
//!
//! # Design Decisions
//! - One mutex around the map; lookups and evictions are in-memory only
//! - Two eviction orders: soonest expiry first, or insertion order
//! - Per-process; no coordination across edge instances

pub mod store;

pub use store::{CacheStats, ResponseCache};
