//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each origin with health checks enabled (concurrently)
//!     → OriginEndpoint::set_healthy
//! ```
//!
//! # Design Decisions
//! - Probes run off the request path; failures never reach clients
//! - One probe result decides the flag; no flap thresholds
//! - An unhealthy origin stays in the set and is probed again next tick

pub mod active;
