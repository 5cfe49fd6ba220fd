//! Admission control ("shield") subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (peer address, headers):
//!     → identity.rs (address + user-agent subject)
//!     → gate.rs (whitelist → blacklist → agent screen → rate window
//!                → verified grant → issue challenge)
//!         → rate_limit.rs (fixed 60s window per identity)
//!         → challenge.rs (outstanding challenge + verified grants)
//!     → Allow | Challenge(descriptor) | Deny(reason)
//! ```
//!
//! # Design Decisions
//! - State is owned by one gate instance, never module-level
//! - Mutations are serialized (DashMap shard locks, a Mutex for challenges)
//! - Fail open on internal faults, logged at error level

pub mod challenge;
pub mod gate;
pub mod identity;
pub mod rate_limit;

pub use challenge::{ChallengeDescriptor, ChallengeKind, ChallengePrompt, ChallengeStore, CHALLENGE_COOKIE};
pub use gate::{AdmissionGate, Decision, DenyReason, GateStats};
pub use identity::ClientIdentity;
pub use rate_limit::RateLimiter;
