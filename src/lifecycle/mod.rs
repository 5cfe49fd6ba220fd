//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → server stops accepting, background loops exit
//!
//! Sweeper (sweeper.rs):
//!     Periodic timer → gate cleanup + expired cache purge
//!
//! Ticker (ticker.rs):
//!     Reloaded interval → background timers restarted at the new period
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans shutdown out to every long-running task
//! - Cleanup runs off the request path on its own interval

pub mod shutdown;
pub mod signals;
pub mod sweeper;
pub mod ticker;

pub use shutdown::Shutdown;
