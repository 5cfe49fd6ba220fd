//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, client identity)
//!     → shield middleware (AdmissionGate decision)
//!         → render.rs on challenge or deny
//!     → request pipeline (hotlink, cache, origin)
//!     → response.rs (buffered response back to the client)
//! ```

pub mod render;
pub mod request;
pub mod response;
pub mod server;

pub use render::{ChallengeRenderer, JsonChallengeRenderer};
pub use request::X_REQUEST_ID;
pub use response::EdgeResponse;
pub use server::{AppState, HttpServer};
