//! Relay Module
//!
//! The fan-out core: per-backend connections and the forwarder that
//! drives them.
//!
//! ## Responsibilities
//! - Dial, handshake and exchange one command with a backend
//! - Forward each command to all backends concurrently
//! - Bound each round with a timeout
//! - Apply the quorum gate and version-based selection

mod downstream;
mod forwarder;

pub use downstream::Downstream;
pub use forwarder::{ForwardResult, Forwarder, STRAGGLER_GRACE};
