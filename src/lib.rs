//! # resprelay
//!
//! A transparent RESP relay with:
//! - One client-facing endpoint in front of several backend stores
//! - Concurrent fan-out of every command to all backends
//! - A quorum gate on successful replies
//! - Freshest-reply selection for versioned reads
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │               (one thread per client)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Session Loop                              │
//! │          decode command → forward → write reply              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Forwarder                                │
//! │     fan-out, deadline-bounded aggregation, selection         │
//! └──────────┬──────────────────┬──────────────────┬────────────┘
//!            │                  │                  │
//!            ▼                  ▼                  ▼
//!     ┌────────────┐     ┌────────────┐     ┌────────────┐
//!     │ Downstream │     │ Downstream │     │ Downstream │
//!     │ (backend 1)│     │ (backend 2)│     │ (backend N)│
//!     └────────────┘     └────────────┘     └────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod relay;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RelayError, Result};
pub use config::{Config, Network, RemoteAddr};
pub use protocol::Value;
pub use relay::Forwarder;
pub use network::Server;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of resprelay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
