//! Network Module
//!
//! TCP server, client sessions and the socket type shared with the
//! downstream connector.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One thread per client session
//! - Each command fanned out through the shared `Forwarder`

mod server;
mod session;
mod stream;

pub use server::{Server, ShutdownHandle};
pub use session::Session;
pub use stream::{connect_within, Stream};
