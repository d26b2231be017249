//! Session Loop
//!
//! Handles one client connection: decode a command, forward it, write the
//! reply, repeat. The next command is not read until the current reply has
//! been flushed, so replies leave in the order commands arrived.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::protocol::{Value, ValueReader, ValueWriter};
use crate::relay::Forwarder;

/// Handles a single client connection
pub struct Session {
    /// Client reader (buffered for efficiency)
    reader: ValueReader<BufReader<TcpStream>>,

    /// Client writer (buffered for efficiency)
    writer: ValueWriter<BufWriter<TcpStream>>,

    /// Shared, immutable fan-out engine
    forwarder: Arc<Forwarder>,

    /// Peer address for logging
    peer_addr: String,
}

impl Session {
    /// Create a session over an accepted socket
    pub fn new(stream: TcpStream, forwarder: Arc<Forwarder>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: ValueReader::new(BufReader::new(read_stream)),
            writer: ValueWriter::new(BufWriter::new(stream)),
            forwarder,
            peer_addr,
        })
    }

    /// Run until the client disconnects or a fatal error occurs
    ///
    /// Returns `Ok(())` on a clean disconnect. Any `Err` means the session
    /// was torn down: a malformed command, a round with no usable reply, or
    /// a failed write to the client.
    pub fn run(&mut self) -> Result<()> {
        tracing::debug!("Session started for {}", self.peer_addr);

        loop {
            let command = match self.reader.read_command() {
                Ok(Some(command)) => command,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(RelayError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Connection reset by client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);

            let reply = match self.forwarder.forward(&command) {
                Ok(reply) => reply,
                Err(RelayError::Downstream { remote, reason }) => {
                    tracing::warn!(
                        "Relaying failure of {} to {}: {}",
                        remote, self.peer_addr, reason
                    );
                    downstream_error_reply(&remote, &reason)
                }
                Err(e) => return Err(e),
            };

            if let Err(e) = self.send(&reply) {
                if let RelayError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before reply could be sent",
                            self.peer_addr
                        );
                        return Ok(());
                    }
                }
                return Err(e);
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    fn send(&mut self, reply: &Value) -> Result<()> {
        self.writer.write_value(reply)?;
        self.writer.flush()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Closes the socket for both clones, on every exit path including unwinding.
        let _ = self.writer.get_ref().get_ref().shutdown(Shutdown::Both);
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}

/// Protocol error value for a failure that is not fatal to the session
fn downstream_error_reply(remote: &str, reason: &str) -> Value {
    let message = format!("ERR relay: {}: {}", remote, reason);
    Value::Error(message.replace(['\r', '\n'], " "))
}
