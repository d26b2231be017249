//! Downstream Connector
//!
//! One short-lived connection to one backend. Every forwarded command dials
//! a fresh connection, proves it is live with a PING handshake, performs a
//! single exchange and closes it again. Nothing is pooled.

use std::io::{BufReader, BufWriter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::RemoteAddr;
use crate::error::{RelayError, Result};
use crate::network::Stream;
use crate::protocol::{Value, ValueReader, ValueWriter};

/// Source of unique handshake nonces within this process
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A live, handshaken connection to one backend
#[derive(Debug)]
pub struct Downstream {
    /// Remote label for logging and errors
    remote: String,

    reader: ValueReader<BufReader<Stream>>,

    writer: ValueWriter<BufWriter<Stream>>,
}

impl Downstream {
    /// Dial `remote` and verify it with a PING handshake
    ///
    /// Socket timeouts are derived from `deadline`, so a backend that stops
    /// answering cannot hold the connection past the end of the round.
    /// On any failure the partially opened connection is closed before the
    /// error is returned.
    pub fn acquire(remote: &RemoteAddr, deadline: Option<Instant>) -> Result<Self> {
        let label = remote.to_string();
        let timeout = remaining(&label, deadline)?;

        let stream = Stream::connect(remote, timeout)
            .map_err(|e| RelayError::downstream(&label, format!("dial failed: {}", e)))?;
        stream
            .set_timeouts(timeout)
            .map_err(|e| RelayError::downstream(&label, e))?;
        let read_stream = stream
            .try_clone()
            .map_err(|e| RelayError::downstream(&label, e))?;

        let mut downstream = Self {
            remote: label,
            reader: ValueReader::new(BufReader::new(read_stream)),
            writer: ValueWriter::new(BufWriter::new(stream)),
        };

        if let Err(e) = downstream.handshake() {
            downstream.release();
            return Err(e);
        }

        tracing::trace!("Downstream connection to {} ready", downstream.remote);
        Ok(downstream)
    }

    /// Send one command and read exactly one reply
    pub fn send_receive(&mut self, command: &Value) -> Result<Value> {
        self.exchange(command)
            .map_err(|e| RelayError::downstream(&self.remote, e))
    }

    /// Close the connection; connections are never reused
    pub fn release(self) {
        tracing::trace!("Releasing downstream connection to {}", self.remote);
        // Drop shuts the socket down.
    }

    /// Remote label, `network://address`
    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn handshake(&mut self) -> Result<()> {
        let nonce = format!(
            "{}-{}",
            std::process::id(),
            NONCE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        let reply = self.send_receive(&Value::command(["PING", nonce.as_str()]))?;
        match reply {
            Value::Bulk(Some(ref echoed)) if echoed[..] == *nonce.as_bytes() => Ok(()),
            other => Err(RelayError::downstream(
                &self.remote,
                format!("handshake mismatch: expected {:?}, got {:?}", nonce, other),
            )),
        }
    }

    fn exchange(&mut self, command: &Value) -> Result<Value> {
        self.writer.write_value(command)?;
        self.writer.flush()?;
        self.reader.read_value()
    }
}

impl Drop for Downstream {
    fn drop(&mut self) {
        // Best effort; the peer may already be gone.
        let _ = self.writer.get_ref().get_ref().shutdown();
    }
}

/// Time left until `deadline`; an expired deadline is a DownstreamError
fn remaining(remote: &str, deadline: Option<Instant>) -> Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                Err(RelayError::downstream(remote, "round deadline passed before dial"))
            } else {
                Ok(Some(left))
            }
        }
    }
}
