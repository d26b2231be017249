//! Fan-out Forwarder
//!
//! Sends one client command to every configured backend at once, collects
//! the replies that arrive before the round's timer fires, and picks the
//! reply handed back to the client.
//!
//! ## Round Lifecycle
//! ```text
//!   classify ──▶ spawn one thread per remote ──▶ start timer
//!                      │  │  │
//!                      ▼  ▼  ▼
//!              bounded channel (one slot per remote)
//!                      │
//!                      ▼
//!   aggregate until timer fires or every remote reported
//!                      │
//!                      ▼
//!   select: quorum gate, then first arrival or highest version
//! ```
//!
//! Remote threads are not cancelled when the timer fires. Their sockets
//! expire `STRAGGLER_GRACE` past the round timeout, so a slow backend is cut
//! off by the timer first and its thread exits shortly after. Whatever it
//! sends by then is dropped with the channel.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;

use super::Downstream;
use crate::config::{Config, RemoteAddr};
use crate::error::{RelayError, Result};
use crate::protocol::Value;

/// How long remote sockets outlive the round timer
///
/// Must exceed the time taken to spawn every remote thread, as the timer
/// starts only after that.
pub const STRAGGLER_GRACE: Duration = Duration::from_millis(100);

/// Outcome of one backend handling one command
pub type ForwardResult = Result<Value>;

/// Issues commands to all remotes and reconciles their replies
#[derive(Debug, Clone)]
pub struct Forwarder {
    remotes: Vec<RemoteAddr>,
    min_success: usize,
    request_timeout: Duration,
    version_field: Vec<u8>,
    versioned_command: Vec<u8>,
}

impl Forwarder {
    pub fn new(config: &Config) -> Self {
        Self {
            remotes: config.remotes.clone(),
            min_success: config.min_success as usize,
            request_timeout: config.request_timeout,
            version_field: config.version_field.as_bytes().to_vec(),
            versioned_command: config.versioned_command.as_bytes().to_vec(),
        }
    }

    /// True for `[<versioned command>, <key>]`, compared byte for byte
    pub fn is_versioned_read(&self, command: &Value) -> bool {
        matches!(
            command.as_array(),
            Some([Value::Bulk(Some(name)), _]) if name[..] == self.versioned_command[..]
        )
    }

    /// Forward `command` to every remote and return the selected reply
    ///
    /// A protocol error value chosen by selection is returned as `Ok`; it is
    /// the client's reply. `Err` means no reply could be chosen.
    pub fn forward(&self, command: &Value) -> Result<Value> {
        let expects_version = self.is_versioned_read(command);
        let dispatched = self.remotes.len();
        let command = Arc::new(command.clone());
        let socket_deadline = Instant::now() + self.request_timeout + STRAGGLER_GRACE;

        // One slot per remote: late senders never block on a full channel.
        let (tx, rx) = channel::bounded::<ForwardResult>(dispatched);

        for remote in &self.remotes {
            let label = remote.to_string();
            let task_tx = tx.clone();
            let command = Arc::clone(&command);
            let remote = remote.clone();

            let spawned = thread::Builder::new()
                .name(format!("remote {}", label))
                .spawn(move || {
                    let result = forward_to_remote(&remote, &command, socket_deadline);
                    // Fails once the round is decided; the result is discarded.
                    let _ = task_tx.send(result);
                });

            if let Err(e) = spawned {
                let _ = tx.send(Err(RelayError::downstream(
                    label,
                    format!("failed to spawn remote task: {}", e),
                )));
            }
        }
        drop(tx);

        // The timer starts only once every dispatch is under way.
        let timer = channel::after(self.request_timeout);
        let mut successes = Vec::with_capacity(dispatched);
        let mut failures = Vec::new();

        while successes.len() + failures.len() < dispatched {
            channel::select! {
                recv(rx) -> msg => match msg {
                    Ok(Ok(value)) => successes.push(value),
                    Ok(Err(e)) => failures.push(e),
                    // Every task has finished
                    Err(_) => break,
                },
                recv(timer) -> _ => {
                    tracing::warn!(
                        successes = successes.len(),
                        failures = failures.len(),
                        outstanding = dispatched - successes.len() - failures.len(),
                        timeout_ms = self.request_timeout.as_millis() as u64,
                        "request timeout, selecting from partial results"
                    );
                    break;
                }
            }
        }

        tracing::debug!(
            successes = successes.len(),
            failures = failures.len(),
            versioned = expects_version,
            "fan-out round complete"
        );

        self.select_result(successes, failures, expects_version)
    }

    /// Pick the reply for a finished round
    ///
    /// - Fewer than `min_success` successes: the first failure, or
    ///   `InsufficientResponses` if there is none.
    /// - Plain commands: the first success to arrive.
    /// - Versioned reads: the success with the strictly highest version;
    ///   the earliest arrival wins ties.
    pub fn select_result(
        &self,
        successes: Vec<Value>,
        failures: Vec<RelayError>,
        expects_version: bool,
    ) -> Result<Value> {
        let insufficient = RelayError::InsufficientResponses {
            successes: successes.len(),
            required: self.min_success,
        };

        if successes.is_empty() || successes.len() < self.min_success {
            return Err(failures.into_iter().next().unwrap_or(insufficient));
        }

        if !expects_version {
            return successes.into_iter().next().ok_or(insufficient);
        }

        let mut best: Option<(i64, Value)> = None;
        for value in successes {
            let version = self.version_of(&value);
            if best.as_ref().map_or(true, |(highest, _)| version > *highest) {
                best = Some((version, value));
            }
        }

        best.map(|(_, value)| value).ok_or(insufficient)
    }

    /// Version carried by a field/value array reply; 0 when absent
    ///
    /// Keys sit at even positions. The value may be a native integer or a
    /// string holding base-10 digits.
    pub fn version_of(&self, reply: &Value) -> i64 {
        let Some(items) = reply.as_array() else {
            return 0;
        };

        items
            .chunks_exact(2)
            .find(|pair| pair[0].as_bytes() == Some(&self.version_field[..]))
            .and_then(|pair| pair[1].as_integer())
            .unwrap_or(0)
    }
}

/// One remote task: acquire, exchange once, release
fn forward_to_remote(remote: &RemoteAddr, command: &Value, deadline: Instant) -> ForwardResult {
    let result = Downstream::acquire(remote, Some(deadline)).and_then(|mut downstream| {
        let reply = downstream.send_receive(command);
        downstream.release();
        reply
    });

    if let Err(ref e) = result {
        tracing::warn!("Forward to {} failed: {}", remote, e);
    }
    result
}
