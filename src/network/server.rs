//! TCP Server
//!
//! Accepts client connections and runs one session thread per connection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::Session;
use crate::config::Config;
use crate::error::Result;
use crate::relay::Forwarder;

/// TCP server for the relay
pub struct Server {
    config: Config,
    listener: TcpListener,
    forwarder: Arc<Forwarder>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Validate the config and bind the listen address
    pub fn bind(config: Config) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)?;
        let forwarder = Arc::new(Forwarder::new(&config));

        Ok(Self {
            config,
            listener,
            forwarder,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops `run` from another thread
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            wake_addr: wake_address(self.local_addr()?),
        })
    }

    /// Number of sessions currently running
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until shut down (blocking)
    pub fn run(&self) -> Result<()> {
        tracing::info!(
            listen = %self.local_addr()?,
            remotes = self.config.remotes.len(),
            min_success = self.config.min_success,
            timeout_ms = self.config.request_timeout.as_millis() as u64,
            "relay listening"
        );

        for incoming in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string());

            if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                tracing::warn!(
                    "Connection limit {} reached, rejecting client {}",
                    self.config.max_connections,
                    peer
                );
                continue;
            }

            let guard = ActiveGuard::enter(&self.active);
            let forwarder = Arc::clone(&self.forwarder);
            let spawned = thread::Builder::new()
                .name(format!("session {}", peer))
                .spawn(move || {
                    let _guard = guard;
                    handle_connection(stream, forwarder);
                });

            if let Err(e) = spawned {
                tracing::error!("Failed to spawn session thread for {}: {}", peer, e);
            }
        }

        tracing::info!("Relay stopped accepting connections");
        Ok(())
    }
}

fn handle_connection(stream: TcpStream, forwarder: Arc<Forwarder>) {
    let mut session = match Session::new(stream, forwarder) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Failed to set up session: {}", e);
            return;
        }
    };

    if let Err(e) = session.run() {
        tracing::error!("Session for {} closed: {}", session.peer_addr(), e);
    }
}

/// Stops a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Signal the server to stop, waking the blocked accept
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // The accept loop only observes the flag after its next accept.
        let _ = TcpStream::connect(self.wake_addr);
    }
}

/// Counts a session as active for as long as it lives
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A wildcard bind address cannot be dialed portably; use loopback instead
fn wake_address(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}
