//! Configuration for resprelay
//!
//! Centralized configuration with sensible defaults. The relay never reads
//! files itself; binaries build a `Config` through the builder and hand it
//! to `Server::bind`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Main configuration for a relay instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for clients
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    // -------------------------------------------------------------------------
    // Fan-out Configuration
    // -------------------------------------------------------------------------
    /// Backends every command is forwarded to, in configuration order
    pub remotes: Vec<RemoteAddr>,

    /// Minimum number of successful backend replies (quorum)
    pub min_success: u32,

    /// How long one fan-out round waits for backend replies
    pub request_timeout: Duration,

    // -------------------------------------------------------------------------
    // Conflict Resolution
    // -------------------------------------------------------------------------
    /// Field holding the version counter in a versioned read reply
    pub version_field: String,

    /// Command name whose replies are compared by version
    pub versioned_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6380".to_string(),
            max_connections: 1024,
            remotes: Vec::new(),
            min_success: 1,
            request_timeout: Duration::from_millis(1000),
            version_field: "version".to_string(),
            versioned_command: "HGETALL".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the invariants the relay relies on
    pub fn validate(&self) -> Result<()> {
        if self.remotes.is_empty() {
            return Err(RelayError::Config(
                "at least one remote address is required".to_string(),
            ));
        }
        if self.min_success == 0 {
            return Err(RelayError::Config(
                "min_success must be at least 1".to_string(),
            ));
        }
        if self.min_success as usize > self.remotes.len() {
            return Err(RelayError::Config(format!(
                "min_success {} exceeds the number of remotes ({})",
                self.min_success,
                self.remotes.len()
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(RelayError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.version_field.is_empty() {
            return Err(RelayError::Config("version_field must not be empty".to_string()));
        }
        if self.versioned_command.is_empty() {
            return Err(RelayError::Config(
                "versioned_command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Append one backend
    pub fn remote(mut self, remote: RemoteAddr) -> Self {
        self.config.remotes.push(remote);
        self
    }

    /// Replace the backend list
    pub fn remotes(mut self, remotes: impl IntoIterator<Item = RemoteAddr>) -> Self {
        self.config.remotes = remotes.into_iter().collect();
        self
    }

    /// Set the quorum of successful replies
    pub fn min_success(mut self, count: u32) -> Self {
        self.config.min_success = count;
        self
    }

    /// Set the per-command fan-out timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the version field name
    pub fn version_field(mut self, name: impl Into<String>) -> Self {
        self.config.version_field = name.into();
        self
    }

    /// Set the versioned read command name
    pub fn versioned_command(mut self, name: impl Into<String>) -> Self {
        self.config.versioned_command = name.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Remote Addresses
// =============================================================================

/// Transport used to reach a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Unix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => f.write_str("tcp"),
            Network::Unix => f.write_str("unix"),
        }
    }
}

/// A backend address: network plus address
///
/// Parses from `tcp://host:port`, `unix:///path/to/socket` or a bare
/// `host:port`, which means TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr {
    pub network: Network,
    pub address: String,
}

impl RemoteAddr {
    /// A TCP backend
    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            network: Network::Tcp,
            address: address.into(),
        }
    }

    /// A Unix-domain socket backend
    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            network: Network::Unix,
            address: path.into(),
        }
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.address)
    }
}

impl FromStr for RemoteAddr {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let (network, address) = match s.split_once("://") {
            Some(("tcp", rest)) => (Network::Tcp, rest),
            Some(("unix", rest)) => (Network::Unix, rest),
            Some((scheme, _)) => {
                return Err(RelayError::Config(format!(
                    "unsupported network '{}' in remote '{}'",
                    scheme, s
                )))
            }
            None => (Network::Tcp, s),
        };

        if address.is_empty() {
            return Err(RelayError::Config(format!("remote '{}' has no address", s)));
        }

        Ok(Self {
            network,
            address: address.to_string(),
        })
    }
}
