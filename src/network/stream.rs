//! Socket abstraction
//!
//! One `Read + Write` type over the transports a backend can be reached by.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use crate::config::{Network, RemoteAddr};

/// A connected socket
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Dial a remote, bounding the TCP connect by `timeout` if given
    pub fn connect(remote: &RemoteAddr, timeout: Option<Duration>) -> io::Result<Self> {
        match remote.network {
            Network::Tcp => connect_tcp(&remote.address, timeout).map(Stream::Tcp),
            #[cfg(unix)]
            Network::Unix => UnixStream::connect(&remote.address).map(Stream::Unix),
            #[cfg(not(unix))]
            Network::Unix => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
        }
    }

    /// Clone the handle so reads and writes can be buffered separately
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Stream::Tcp(s) => s.try_clone().map(Stream::Tcp),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_clone().map(Stream::Unix),
        }
    }

    /// Apply the same read and write timeout; `None` blocks forever
    pub fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Stream::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }

    /// Close both directions; shared by every clone of the handle
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

fn connect_tcp(address: &str, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let stream = match timeout {
        None => TcpStream::connect(address)?,
        Some(timeout) => connect_within(address.to_socket_addrs()?, timeout, |addr, left| {
            TcpStream::connect_timeout(addr, left)
        })?,
    };

    // Disable Nagle's algorithm for low latency
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Try each address in turn until one connects, sharing one `timeout`
///
/// Every attempt gets only the time left in the budget. Returns the last
/// attempt's error, or `TimedOut` once the budget is spent.
pub fn connect_within<T, I, F>(addrs: I, timeout: Duration, mut connect: F) -> io::Result<T>
where
    I: IntoIterator<Item = SocketAddr>,
    F: FnMut(&SocketAddr, Duration) -> io::Result<T>,
{
    let deadline = Instant::now() + timeout;
    let mut last_err = None;

    for addr in addrs {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect deadline passed",
            ));
        }
        match connect(&addr, left) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "resolved to no addresses")
    }))
}
