//! Tests for socket dialing
//!
//! These tests verify:
//! - Multi-address dials share one connect budget
//! - The first address that connects wins
//! - An exhausted budget stops further attempts

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::{Duration, Instant};

use resprelay::network::{connect_within, Stream};
use resprelay::RemoteAddr;

// =============================================================================
// Helper Functions
// =============================================================================

fn addrs(n: u16) -> Vec<SocketAddr> {
    (1..=n)
        .map(|i| SocketAddr::from(([192, 0, 2, 1], 6000 + i)))
        .collect()
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "connection timed out")
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_attempts_share_one_budget() {
    let budget = Duration::from_millis(300);
    let mut offered = Vec::new();

    let start = Instant::now();
    let res: io::Result<()> = connect_within(addrs(5), budget, |_, left| {
        offered.push(left);
        // Each attempt burns its whole allowance, like a blackholed host.
        thread::sleep(left.min(Duration::from_millis(120)));
        Err(timed_out())
    });

    assert_eq!(res.unwrap_err().kind(), io::ErrorKind::TimedOut);
    assert!(start.elapsed() < Duration::from_millis(600));
    assert!(offered.len() < 5, "attempted {} addresses", offered.len());
    assert!(offered.iter().all(|left| *left <= budget));
    assert!(offered.windows(2).all(|w| w[1] < w[0]));
}

#[test]
fn test_first_connecting_address_wins() {
    let mut tried = Vec::new();

    let res = connect_within(addrs(3), Duration::from_secs(1), |addr, _| {
        tried.push(*addr);
        if tried.len() == 2 {
            Ok(addr.port())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    });

    assert_eq!(res.unwrap(), 6002);
    assert_eq!(tried.len(), 2);
}

#[test]
fn test_last_error_is_reported() {
    let res: io::Result<()> = connect_within(addrs(2), Duration::from_secs(1), |_, _| {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    });

    assert_eq!(res.unwrap_err().kind(), io::ErrorKind::ConnectionRefused);
}

#[test]
fn test_no_addresses() {
    let res: io::Result<()> = connect_within(Vec::new(), Duration::from_secs(1), |_, _| Ok(()));
    assert_eq!(res.unwrap_err().kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn test_zero_budget_never_dials() {
    let mut dialed = false;
    let res: io::Result<()> = connect_within(addrs(1), Duration::ZERO, |_, _| {
        dialed = true;
        Ok(())
    });

    assert_eq!(res.unwrap_err().kind(), io::ErrorKind::TimedOut);
    assert!(!dialed);
}

#[test]
fn test_stream_connects_with_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let remote = RemoteAddr::tcp(listener.local_addr().unwrap().to_string());

    let stream = Stream::connect(&remote, Some(Duration::from_secs(1))).unwrap();
    assert!(stream.set_timeouts(Some(Duration::from_millis(100))).is_ok());
}
