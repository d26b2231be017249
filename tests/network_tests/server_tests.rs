//! End-to-end tests for the Server and Session loop
//!
//! A real relay on an ephemeral port in front of fake backends.

#[path = "../support/mod.rs"]
mod support;

use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use resprelay::network::{Server, ShutdownHandle};
use resprelay::protocol::{Value, ValueReader};
use resprelay::{Config, RelayError, RemoteAddr};

// =============================================================================
// Helper Functions
// =============================================================================

struct Relay {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl Relay {
    fn start(config: Config) -> Self {
        let server = Server::bind(config).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle().unwrap();
        let thread = thread::spawn(move || server.run().unwrap());

        Self {
            addr,
            shutdown,
            thread: Some(thread),
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn relay_config(remotes: Vec<RemoteAddr>) -> Config {
    Config::builder()
        .listen_addr("127.0.0.1:0")
        .remotes(remotes)
        .request_timeout(Duration::from_millis(2000))
        .version_field("ver")
        .build()
}

fn read_reply(stream: &TcpStream) -> Value {
    let mut reader = ValueReader::new(BufReader::new(stream.try_clone().unwrap()));
    reader.read_value().unwrap()
}

/// True once the relay has closed the connection
fn is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 1];
    matches!(stream.read(&mut buf), Ok(0) | Err(_))
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_end_to_end_llen() {
    let relay = Relay::start(relay_config(vec![
        support::spawn_backend(Value::Integer(3)),
        support::spawn_backend(Value::Integer(3)),
    ]));

    let mut client = relay.connect();
    client
        .write_all(b"*2\r\n$4\r\nLLEN\r\n$6\r\nmylist\r\n")
        .unwrap();

    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b":3\r\n");
}

#[test]
fn test_replies_follow_command_order() {
    let relay = Relay::start(relay_config(vec![support::spawn_backend_fn(|cmd| {
        cmd.as_array()
            .and_then(|items| items.get(1))
            .cloned()
            .unwrap_or(Value::Bulk(None))
    })]));

    let mut client = relay.connect();
    let mut reader = ValueReader::new(BufReader::new(client.try_clone().unwrap()));

    for i in 0..10 {
        let key = format!("key{}", i);
        let frame = resprelay::protocol::encode_value(&Value::command(["GET", key.as_str()]))
            .unwrap();
        client.write_all(&frame).unwrap();
        assert_eq!(reader.read_value().unwrap(), Value::from(key.as_str()));
    }
}

#[test]
fn test_versioned_read_end_to_end() {
    let relay = Relay::start(relay_config(vec![
        support::spawn_backend(support::versioned_reply("ver", 1, 10)),
        support::spawn_backend(support::versioned_reply("ver", 7, 70)),
    ]));

    let mut client = relay.connect();
    let frame = resprelay::protocol::encode_value(&Value::command(["HGETALL", "user:1"])).unwrap();
    client.write_all(&frame).unwrap();

    assert_eq!(read_reply(&client), support::versioned_reply("ver", 7, 70));
}

#[test]
fn test_downstream_failure_is_relayed_and_session_survives() {
    let relay = Relay::start(relay_config(vec![support::closed_remote()]));

    let mut client = relay.connect();
    let mut reader = ValueReader::new(BufReader::new(client.try_clone().unwrap()));
    let frame = resprelay::protocol::encode_value(&Value::command(["GET", "k"])).unwrap();

    for _ in 0..2 {
        client.write_all(&frame).unwrap();
        match reader.read_value().unwrap() {
            Value::Error(msg) => assert!(msg.starts_with("ERR relay:"), "got {}", msg),
            other => panic!("Expected error value, got {:?}", other),
        }
    }
}

#[test]
fn test_malformed_command_closes_session() {
    let relay = Relay::start(relay_config(vec![support::spawn_backend(Value::Integer(1))]));

    let mut client = relay.connect();
    client.write_all(b"+PING\r\n").unwrap();

    assert!(is_closed(&mut client));
}

#[test]
fn test_connection_limit() {
    let mut config = relay_config(vec![support::spawn_backend(Value::Integer(1))]);
    config.max_connections = 1;
    let relay = Relay::start(config);

    // Make sure the first session is up before the second client arrives.
    let mut first = relay.connect();
    let frame = resprelay::protocol::encode_value(&Value::command(["GET", "k"])).unwrap();
    first.write_all(&frame).unwrap();
    assert_eq!(read_reply(&first), Value::Integer(1));

    let mut second = relay.connect();
    assert!(is_closed(&mut second));
}

#[test]
fn test_bind_rejects_invalid_config() {
    let config = Config::builder().listen_addr("127.0.0.1:0").build();

    match Server::bind(config) {
        Err(RelayError::Config(_)) => {}
        Err(e) => panic!("Expected config error, got {}", e),
        Ok(_) => panic!("Expected config error, got a server"),
    }
}

#[test]
fn test_shutdown_stops_accept_loop() {
    let server = Server::bind(relay_config(vec![support::spawn_backend(Value::Integer(1))])).unwrap();
    let shutdown = server.shutdown_handle().unwrap();
    let thread = thread::spawn(move || server.run());

    shutdown.shutdown();
    thread.join().unwrap().unwrap();
}
