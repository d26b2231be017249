//! Fake backends shared by the integration tests
//!
//! Each backend answers the relay's `PING <nonce>` handshake by echoing the
//! nonce and hands every other command to a test-supplied handler.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use resprelay::protocol::{Value, ValueReader, ValueWriter};
use resprelay::RemoteAddr;

type Handler = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A backend that replies to every command with `reply`
pub fn spawn_backend(reply: Value) -> RemoteAddr {
    spawn_backend_fn(move |_| reply.clone())
}

/// A backend that waits `delay` before replying
pub fn spawn_slow_backend(reply: Value, delay: Duration) -> RemoteAddr {
    spawn_backend_fn(move |_| {
        thread::sleep(delay);
        reply.clone()
    })
}

/// A backend driven by `handler`
pub fn spawn_backend_fn<F>(handler: F) -> RemoteAddr
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    let handler: Handler = Arc::new(handler);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                let reader = BufReader::new(stream.try_clone().unwrap());
                serve(reader, BufWriter::new(stream), handler);
            });
        }
    });

    RemoteAddr::tcp(addr.to_string())
}

/// A backend that answers the handshake with `+PONG` instead of the nonce
pub fn spawn_bad_handshake_backend() -> RemoteAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let mut reader = ValueReader::new(BufReader::new(stream.try_clone().unwrap()));
            let mut writer = ValueWriter::new(BufWriter::new(stream));
            if reader.read_value().is_ok() {
                let _ = writer.write_value(&Value::Simple("PONG".to_string()));
                let _ = writer.flush();
            }
        }
    });

    RemoteAddr::tcp(addr.to_string())
}

/// An address nobody listens on
pub fn closed_remote() -> RemoteAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    RemoteAddr::tcp(addr.to_string())
}

/// A Unix-socket backend living in `dir`
#[cfg(unix)]
pub fn spawn_unix_backend(dir: &std::path::Path, reply: Value) -> RemoteAddr {
    use std::os::unix::net::UnixListener;

    let path = dir.join("backend.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let handler: Handler = Arc::new(move |_| reply.clone());

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                let reader = BufReader::new(stream.try_clone().unwrap());
                serve(reader, BufWriter::new(stream), handler);
            });
        }
    });

    RemoteAddr::unix(path.to_string_lossy().into_owned())
}

fn serve<R: BufRead, W: Write>(reader: R, writer: W, handler: Handler) {
    let mut reader = ValueReader::new(reader);
    let mut writer = ValueWriter::new(writer);

    while let Ok(command) = reader.read_value() {
        let reply = match command.as_array() {
            Some([name, nonce]) if name.as_bytes() == Some(&b"PING"[..]) => nonce.clone(),
            _ => handler(&command),
        };
        if writer.write_value(&reply).is_err() || writer.flush().is_err() {
            break;
        }
    }
}

/// A versioned-read reply: `[f, <payload>, <field>, <version>]`
pub fn versioned_reply(field: &str, version: i64, payload: i64) -> Value {
    Value::Array(vec![
        Value::from("f"),
        Value::Integer(payload),
        Value::from(field),
        Value::Integer(version),
    ])
}
