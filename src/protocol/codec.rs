//! Protocol codec
//!
//! Streaming reader and writer for RESP values, plus buffer helpers.
//!
//! ## Wire Format
//! ```text
//! +OK\r\n                      Simple
//! -ERR message\r\n             Error
//! :1000\r\n                    Integer
//! $6\r\nfoobar\r\n             Bulk (Some)
//! $-1\r\n                      Bulk (None)
//! *2\r\n$3\r\nfoo\r\n:1\r\n     Array
//! ```
//!
//! Every header line ends in CRLF. Lengths and counts are canonical base-10.

use std::io::{BufRead, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::Value;
use crate::error::{RelayError, Result};

/// Maximum header line length (excluding CRLF)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Maximum bulk string length (512 MB)
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Maximum number of elements in one array
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_DEPTH: usize = 128;

const CRLF: &[u8] = b"\r\n";

/// Upper bound on speculative allocation driven by a peer-supplied length
const PREALLOC_BYTES: usize = 64 * 1024;
const PREALLOC_ITEMS: usize = 1024;

// =============================================================================
// Decoding
// =============================================================================

/// Decodes values from a buffered byte source
#[derive(Debug)]
pub struct ValueReader<R> {
    inner: R,
}

impl<R: BufRead> ValueReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Read one client command, which must be an array
    ///
    /// Returns `Ok(None)` if the source ends cleanly before the first byte
    /// of a frame.
    pub fn read_command(&mut self) -> Result<Option<Value>> {
        let line = match self.read_line()? {
            Some(line) => line,
            None => return Ok(None),
        };

        if line.first() != Some(&b'*') {
            return Err(RelayError::Protocol("not an array".to_string()));
        }

        self.parse_line(&line, 0).map(Some)
    }

    /// Read exactly one value of any kind
    pub fn read_value(&mut self) -> Result<Value> {
        self.read_nested(0)
    }

    fn read_nested(&mut self, depth: usize) -> Result<Value> {
        let line = self.read_line()?.ok_or_else(unexpected_eof)?;
        self.parse_line(&line, depth)
    }

    fn parse_line(&mut self, line: &[u8], depth: usize) -> Result<Value> {
        let (&prefix, rest) = line
            .split_first()
            .ok_or_else(|| RelayError::Protocol("empty line".to_string()))?;

        match prefix {
            b'+' => Ok(Value::Simple(parse_text(rest)?)),
            b'-' => Ok(Value::Error(parse_text(rest)?)),
            b':' => Ok(Value::Integer(parse_decimal(rest)?)),
            b'$' => self.read_bulk(parse_decimal(rest)?),
            b'*' => self.read_array(parse_decimal(rest)?, depth),
            other => Err(RelayError::Protocol(format!(
                "unparseable type: 0x{:02x}",
                other
            ))),
        }
    }

    fn read_bulk(&mut self, len: i64) -> Result<Value> {
        if len == -1 {
            return Ok(Value::Bulk(None));
        }
        if len < 0 {
            return Err(RelayError::Protocol(format!("invalid bulk length: {}", len)));
        }
        if len > MAX_BULK_LEN {
            return Err(RelayError::Protocol(format!(
                "bulk string too large: {} bytes (max {})",
                len, MAX_BULK_LEN
            )));
        }

        let len = len as usize;
        let mut data = Vec::with_capacity(len.min(PREALLOC_BYTES));
        (&mut self.inner).take(len as u64).read_to_end(&mut data)?;
        if data.len() < len {
            return Err(unexpected_eof());
        }

        let mut terminator = [0u8; 2];
        self.inner.read_exact(&mut terminator)?;
        if terminator[..] != *CRLF {
            return Err(RelayError::Protocol(
                "bulk string not terminated by CRLF".to_string(),
            ));
        }

        Ok(Value::Bulk(Some(Bytes::from(data))))
    }

    fn read_array(&mut self, count: i64, depth: usize) -> Result<Value> {
        if count < 0 {
            return Err(RelayError::Protocol(format!("invalid array length: {}", count)));
        }
        if count > MAX_ARRAY_LEN {
            return Err(RelayError::Protocol(format!(
                "array too large: {} elements (max {})",
                count, MAX_ARRAY_LEN
            )));
        }
        if depth >= MAX_DEPTH {
            return Err(RelayError::Protocol(format!(
                "array nesting exceeds {} levels",
                MAX_DEPTH
            )));
        }

        let count = count as usize;
        let mut items = Vec::with_capacity(count.min(PREALLOC_ITEMS));
        for _ in 0..count {
            items.push(self.read_nested(depth + 1)?);
        }
        Ok(Value::Array(items))
    }

    /// Read one CRLF-terminated line, without the terminator
    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let limit = (MAX_LINE_LEN + CRLF.len()) as u64;
        let mut line = Vec::new();
        let n = (&mut self.inner).take(limit).read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(None);
        }

        if line.last() != Some(&b'\n') {
            if n as u64 >= limit {
                return Err(RelayError::Protocol(format!(
                    "line exceeds {} bytes",
                    MAX_LINE_LEN
                )));
            }
            return Err(unexpected_eof());
        }
        if !line.ends_with(CRLF) {
            return Err(RelayError::Protocol(
                "line not terminated by CRLF".to_string(),
            ));
        }

        line.truncate(line.len() - CRLF.len());
        Ok(Some(line))
    }
}

fn unexpected_eof() -> RelayError {
    RelayError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "stream ended inside a frame",
    ))
}

fn parse_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| RelayError::Protocol("invalid UTF-8 in line".to_string()))
}

/// Parse a canonical base-10 integer
///
/// Optional leading '-', no '+', no leading zeros, no "-0". Anything else
/// would re-encode to different bytes.
fn parse_decimal(bytes: &[u8]) -> Result<i64> {
    let invalid = || {
        RelayError::Protocol(format!(
            "invalid integer: {:?}",
            String::from_utf8_lossy(bytes)
        ))
    };

    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    let negative = digits.len() != bytes.len();
    match digits {
        [] => return Err(invalid()),
        [b'0'] if negative => return Err(invalid()),
        [b'0', _, ..] => return Err(invalid()),
        [first, ..] if !first.is_ascii_digit() => return Err(invalid()),
        _ => {}
    }

    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(invalid)
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes values onto a byte sink
///
/// Callers wrap sockets in a `BufWriter` and call `flush` once per reply.
#[derive(Debug)]
pub struct ValueWriter<W> {
    inner: W,
}

impl<W: Write> ValueWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Write one value
    ///
    /// The whole value is checked before any byte is written, so a value
    /// that cannot be encoded leaves the sink untouched.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        check_encodable(value)?;
        self.write_unchecked(value)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    fn write_unchecked(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Simple(text) => self.write_line(b'+', text)?,
            Value::Error(message) => self.write_line(b'-', message)?,
            Value::Integer(n) => write!(self.inner, ":{}\r\n", n)?,
            Value::Bulk(None) => self.inner.write_all(b"$-1\r\n")?,
            Value::Bulk(Some(data)) => {
                write!(self.inner, "${}\r\n", data.len())?;
                self.inner.write_all(data)?;
                self.inner.write_all(CRLF)?;
            }
            Value::Array(items) => {
                write!(self.inner, "*{}\r\n", items.len())?;
                for item in items {
                    self.write_unchecked(item)?;
                }
            }
        }
        Ok(())
    }

    fn write_line(&mut self, prefix: u8, text: &str) -> std::io::Result<()> {
        self.inner.write_all(&[prefix])?;
        self.inner.write_all(text.as_bytes())?;
        self.inner.write_all(CRLF)
    }
}

/// Line payloads must not contain a line feed
fn check_encodable(value: &Value) -> Result<()> {
    match value {
        Value::Simple(text) | Value::Error(text) if text.contains('\n') => Err(
            RelayError::Encode(format!("{} line contains a line feed", value.kind())),
        ),
        Value::Array(items) => items.iter().try_for_each(check_encodable),
        _ => Ok(()),
    }
}

// =============================================================================
// Buffer helpers
// =============================================================================

/// Encode a value into a byte buffer
pub fn encode_value(value: &Value) -> Result<Bytes> {
    let mut writer = ValueWriter::new(BytesMut::new().writer());
    writer.write_value(value)?;
    Ok(writer.into_inner().into_inner().freeze())
}

/// Decode exactly one value from a byte buffer
///
/// Fails if bytes remain after the value.
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    let mut reader = ValueReader::new(bytes);
    let value = reader.read_value()?;

    let remaining = reader.get_ref().len();
    if remaining > 0 {
        return Err(RelayError::Protocol(format!(
            "{} trailing bytes after value",
            remaining
        )));
    }
    Ok(value)
}
