//! Protocol values
//!
//! The five value kinds that travel on the wire, in both directions.

use bytes::Bytes;

/// A single RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+OK\r\n`
    Simple(String),

    /// `-ERR message\r\n`, an error carried as payload
    Error(String),

    /// `:1000\r\n`
    Integer(i64),

    /// `$6\r\nfoobar\r\n`; `None` is the null string `$-1\r\n`
    Bulk(Option<Bytes>),

    /// `*2\r\n...`; may be empty or nested
    Array(Vec<Value>),
}

impl Value {
    /// A non-null bulk string
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Value::Bulk(Some(data.into()))
    }

    /// The null bulk string
    pub fn null() -> Self {
        Value::Bulk(None)
    }

    /// A command: an array of bulk strings
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        Value::Array(
            args.into_iter()
                .map(|arg| Value::bulk(Bytes::copy_from_slice(arg.as_ref())))
                .collect(),
        )
    }

    /// Raw bytes of a bulk or simple string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bulk(Some(data)) => Some(data),
            Value::Simple(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// Integer view: native integers, or string bytes holding base-10 text
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            other => other
                .as_bytes()
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Elements of an array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Simple(_) => "simple",
            Value::Error(_) => "error",
            Value::Integer(_) => "integer",
            Value::Bulk(Some(_)) => "bulk",
            Value::Bulk(None) => "null",
            Value::Array(_) => "array",
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::bulk(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
