//! Protocol Module
//!
//! Defines the RESP wire protocol spoken on both sides of the relay:
//! clients talk to the relay with it, and the relay talks to every backend
//! with the same codec.
//!
//! ## Value Kinds
//! - `+` Simple string: short trusted status text
//! - `-` Error: an error carried as payload, relayed verbatim
//! - `:` Integer: signed 64-bit
//! - `$` Bulk string: length-prefixed bytes, or null (`$-1`)
//! - `*` Array: count-prefixed sequence of values, possibly nested
//!
//! ## Commands
//! A client command is always an array, normally of bulk strings:
//! ```text
//! *2\r\n$4\r\nLLEN\r\n$6\r\nmylist\r\n
//! ```

mod value;
mod codec;

pub use value::Value;
pub use codec::{
    decode_value, encode_value, ValueReader, ValueWriter,
    MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_DEPTH, MAX_LINE_LEN,
};
