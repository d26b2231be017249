//! resprelay CLI Client
//!
//! Sends one command to a relay (or any RESP server) and prints the reply.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;

use clap::Parser;
use resprelay::protocol::{Value, ValueReader, ValueWriter};
use resprelay::Result;

/// resprelay CLI
#[derive(Parser, Debug)]
#[command(name = "resprelay-cli")]
#[command(about = "Send one command to a RESP endpoint")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    server: String,

    /// Command and arguments, e.g. `HGETALL user:1`
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() {
    let args = Args::parse();

    match execute(&args.server, &args.command) {
        Ok(reply) => print_reply(&reply, 0),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn execute(server: &str, command: &[String]) -> Result<Value> {
    let stream = TcpStream::connect(server)?;
    let mut reader = ValueReader::new(BufReader::new(stream.try_clone()?));
    let mut writer = ValueWriter::new(BufWriter::new(stream));

    writer.write_value(&Value::command(command))?;
    writer.flush()?;
    reader.read_value()
}

/// Print a reply the way redis-cli does
fn print_reply(reply: &Value, indent: usize) {
    match reply {
        Value::Simple(text) => println!("{}", text),
        Value::Error(message) => println!("(error) {}", message),
        Value::Integer(n) => println!("(integer) {}", n),
        Value::Bulk(None) => println!("(nil)"),
        Value::Bulk(Some(data)) => println!("\"{}\"", String::from_utf8_lossy(data)),
        Value::Array(items) if items.is_empty() => println!("(empty array)"),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    print!("{:width$}", "", width = indent);
                }
                print!("{}) ", i + 1);
                print_reply(item, indent + format!("{}) ", i + 1).len());
            }
        }
    }
}
