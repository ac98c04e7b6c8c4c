//! EmberKV CLI Client
//!
//! Command-line interface for interacting with EmberKV.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use emberkv::protocol::{read_reply, write_command, Command, Reply};

/// EmberKV CLI
#[derive(Parser, Debug)]
#[command(name = "emberkv-cli")]
#[command(about = "CLI for EmberKV key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Ping the server
    Ping,
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Get { key } => Command::Get { key: key.into_bytes() },
            Commands::Set { key, value } => Command::Set {
                key: key.into_bytes(),
                value: value.into_bytes(),
            },
            Commands::Del { key } => Command::Del { key: key.into_bytes() },
            Commands::Ping => Command::Ping,
        }
    }
}

fn run(args: Args) -> emberkv::Result<Reply> {
    let stream = TcpStream::connect(&args.server)?;
    stream.set_nodelay(true)?;
    let mut writer = BufWriter::new(stream.try_clone()?);
    let mut reader = BufReader::new(stream);

    write_command(&mut writer, &args.command.into())?;
    read_reply(&mut reader)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let server = args.server.clone();

    match run(args) {
        Ok(Reply::Status(text)) => println!("{}", text),
        Ok(Reply::Integer(n)) => println!("(integer) {}", n),
        Ok(Reply::Bulk(Some(value))) => println!("{}", String::from_utf8_lossy(&value)),
        Ok(Reply::Bulk(None)) => println!("(nil)"),
        Ok(Reply::Error(text)) => {
            eprintln!("(error) {}", text);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Could not talk to {}: {}", server, e);
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
