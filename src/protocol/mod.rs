//! Protocol Module
//!
//! Defines the wire protocol for client-server communication. It is a
//! subset of RESP: requests arrive as arrays of bulk strings or as inline
//! text lines, and every request gets exactly one reply.
//!
//! ### Commands
//! | Command       | Reply                                   |
//! |---------------|-----------------------------------------|
//! | `GET key`     | bulk value, or `$-1` when absent        |
//! | `SET key val` | `+OK`                                   |
//! | `DEL key`     | `:1` (whether or not the key existed)   |
//! | `PING`        | `+PONG`                                 |
//!
//! Unknown commands and wrong arity get `-ERR ...` and the connection
//! stays open.

mod command;
mod response;
mod codec;

pub use command::{Command, CommandError};
pub use response::Reply;
pub use codec::{
    encode_args, encode_command, read_reply, read_request, write_command, write_reply, Request,
    MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_LINE_LEN,
};
