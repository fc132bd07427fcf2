//! Wire Protocol
//!
//! The server speaks a restricted RESP dialect:
//!
//! - **Requests** are inline commands: whitespace-separated tokens
//!   terminated by CRLF (`SET foo bar\r\n`). There is no multi-bulk
//!   request framing, so values cannot contain whitespace.
//! - **Replies** use full RESP encoding: simple strings, errors,
//!   integers, bulk strings (including the `$-1\r\n` null) and arrays.
//!
//! ## Modules
//!
//! - `types`: the [`RespValue`] reply enum and its serialization
//! - `parser`: tokenizer for incoming inline commands

pub mod parser;
pub mod types;

pub use parser::{fold_verb, tokenize};
pub use types::RespValue;
