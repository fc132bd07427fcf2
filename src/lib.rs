//! # flintkv - A Line-Protocol In-Memory Key-Value Server
//!
//! flintkv is an in-memory key-value store speaking a line-delimited
//! variant of the Redis serialization protocol over TCP. Clients hold
//! long-lived connections and issue commands against typed values
//! (strings, lists, hashes, sets) with optional per-key TTL, plus a
//! minimal publish/subscribe relay.
//!
//! ## Features
//!
//! - **Typed keyspace**: every key holds exactly one of four variants;
//!   the variant is fixed until the key is deleted or expires
//! - **TTL support**: per-key deadlines with lazy expiry on access and a
//!   background sweeper reclaiming memory
//! - **Pub/sub**: channel fan-out to subscribed connections
//! - **Async I/O**: built on Tokio, one task per connection, admission
//!   capped at 1000 live clients
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           flintkv                               │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │          │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │          │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘          │
//! │                                               │                 │
//! │                          ┌────────────────────┼───────────┐     │
//! │                          ▼                    ▼           │     │
//! │  ┌─────────────┐   ┌───────────┐   ┌──────────────────┐   │     │
//! │  │   Inline    │   │  PubSub   │   │  StorageEngine   │   │     │
//! │  │   Parser    │   │ Registry  │   │  (sharded locks) │   │     │
//! │  └─────────────┘   └───────────┘   └──────────────────┘   │     │
//! │                                               ▲           │     │
//! │                                               │           │     │
//! │                                   ┌───────────┴────────┐  │     │
//! │                                   │   ExpirySweeper    │  │     │
//! │                                   │ (background task)  │  │     │
//! │                                   └────────────────────┘  │     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire protocol
//!
//! Requests are inline commands terminated by CRLF — whitespace-split
//! tokens with no quoting and no multi-bulk framing:
//!
//! ```text
//! SET foo bar EX 30\r\n      →  +OK\r\n
//! GET foo\r\n                →  $3\r\nbar\r\n
//! LPUSH k a b c\r\n          →  :3\r\n
//! ```
//!
//! Replies use full RESP encoding (see [`protocol::types`]).
//!
//! ## Quick Start
//!
//! ```ignore
//! use flintkv::connection::{handle_connection, ConnectionStats};
//! use flintkv::pubsub::PubSub;
//! use flintkv::storage::{start_expiry_sweeper, StorageEngine};
//! use std::sync::Arc;
//! use std::time::Instant;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let pubsub = Arc::new(PubSub::new());
//!     let stats = Arc::new(ConnectionStats::new());
//!     let started_at = Instant::now();
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!
//!     let listener = TcpListener::bind("0.0.0.0:6379").await.unwrap();
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             Arc::clone(&storage),
//!             Arc::clone(&pubsub),
//!             Arc::clone(&stats),
//!             started_at,
//!         ));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: inline request tokenizer and RESP reply encoding
//! - [`storage`]: typed keyspace with TTL support and the expiry sweeper
//! - [`pubsub`]: channel subscription registry and fan-out
//! - [`commands`]: one handler per supported command
//! - [`connection`]: per-client tasks and connection accounting

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod pubsub;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats, MAX_CONNECTIONS};
pub use protocol::RespValue;
pub use pubsub::PubSub;
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port flintkv listens on (same as Redis).
pub const DEFAULT_PORT: u16 = 6379;

/// Version of flintkv.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
