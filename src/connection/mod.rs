//! Connection Management
//!
//! One async task per accepted client, plus the shared connection
//! accounting that enforces the admission ceiling.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (main.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() → spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ConnectionHandler                          │
//! │                                                             │
//! │  ┌────────────┐   ┌───────────┐   ┌─────────────┐           │
//! │  │ Read bytes │──>│ Frame on  │──>│ Tokenize &  │           │
//! │  │ (chunked)  │   │ CRLF      │   │ execute     │           │
//! │  └────────────┘   └───────────┘   └──────┬──────┘           │
//! │        ▲                                 │                  │
//! │        │          ┌───────────┐          ▼                  │
//! │  pub/sub mailbox ─│  select!  │──> write reply              │
//! │                   └───────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Admission is a lock-free reservation against a ceiling of 1000 live
//! connections; a refused socket is closed without writing any bytes.

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, MAX_CONNECTIONS,
};
