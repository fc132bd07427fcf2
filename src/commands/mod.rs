//! Command Processing
//!
//! Receives tokenized requests, executes them against the storage
//! engine or the pub/sub registry, and produces one RESP reply per
//! request.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Inline parser   │  (protocol module)
//! └────────┬────────┘
//!          │ tokens
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - dispatch     │
//! │  - arity check  │
//! │  - execute      │
//! └────────┬────────┘
//!          │
//!          ├──────────────────┐
//!          ▼                  ▼
//! ┌─────────────────┐  ┌─────────────┐
//! │ StorageEngine   │  │   PubSub    │
//! └─────────────────┘  └─────────────┘
//! ```

pub mod handler;

pub use handler::CommandHandler;
