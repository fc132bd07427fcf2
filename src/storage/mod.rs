//! Storage Engine
//!
//! The typed keyspace and its background expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │  ...N   │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (background tokio task)  │
//!              └───────────────────────────┘
//! ```
//!
//! Each key maps to exactly one typed [`Value`] (string, list, hash or
//! set) with an optional deadline. Expiry is enforced logically on every
//! access; the sweeper only reclaims memory.

pub mod engine;
pub mod expiry;

pub use engine::{Entry, MemoryInfo, StorageEngine, StorageStats, StoreError, StoreResult, Value};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
