//! Typed Keyspace with Expiry Support
//!
//! This module implements the core storage engine: a thread-safe mapping
//! from key bytes to a typed value with an optional expiry deadline.
//!
//! ## Design
//!
//! 1. **One entry per key**: a key holds exactly one [`Value`] variant
//!    (string, list, hash or set). The variant is fixed until the entry
//!    is deleted or expires; operations against the wrong variant fail
//!    without mutating the entry.
//! 2. **Sharded locks**: the keyspace is split into shards, each behind
//!    its own `RwLock`, so readers and writers of different keys do not
//!    contend. No command operates across keys atomically, so per-shard
//!    locking preserves the observable serialization order.
//! 3. **Lazy + active expiry**: every read and write path treats an
//!    entry whose deadline has passed as absent. The background sweeper
//!    ([`crate::storage::expiry`]) only reclaims the memory.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are only ever held for the duration of one operation; nothing
//! suspends or performs I/O while holding one.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Number of keyspace shards.
/// More shards = less lock contention, more per-engine overhead.
const NUM_SHARDS: usize = 64;

/// Error returned when a typed operation hits a key of another variant.
///
/// The message is the exact sentinel the wire protocol requires.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
}

/// Result alias for operations that can fail with a type mismatch.
pub type StoreResult<T> = Result<T, StoreError>;

/// The payload of a stored entry. Exactly one variant per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A plain byte string.
    Str(Bytes),
    /// An ordered sequence with O(1) push/pop at both ends.
    List(VecDeque<Bytes>),
    /// Field → value mapping with unique fields.
    Hash(HashMap<Bytes, Bytes>),
    /// Unordered collection of unique members.
    Set(HashSet<Bytes>),
}

/// A stored value together with its optional expiry deadline.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The typed payload.
    pub value: Value,
    /// When this entry expires (None = never).
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry that expires after `ttl`. A deadline too far in
    /// the future to represent is stored as no expiry.
    pub fn with_ttl(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// Whether the deadline has passed. Expiry is strict: an entry whose
    /// deadline equals the current instant is still live.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() > deadline)
            .unwrap_or(false)
    }
}

/// A single shard holding a portion of the keyspace.
#[derive(Debug, Default)]
struct Shard {
    entries: RwLock<HashMap<Bytes, Entry>>,
}

/// Operation counters reported through INFO.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Live (non-expired) keys at the time of the call.
    pub keys: usize,
    /// Total GET operations.
    pub get_ops: u64,
    /// Total SET operations.
    pub set_ops: u64,
    /// Total DEL operations.
    pub del_ops: u64,
    /// Expired entries reclaimed (lazily or by the sweeper).
    pub expired: u64,
}

/// Approximate memory accounting for the INFO report.
#[derive(Debug, Clone, Copy)]
pub struct MemoryInfo {
    /// Number of live keys.
    pub keys: usize,
    /// Approximate bytes held by live entries.
    pub used_memory: usize,
}

/// The storage engine shared by every client connection.
///
/// Designed to be wrapped in an `Arc` and cloned into each connection
/// task; all operations take `&self` and are thread-safe.
///
/// # Example
///
/// ```
/// use flintkv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("flint"), None);
/// let value = engine.get(&Bytes::from("name")).unwrap();
/// assert_eq!(value, Some(Bytes::from("flint")));
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    #[inline]
    fn note_expired(&self, n: u64) {
        self.expired_count.fetch_add(n, Ordering::Relaxed);
    }

    // ========================================================================
    // String / generic key operations
    // ========================================================================

    /// Creates or replaces `key` with a string value.
    ///
    /// The whole entry is replaced, so any previous variant and any
    /// previous expiry are discarded; `ttl` of `None` leaves the new
    /// entry persistent.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(Value::Str(value), ttl),
            None => Entry::new(Value::Str(value)),
        };

        let mut entries = self.shard(&key).entries.write().unwrap();
        entries.insert(key, entry);
    }

    /// Reads the string value of `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or logically expired,
    /// and `Err(WrongType)` when the key holds a non-string variant.
    /// Expired entries found on the fast path are removed under the
    /// write lock (lazy expiry).
    pub fn get(&self, key: &Bytes) -> StoreResult<Option<Bytes>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.shard(key);

        // Fast path: read lock only.
        {
            let entries = shard.entries.read().unwrap();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_expired() => {} // fall through to reclaim
                Some(entry) => {
                    return match &entry.value {
                        Value::Str(data) => Ok(Some(data.clone())),
                        _ => Err(StoreError::WrongType),
                    };
                }
            }
        }

        // Entry looked expired: take the write lock to remove it.
        let mut entries = shard.entries.write().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.remove(key);
                self.note_expired(1);
                return Ok(None);
            }
            // Another writer replaced the entry in between.
            return match &entry.value {
                Value::Str(data) => Ok(Some(data.clone())),
                _ => Err(StoreError::WrongType),
            };
        }

        Ok(None)
    }

    /// Deletes `key`.
    ///
    /// Returns `true` only when a live entry was removed; a logically
    /// expired entry is reclaimed but counts as absent.
    pub fn remove(&self, key: &Bytes) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.shard(key).entries.write().unwrap();
        match entries.get(key) {
            None => false,
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                self.note_expired(1);
                false
            }
            Some(_) => {
                entries.remove(key);
                true
            }
        }
    }

    /// Whether `key` is present and not logically expired.
    pub fn exists(&self, key: &Bytes) -> bool {
        let entries = self.shard(key).entries.read().unwrap();
        entries.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Sets the expiry of an existing key to `seconds` from now.
    ///
    /// Returns `false` when the key is absent or logically expired. A
    /// non-positive `seconds` leaves the entry already past its deadline,
    /// so it becomes invisible to every subsequent operation. A deadline
    /// too far in the future to represent is stored as no expiry.
    pub fn expire(&self, key: &Bytes, seconds: i64) -> bool {
        let mut entries = self.shard(key).entries.write().unwrap();
        match entries.get_mut(key) {
            None => false,
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                self.note_expired(1);
                false
            }
            Some(entry) => {
                let now = Instant::now();
                entry.expires_at = if seconds > 0 {
                    now.checked_add(Duration::from_secs(seconds as u64))
                } else {
                    Some(now)
                };
                true
            }
        }
    }

    /// Remaining time-to-live of `key` in whole seconds.
    ///
    /// `-2` when the key is absent or logically expired, `-1` when it is
    /// present without an expiry, otherwise the floor of the remaining
    /// duration.
    pub fn ttl(&self, key: &Bytes) -> i64 {
        let entries = self.shard(key).entries.read().unwrap();
        match entries.get(key) {
            None => -2,
            Some(entry) if entry.is_expired() => -2,
            Some(entry) => match entry.expires_at {
                None => -1,
                Some(deadline) => {
                    let now = Instant::now();
                    if now > deadline {
                        -2
                    } else {
                        (deadline - now).as_secs() as i64
                    }
                }
            },
        }
    }

    // ========================================================================
    // List operations
    // ========================================================================

    /// Looks up a live entry for mutation, reclaiming it first if the
    /// deadline has passed. Used by the container ops that create fresh
    /// entries for absent keys.
    fn reclaim_if_expired(&self, entries: &mut HashMap<Bytes, Entry>, key: &Bytes) {
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
            self.note_expired(1);
        }
    }

    /// Prepends `values` to the list at `key`, creating it when absent.
    ///
    /// Values are pushed to the head one at a time in argument order, so
    /// the last argument ends up first. Returns the resulting length.
    pub fn lpush(&self, key: Bytes, values: Vec<Bytes>) -> StoreResult<usize> {
        let mut entries = self.shard(&key).entries.write().unwrap();
        self.reclaim_if_expired(&mut entries, &key);

        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let Value::List(items) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        for value in values {
            items.push_front(value);
        }
        Ok(items.len())
    }

    /// Appends `values` to the list at `key`, creating it when absent.
    /// Returns the resulting length.
    pub fn rpush(&self, key: Bytes, values: Vec<Bytes>) -> StoreResult<usize> {
        let mut entries = self.shard(&key).entries.write().unwrap();
        self.reclaim_if_expired(&mut entries, &key);

        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let Value::List(items) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        for value in values {
            items.push_back(value);
        }
        Ok(items.len())
    }

    /// Removes and returns the head of the list at `key`.
    ///
    /// Returns `None` for a missing key, an expired key, a non-list
    /// value or an empty list. An emptied list keeps its key.
    pub fn lpop(&self, key: &Bytes) -> Option<Bytes> {
        let mut entries = self.shard(key).entries.write().unwrap();
        let entry = entries.get_mut(key)?;
        if entry.is_expired() {
            entries.remove(key);
            self.note_expired(1);
            return None;
        }
        match &mut entry.value {
            Value::List(items) => items.pop_front(),
            _ => None,
        }
    }

    /// Removes and returns the tail of the list at `key`.
    /// Same absence rules as [`lpop`](Self::lpop).
    pub fn rpop(&self, key: &Bytes) -> Option<Bytes> {
        let mut entries = self.shard(key).entries.write().unwrap();
        let entry = entries.get_mut(key)?;
        if entry.is_expired() {
            entries.remove(key);
            self.note_expired(1);
            return None;
        }
        match &mut entry.value {
            Value::List(items) => items.pop_back(),
            _ => None,
        }
    }

    /// Length of the list at `key`; 0 when absent or expired,
    /// `WrongType` when the key holds another variant.
    pub fn llen(&self, key: &Bytes) -> StoreResult<usize> {
        let entries = self.shard(key).entries.read().unwrap();
        match entries.get(key) {
            None => Ok(0),
            Some(entry) if entry.is_expired() => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(items) => Ok(items.len()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// Inclusive range of list elements between `start` and `stop`.
    ///
    /// Negative indices count from the tail (`-1` is the last element).
    /// Indices are clamped to the list bounds; a normalized range with
    /// `start > stop` is empty. Missing, expired and non-list keys all
    /// yield an empty range.
    pub fn lrange(&self, key: &Bytes, start: i64, stop: i64) -> Vec<Bytes> {
        let entries = self.shard(key).entries.read().unwrap();
        let Some(entry) = entries.get(key) else {
            return Vec::new();
        };
        if entry.is_expired() {
            return Vec::new();
        }
        let Value::List(items) = &entry.value else {
            return Vec::new();
        };

        let len = items.len() as i64;
        let mut start = if start < 0 { len + start } else { start };
        let mut stop = if stop < 0 { len + stop } else { stop };
        if start < 0 {
            start = 0;
        }
        if stop >= len {
            stop = len - 1;
        }
        if start > stop || start >= len {
            return Vec::new();
        }

        items
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }

    // ========================================================================
    // Hash operations
    // ========================================================================

    /// Assigns each field/value pair on the hash at `key`, creating the
    /// hash when absent. Returns how many fields did not previously
    /// exist.
    pub fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> StoreResult<usize> {
        let mut entries = self.shard(&key).entries.write().unwrap();
        self.reclaim_if_expired(&mut entries, &key);

        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let Value::Hash(fields) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let mut added = 0;
        for (field, value) in pairs {
            if fields.insert(field, value).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Reads one field of the hash at `key`.
    ///
    /// `Ok(None)` when the key or field is absent (or the key expired);
    /// `WrongType` when the key holds another variant.
    pub fn hget(&self, key: &Bytes, field: &Bytes) -> StoreResult<Option<Bytes>> {
        let entries = self.shard(key).entries.read().unwrap();
        match entries.get(key) {
            None => Ok(None),
            Some(entry) if entry.is_expired() => Ok(None),
            Some(entry) => match &entry.value {
                Value::Hash(fields) => Ok(fields.get(field).cloned()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// Removes the named fields from the hash at `key`, returning how
    /// many were removed. Absent, expired and non-hash keys yield 0.
    /// An emptied hash keeps its key.
    pub fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> usize {
        let mut entries = self.shard(key).entries.write().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            return 0;
        };
        if entry.is_expired() {
            entries.remove(key);
            self.note_expired(1);
            return 0;
        }
        let Value::Hash(map) = &mut entry.value else {
            return 0;
        };

        fields.iter().filter(|f| map.remove(*f).is_some()).count()
    }

    /// All field/value pairs of the hash at `key`, in no particular
    /// order. Absent, expired and non-hash keys yield an empty vector.
    pub fn hgetall(&self, key: &Bytes) -> Vec<(Bytes, Bytes)> {
        let entries = self.shard(key).entries.read().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                Value::Hash(fields) => fields
                    .iter()
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // Set operations
    // ========================================================================

    /// Adds `members` to the set at `key`, creating it when absent.
    /// Returns how many members were newly added.
    pub fn sadd(&self, key: Bytes, members: Vec<Bytes>) -> StoreResult<usize> {
        let mut entries = self.shard(&key).entries.write().unwrap();
        self.reclaim_if_expired(&mut entries, &key);

        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        let Value::Set(set) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };

        let mut added = 0;
        for member in members {
            if set.insert(member) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes `members` from the set at `key`, returning how many were
    /// actually present. Absent, expired and non-set keys yield 0.
    /// An emptied set keeps its key.
    pub fn srem(&self, key: &Bytes, members: &[Bytes]) -> usize {
        let mut entries = self.shard(key).entries.write().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            return 0;
        };
        if entry.is_expired() {
            entries.remove(key);
            self.note_expired(1);
            return 0;
        }
        let Value::Set(set) = &mut entry.value else {
            return 0;
        };

        members.iter().filter(|m| set.remove(*m)).count()
    }

    /// All members of the set at `key`, in no particular order. Absent,
    /// expired and non-set keys yield an empty vector.
    pub fn smembers(&self, key: &Bytes) -> Vec<Bytes> {
        let entries = self.shard(key).entries.read().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                Value::Set(set) => set.iter().cloned().collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Cardinality of the set at `key`; 0 for absent, expired and
    /// non-set keys.
    pub fn scard(&self, key: &Bytes) -> usize {
        let entries = self.shard(key).entries.read().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                Value::Set(set) => set.len(),
                _ => 0,
            },
            _ => 0,
        }
    }

    // ========================================================================
    // Whole-keyspace operations
    // ========================================================================

    /// Removes every entry, shard by shard.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.entries.write().unwrap().clear();
        }
    }

    /// Number of live (non-expired) keys. Scans every shard under its
    /// read lock.
    pub fn live_keys(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let entries = shard.entries.read().unwrap();
                entries.values().filter(|e| !e.is_expired()).count()
            })
            .sum()
    }

    /// Approximate memory footprint of live entries.
    pub fn memory_info(&self) -> MemoryInfo {
        let mut keys = 0usize;
        let mut used_memory = 0usize;

        for shard in &self.shards {
            let entries = shard.entries.read().unwrap();
            for (key, entry) in entries.iter() {
                if entry.is_expired() {
                    continue;
                }
                keys += 1;
                let payload = match &entry.value {
                    Value::Str(data) => data.len(),
                    Value::List(items) => items.iter().map(|v| v.len()).sum(),
                    Value::Hash(fields) => {
                        fields.iter().map(|(f, v)| f.len() + v.len()).sum()
                    }
                    Value::Set(members) => members.iter().map(|m| m.len()).sum(),
                };
                // 64 bytes of per-entry overhead estimate.
                used_memory += key.len() + payload + 64;
            }
        }

        MemoryInfo { keys, used_memory }
    }

    /// Removes every entry whose deadline has passed. Called by the
    /// background sweeper; returns the number reclaimed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut entries = shard.entries.write().unwrap();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired());
            cleaned += (before - entries.len()) as u64;
        }

        if cleaned > 0 {
            self.note_expired(cleaned);
        }
        cleaned
    }

    /// Snapshot of the operation counters plus the live key count.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.live_keys(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
