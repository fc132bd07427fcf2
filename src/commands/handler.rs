//! Command Dispatch and Handlers
//!
//! One handler per command. Each handler validates arity, performs its
//! reads or mutations against the storage engine (or the pub/sub
//! registry), and produces exactly one reply. Handlers are total: every
//! input maps to a reply, and malformed input produces an error reply
//! rather than a dropped connection.
//!
//! ## Command set
//!
//! ### Strings and keys
//! - `SET key value [EX seconds]`, `GET key`
//! - `DEL key [key ...]`, `EXISTS key [key ...]`
//! - `EXPIRE key seconds`, `TTL key`
//!
//! ### Lists
//! - `LPUSH key value [value ...]`, `RPUSH key value [value ...]`
//! - `LPOP key`, `RPOP key`, `LLEN key`, `LRANGE key start stop`
//!
//! ### Hashes
//! - `HSET key field value [field value ...]`, `HGET key field`
//! - `HDEL key field [field ...]`, `HGETALL key`
//!
//! ### Sets
//! - `SADD key member [member ...]`, `SREM key member [member ...]`
//! - `SMEMBERS key`, `SCARD key`
//!
//! ### Pub/sub
//! - `SUBSCRIBE channel [channel ...]`, `UNSUBSCRIBE [channel ...]`
//! - `PUBLISH channel message`
//!
//! ### Server
//! - `PING [message]`, `INFO`, `FLUSHALL`
//!
//! ## Error taxonomy
//!
//! - `-ERR wrong number of arguments for '<verb>' command` — bad arity
//! - `-ERR unknown command '<VERB>'` — unrecognized verb
//! - `-WRONGTYPE Operation against a key holding the wrong kind of
//!   value` — type-specialized command against a mismatched variant
//!
//! All of these leave the connection open.

use crate::connection::ConnectionStats;
use crate::protocol::{fold_verb, RespValue};
use crate::pubsub::{DeliverySender, PubSub, SubscriberId};
use crate::storage::{StorageEngine, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Largest accepted expiry, in seconds (about 68 years). Wider values
/// cannot be represented as a deadline and draw the invalid-expire
/// error.
const MAX_EXPIRE_SECONDS: i64 = i32::MAX as i64;

/// Executes commands on behalf of one connection.
///
/// Cheap to construct: one is built per connection, carrying the shared
/// engine/registry/stats handles plus the connection's pub/sub identity
/// and delivery mailbox.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    pubsub: Arc<PubSub>,
    stats: Arc<ConnectionStats>,
    /// This connection's pub/sub identity.
    subscriber: SubscriberId,
    /// Sending half of this connection's delivery mailbox; extra
    /// subscribe confirmations and published messages go through here.
    mailbox: DeliverySender,
    /// Server start time, for the INFO uptime field.
    started_at: Instant,
}

impl CommandHandler {
    pub fn new(
        storage: Arc<StorageEngine>,
        pubsub: Arc<PubSub>,
        stats: Arc<ConnectionStats>,
        subscriber: SubscriberId,
        mailbox: DeliverySender,
        started_at: Instant,
    ) -> Self {
        Self {
            storage,
            pubsub,
            stats,
            subscriber,
            mailbox,
            started_at,
        }
    }

    /// Executes one tokenized request and returns its reply.
    pub fn execute(&self, tokens: &[Bytes]) -> RespValue {
        let Some(verb_token) = tokens.first() else {
            return RespValue::error("ERR empty command");
        };
        let verb = fold_verb(verb_token);
        let args = &tokens[1..];

        match verb.as_str() {
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "EXPIRE" => self.cmd_expire(args),
            "TTL" => self.cmd_ttl(args),

            "LPUSH" => self.cmd_push(args, true),
            "RPUSH" => self.cmd_push(args, false),
            "LPOP" => self.cmd_pop(args, true),
            "RPOP" => self.cmd_pop(args, false),
            "LLEN" => self.cmd_llen(args),
            "LRANGE" => self.cmd_lrange(args),

            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HDEL" => self.cmd_hdel(args),
            "HGETALL" => self.cmd_hgetall(args),

            "SADD" => self.cmd_sadd(args),
            "SREM" => self.cmd_srem(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SCARD" => self.cmd_scard(args),

            "SUBSCRIBE" => self.cmd_subscribe(args),
            "UNSUBSCRIBE" => self.cmd_unsubscribe(args),
            "PUBLISH" => self.cmd_publish(args),

            "PING" => self.cmd_ping(args),
            "INFO" => self.cmd_info(args),
            "FLUSHALL" => self.cmd_flushall(args),

            _ => RespValue::error(format!("ERR unknown command '{}'", verb)),
        }
    }

    // ========================================================================
    // String / key commands
    // ========================================================================

    /// SET key value [EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("set");
        }

        let ttl = match args.len() {
            2 => None,
            4 if fold_verb(&args[2]) == "EX" => match parse_int(&args[3]) {
                Some(secs) if secs > 0 && secs <= MAX_EXPIRE_SECONDS => {
                    Some(Duration::from_secs(secs as u64))
                }
                _ => return RespValue::error("ERR invalid expire time"),
            },
            _ => return RespValue::error("ERR syntax error"),
        };

        self.storage.set(args[0].clone(), args[1].clone(), ttl);
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("get");
        }

        match self.storage.get(&args[0]) {
            Ok(Some(value)) => RespValue::bulk_string(value),
            Ok(None) => RespValue::null(),
            Err(e) => wrong_type(e),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> RespValue {
        if args.is_empty() {
            return wrong_args("del");
        }

        let deleted = args.iter().filter(|key| self.storage.remove(key)).count();
        RespValue::integer(deleted as i64)
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Bytes]) -> RespValue {
        if args.is_empty() {
            return wrong_args("exists");
        }

        let found = args.iter().filter(|key| self.storage.exists(key)).count();
        RespValue::integer(found as i64)
    }

    /// EXPIRE key seconds
    ///
    /// An absent or expired key replies `:0` before the seconds token is
    /// even looked at.
    fn cmd_expire(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("expire");
        }

        if !self.storage.exists(&args[0]) {
            return RespValue::integer(0);
        }

        let seconds = match parse_int(&args[1]) {
            Some(secs) if secs <= MAX_EXPIRE_SECONDS => secs,
            _ => return RespValue::error("ERR invalid expire time"),
        };

        RespValue::integer(self.storage.expire(&args[0], seconds) as i64)
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("ttl");
        }

        RespValue::integer(self.storage.ttl(&args[0]))
    }

    // ========================================================================
    // List commands
    // ========================================================================

    /// LPUSH / RPUSH key value [value ...]
    fn cmd_push(&self, args: &[Bytes], front: bool) -> RespValue {
        if args.len() < 2 {
            return wrong_args(if front { "lpush" } else { "rpush" });
        }

        let key = args[0].clone();
        let values = args[1..].to_vec();
        let result = if front {
            self.storage.lpush(key, values)
        } else {
            self.storage.rpush(key, values)
        };

        match result {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => wrong_type(e),
        }
    }

    /// LPOP / RPOP key
    fn cmd_pop(&self, args: &[Bytes], front: bool) -> RespValue {
        if args.len() != 1 {
            return wrong_args(if front { "lpop" } else { "rpop" });
        }

        let popped = if front {
            self.storage.lpop(&args[0])
        } else {
            self.storage.rpop(&args[0])
        };

        match popped {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// LLEN key
    fn cmd_llen(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("llen");
        }

        match self.storage.llen(&args[0]) {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => wrong_type(e),
        }
    }

    /// LRANGE key start stop
    fn cmd_lrange(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 3 {
            return wrong_args("lrange");
        }

        let (Some(start), Some(stop)) = (parse_int(&args[1]), parse_int(&args[2])) else {
            return RespValue::error("ERR invalid range");
        };

        let items = self.storage.lrange(&args[0], start, stop);
        RespValue::array(items.into_iter().map(RespValue::bulk_string).collect())
    }

    // ========================================================================
    // Hash commands
    // ========================================================================

    /// HSET key field value [field value ...]
    fn cmd_hset(&self, args: &[Bytes]) -> RespValue {
        // One key plus at least one complete field/value pair.
        if args.len() < 3 || args.len() % 2 == 0 {
            return wrong_args("hset");
        }

        let pairs = args[1..]
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        match self.storage.hset(args[0].clone(), pairs) {
            Ok(added) => RespValue::integer(added as i64),
            Err(e) => wrong_type(e),
        }
    }

    /// HGET key field
    fn cmd_hget(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("hget");
        }

        match self.storage.hget(&args[0], &args[1]) {
            Ok(Some(value)) => RespValue::bulk_string(value),
            Ok(None) => RespValue::null(),
            Err(e) => wrong_type(e),
        }
    }

    /// HDEL key field [field ...]
    fn cmd_hdel(&self, args: &[Bytes]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("hdel");
        }

        let removed = self.storage.hdel(&args[0], &args[1..]);
        RespValue::integer(removed as i64)
    }

    /// HGETALL key
    fn cmd_hgetall(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("hgetall");
        }

        let mut flat = Vec::new();
        for (field, value) in self.storage.hgetall(&args[0]) {
            flat.push(RespValue::bulk_string(field));
            flat.push(RespValue::bulk_string(value));
        }
        RespValue::array(flat)
    }

    // ========================================================================
    // Set commands
    // ========================================================================

    /// SADD key member [member ...]
    fn cmd_sadd(&self, args: &[Bytes]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("sadd");
        }

        match self.storage.sadd(args[0].clone(), args[1..].to_vec()) {
            Ok(added) => RespValue::integer(added as i64),
            Err(e) => wrong_type(e),
        }
    }

    /// SREM key member [member ...]
    fn cmd_srem(&self, args: &[Bytes]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("srem");
        }

        let removed = self.storage.srem(&args[0], &args[1..]);
        RespValue::integer(removed as i64)
    }

    /// SMEMBERS key
    fn cmd_smembers(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("smembers");
        }

        let members = self.storage.smembers(&args[0]);
        RespValue::array(members.into_iter().map(RespValue::bulk_string).collect())
    }

    /// SCARD key
    fn cmd_scard(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return wrong_args("scard");
        }

        RespValue::integer(self.storage.scard(&args[0]) as i64)
    }

    // ========================================================================
    // Pub/sub commands
    // ========================================================================

    /// SUBSCRIBE channel [channel ...]
    ///
    /// One confirmation array per channel. The first is the inline
    /// reply; the rest ride the delivery mailbox so they still arrive in
    /// order on the wire.
    fn cmd_subscribe(&self, args: &[Bytes]) -> RespValue {
        if args.is_empty() {
            return wrong_args("subscribe");
        }

        let mut confirmations = Vec::with_capacity(args.len());
        for arg in args {
            let channel = channel_name(arg);
            let count = self
                .pubsub
                .subscribe(self.subscriber, &channel, self.mailbox.clone());
            confirmations.push(RespValue::array(vec![
                RespValue::bulk_string(Bytes::from_static(b"subscribe")),
                RespValue::bulk_string(arg.clone()),
                RespValue::integer(count as i64),
            ]));
        }

        let first = confirmations.remove(0);
        for extra in confirmations {
            let _ = self.mailbox.send(extra);
        }
        first
    }

    /// UNSUBSCRIBE [channel ...]
    ///
    /// With no arguments, drops every subscription this connection
    /// holds.
    fn cmd_unsubscribe(&self, args: &[Bytes]) -> RespValue {
        let channels: Vec<String> = if args.is_empty() {
            self.pubsub.subscriptions_of(self.subscriber)
        } else {
            args.iter().map(|a| channel_name(a)).collect()
        };

        if channels.is_empty() {
            return RespValue::array(vec![
                RespValue::bulk_string(Bytes::from_static(b"unsubscribe")),
                RespValue::null(),
                RespValue::integer(0),
            ]);
        }

        let mut confirmations = Vec::with_capacity(channels.len());
        for channel in channels {
            let remaining = self.pubsub.unsubscribe(self.subscriber, &channel);
            confirmations.push(RespValue::array(vec![
                RespValue::bulk_string(Bytes::from_static(b"unsubscribe")),
                RespValue::bulk_string(Bytes::from(channel.into_bytes())),
                RespValue::integer(remaining as i64),
            ]));
        }

        let first = confirmations.remove(0);
        for extra in confirmations {
            let _ = self.mailbox.send(extra);
        }
        first
    }

    /// PUBLISH channel message
    fn cmd_publish(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 2 {
            return wrong_args("publish");
        }

        let channel = channel_name(&args[0]);
        let delivered = self.pubsub.publish(&channel, &args[1]);
        RespValue::integer(delivered as i64)
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> RespValue {
        match args {
            [] => RespValue::pong(),
            [message] => RespValue::bulk_string(message.clone()),
            _ => wrong_args("ping"),
        }
    }

    /// INFO
    ///
    /// A multi-section human-readable report. Extra arguments (section
    /// selectors) are accepted and ignored.
    fn cmd_info(&self, _args: &[Bytes]) -> RespValue {
        let stats = self.storage.stats();
        let mem = self.storage.memory_info();
        let uptime = self.started_at.elapsed().as_secs();

        let info = format!(
            "# Server\r\n\
             redis_version:7.0.0-compatible\r\n\
             flintkv_version:{}\r\n\
             uptime_in_seconds:{}\r\n\
             \r\n\
             # Clients\r\n\
             connected_clients:{}\r\n\
             \r\n\
             # Memory\r\n\
             used_memory:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             db0:keys={}\r\n\
             \r\n\
             # Stats\r\n\
             total_commands_processed:{}\r\n\
             expired_keys:{}\r\n",
            crate::VERSION,
            uptime,
            self.stats.active(),
            mem.used_memory,
            stats.keys,
            self.stats.commands(),
            stats.expired,
        );

        RespValue::bulk_string(Bytes::from(info))
    }

    /// FLUSHALL
    ///
    /// Empties the keyspace; pub/sub subscriptions are untouched.
    fn cmd_flushall(&self, _args: &[Bytes]) -> RespValue {
        self.storage.flush();
        RespValue::ok()
    }
}

/// The arity error reply. Verbs are reported in lowercase.
fn wrong_args(verb: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        verb
    ))
}

/// The wrong-type sentinel, taken verbatim from the error's message.
fn wrong_type(e: StoreError) -> RespValue {
    RespValue::error(e.to_string())
}

/// Parses a signed decimal integer argument.
fn parse_int(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

/// Channel tokens are treated as text; invalid UTF-8 is replaced rather
/// than rejected.
fn channel_name(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).into_owned()
}
