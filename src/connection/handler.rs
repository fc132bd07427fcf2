//! Per-Connection Handling
//!
//! Each accepted client gets its own task running a read-execute-reply
//! loop until the peer disconnects or errors.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Admission: reserve a slot (CAS on the live-connection counter)
//!        │  full → close immediately, no bytes written
//!        ▼
//! 3. ┌──────────────────────────────────────┐
//!    │             Main Loop                │
//!    │                                      │
//!    │  extract CRLF-framed lines from the  │
//!    │  buffer → tokenize → execute → send  │
//!    │                                      │
//!    │  then select! on                     │
//!    │    - more socket bytes               │
//!    │    - a pub/sub delivery to forward   │
//!    └──────────────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF / error: release the slot, drop subscriptions, return
//! ```
//!
//! ## Framing and ordering
//!
//! TCP is a stream: one read may carry half a request or several whole
//! ones, so incoming bytes accumulate in a `BytesMut` buffer and
//! requests are cut at each CRLF. Empty requests are skipped. Every
//! reply is fully written (and flushed) before the next request is
//! parsed, which is what linearizes commands within a connection.
//! Pub/sub deliveries are only forwarded between requests, never in the
//! middle of a reply.

use crate::commands::CommandHandler;
use crate::protocol::{tokenize, RespValue};
use crate::pubsub::{DeliveryReceiver, PubSub};
use crate::storage::StorageEngine;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Ceiling on concurrently connected clients.
pub const MAX_CONNECTIONS: u64 = 1000;

/// Maximum bytes a single connection may buffer while waiting for a
/// complete request line.
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Connection accounting: the admission gauge plus traffic counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total connections admitted since start.
    connections_accepted: AtomicU64,
    /// Currently connected clients.
    active_connections: AtomicU64,
    /// Total commands executed.
    commands_processed: AtomicU64,
    /// Total bytes read from clients.
    bytes_read: AtomicU64,
    /// Total bytes written to clients.
    bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to reserve a connection slot.
    ///
    /// Lock-free: a compare-and-swap loop on the live gauge, so two
    /// racing accepts can never both take the last slot.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.active_connections.load(Ordering::Acquire);
        loop {
            if current >= MAX_CONNECTIONS {
                return false;
            }
            match self.active_connections.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.connections_accepted.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a slot taken by [`try_acquire`](Self::try_acquire).
    pub fn release(&self) {
        self.active_connections.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Currently connected clients (the INFO `connected_clients` field).
    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Total connections admitted.
    pub fn accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    /// Total commands executed.
    pub fn commands(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error on the socket.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Peer closed the connection between requests.
    #[error("client disconnected")]
    ClientDisconnected,

    /// Peer closed the connection mid-request.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A single request exceeded the buffer ceiling without a CRLF.
    #[error("buffer size limit exceeded")]
    BufferFull,
}

/// Drives one client connection to completion.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    handler: CommandHandler,
    /// Receiving half of this connection's pub/sub mailbox.
    mailbox: DeliveryReceiver,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        handler: CommandHandler,
        mailbox: DeliveryReceiver,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            handler,
            mailbox,
            stats,
        }
    }

    /// Runs the connection until EOF or error.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "client disconnected"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "connection error"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Serve every complete request already buffered. The reply
            // is on the wire before the next line is cut, so requests on
            // one connection are strictly ordered.
            while let Some(line) = self.next_request() {
                let tokens = tokenize(&line);
                if tokens.is_empty() {
                    continue;
                }
                trace!(client = %self.addr, verb = %String::from_utf8_lossy(&tokens[0]), "request");
                let reply = self.handler.execute(&tokens);
                self.stats.command_processed();
                self.send_reply(&reply).await?;
            }

            if self.buffer.len() >= MAX_BUFFER_SIZE {
                warn!(client = %self.addr, size = self.buffer.len(), "request exceeds buffer limit");
                return Err(ConnectionError::BufferFull);
            }
            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            tokio::select! {
                read = self.stream.get_mut().read_buf(&mut self.buffer) => {
                    let n = read?;
                    if n == 0 {
                        return if self.buffer.is_empty() {
                            Err(ConnectionError::ClientDisconnected)
                        } else {
                            // Trailing bytes with no CRLF: a truncated request.
                            Err(ConnectionError::UnexpectedEof)
                        };
                    }
                    self.stats.add_bytes_read(n);
                }
                Some(delivery) = self.mailbox.recv() => {
                    self.send_reply(&delivery).await?;
                }
            }
        }
    }

    /// Cuts the next CRLF-framed request out of the buffer.
    ///
    /// The returned line excludes the CRLF; `None` means the buffer
    /// holds no complete request yet.
    fn next_request(&mut self) -> Option<Bytes> {
        let pos = self
            .buffer
            .windows(2)
            .position(|window| window == b"\r\n")?;
        let line = self.buffer.split_to(pos + 2);
        Some(line.freeze().slice(0..pos))
    }

    /// Writes one reply in full.
    ///
    /// `write_all` + `flush` retries partial sends internally; any
    /// failure surfaces as an I/O error that ends the connection.
    async fn send_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.add_bytes_written(bytes.len());
        Ok(())
    }
}

/// Entry point for one accepted connection.
///
/// Reserves an admission slot (closing the socket silently when the
/// ceiling is hit), wires up the connection's pub/sub identity and
/// mailbox, runs the handler loop, and tears everything down on the way
/// out.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    storage: Arc<StorageEngine>,
    pubsub: Arc<PubSub>,
    stats: Arc<ConnectionStats>,
    started_at: Instant,
) {
    if !stats.try_acquire() {
        debug!(client = %addr, "connection ceiling reached, refusing");
        return;
    }

    let subscriber = pubsub.allocate_id();
    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let handler = CommandHandler::new(
        storage,
        Arc::clone(&pubsub),
        Arc::clone(&stats),
        subscriber,
        mailbox_tx,
        started_at,
    );

    let connection = ConnectionHandler::new(stream, addr, handler, mailbox_rx, Arc::clone(&stats));
    let _ = connection.run().await;

    pubsub.unsubscribe_all(subscriber);
    stats.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let pubsub = Arc::new(PubSub::new());
        let stats = Arc::new(ConnectionStats::new());
        let started_at = Instant::now();

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    Arc::clone(&storage_clone),
                    Arc::clone(&pubsub),
                    Arc::clone(&stats_clone),
                    started_at,
                ));
            }
        });

        (addr, storage, stats)
    }

    async fn read_reply(client: &mut TcpStream) -> Vec<u8> {
        let mut buf = [0u8; 512];
        let n = client.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn test_inline_ping() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PING\r\n").await.unwrap();

        assert_eq!(read_reply(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"SET name flint\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");

        client.write_all(b"GET name\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"$5\r\nflint\r\n");
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Half a request, then the rest plus a second request.
        client.write_all(b"SET k").await.unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        client.write_all(b" v\r\nGET k\r\n").await.unwrap();

        let mut replies = Vec::new();
        while replies.len() < b"+OK\r\n$1\r\nv\r\n".len() {
            let chunk = read_reply(&mut client).await;
            if chunk.is_empty() {
                break;
            }
            replies.extend_from_slice(&chunk);
        }
        assert_eq!(replies, b"+OK\r\n$1\r\nv\r\n");
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"\r\n\r\nPING\r\n").await.unwrap();

        // Only the PING draws a reply.
        assert_eq!(read_reply(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_error_keeps_connection_open() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"NOPE\r\n").await.unwrap();
        assert_eq!(
            read_reply(&mut client).await,
            b"-ERR unknown command 'NOPE'\r\n"
        );

        // The same connection still serves requests.
        client.write_all(b"PING\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active(), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.accepted(), 1);
        assert_eq!(stats.active(), 1);

        client.write_all(b"PING\r\n").await.unwrap();
        let _ = read_reply(&mut client).await;

        assert!(stats.commands() >= 1);

        drop(client);
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(stats.active(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_publish() {
        let (addr, _, _) = create_test_server().await;

        let mut subscriber = TcpStream::connect(addr).await.unwrap();
        subscriber.write_all(b"SUBSCRIBE news\r\n").await.unwrap();
        assert_eq!(
            read_reply(&mut subscriber).await,
            b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n"
        );

        let mut publisher = TcpStream::connect(addr).await.unwrap();
        publisher.write_all(b"PUBLISH news hi\r\n").await.unwrap();
        assert_eq!(read_reply(&mut publisher).await, b":1\r\n");

        assert_eq!(
            read_reply(&mut subscriber).await,
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n"
        );
    }

    #[test]
    fn test_admission_ceiling() {
        let stats = ConnectionStats::new();

        for _ in 0..MAX_CONNECTIONS {
            assert!(stats.try_acquire());
        }
        assert!(!stats.try_acquire());

        stats.release();
        assert!(stats.try_acquire());
        assert_eq!(stats.active(), MAX_CONNECTIONS);
    }
}
