//! flintkv server entry point.
//!
//! Binds the TCP listener, starts the expiry sweeper, and spawns one
//! task per accepted connection until a shutdown signal arrives.

use flintkv::connection::{handle_connection, ConnectionStats};
use flintkv::pubsub::PubSub;
use flintkv::storage::{start_expiry_sweeper, StorageEngine};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration.
struct Config {
    /// Port to listen on.
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: flintkv::DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Parses the command line: an optional first positional argument is
    /// the port number.
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();

        match args.get(1).map(String::as_str) {
            None => Config::default(),
            Some("--help") => {
                print_help();
                std::process::exit(0);
            }
            Some("--version" | "-v") => {
                println!("flintkv version {}", flintkv::VERSION);
                std::process::exit(0);
            }
            Some(port) => match port.parse() {
                Ok(port) => Config { port },
                Err(_) => {
                    eprintln!("Error: invalid port number '{}'", port);
                    std::process::exit(1);
                }
            },
        }
    }

    /// The bind address.
    fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn print_help() {
    println!(
        r#"
flintkv - A Line-Protocol In-Memory Key-Value Server

USAGE:
    flintkv [PORT]

ARGS:
    PORT    Port to listen on (default: 6379)

OPTIONS:
    -v, --version    Print version information
        --help       Print this help message

CONNECTING:
    Commands are single CRLF-terminated lines:
    $ nc localhost 6379
    PING
    +PONG
    SET name flint
    +OK
    GET name
    $5
    flint
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
        ___ _ _       _   _
       / __| (_)_ _ | |_| |_____ __
      | _|| | | ' \|  _| / /\ V /
      |_| |_|_|_||_|\__|_\_\ \_/

flintkv v{} - In-Memory Key-Value Server
──────────────────────────────────────────
Listening on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        flintkv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    // Shared state for every connection task.
    let storage = Arc::new(StorageEngine::new());
    let pubsub = Arc::new(PubSub::new());
    let stats = Arc::new(ConnectionStats::new());
    let started_at = Instant::now();
    info!("storage engine initialized");

    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));

    // A bind/listen failure propagates out and exits non-zero.
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("listening on {}", config.bind_address());

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, storage, pubsub, stats, started_at) => {}
        _ = shutdown => {}
    }

    info!("server shutdown complete");
    Ok(())
}

/// Accepts connections until the task is dropped by the shutdown select.
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    pubsub: Arc<PubSub>,
    stats: Arc<ConnectionStats>,
    started_at: Instant,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    Arc::clone(&storage),
                    Arc::clone(&pubsub),
                    Arc::clone(&stats),
                    started_at,
                ));
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}
