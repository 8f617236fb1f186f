// ABOUTME: Box-connection client demo connecting to a bearerbox and identifying
// ABOUTME: Shows session setup, handler callbacks and graceful teardown

//! # Box-Connection Identify Demo
//!
//! Connects to a running bearerbox, performs the identification handshake
//! and then stays connected, heartbeating and logging everything the
//! gateway sends, until the run duration elapses or the gateway closes
//! the connection.
//!
//! ## Usage
//!
//! ```bash
//! # Identify as "demo-box" against a local bearerbox
//! cargo run --example identify -- --box-id demo-box
//!
//! # Custom gateway, timeouts and heartbeat cadence
//! cargo run --example identify -- \
//!   --host gw.example.org --port 13001 \
//!   --box-id sms-box-1 \
//!   --connect-timeout 10 \
//!   --heartbeat-interval 30 \
//!   --run-duration 600
//! ```

use argh::FromArgs;
use boxconn::client::{BoxClient, SessionConfig, SessionError};
use boxconn::msg::Message;
use boxconn::session::SessionHandler;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Box-connection client that identifies to a bearerbox
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the hostname or IP address of the bearerbox (default: localhost)
    #[argh(option)]
    host: Option<String>,

    /// the box-connection port of the bearerbox (default: 13001)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// the box id to identify as
    #[argh(option)]
    box_id: String,

    /// connect timeout in seconds (default: 10)
    #[argh(option)]
    connect_timeout: Option<u64>,

    /// write timeout in seconds (default: none)
    #[argh(option)]
    write_timeout: Option<u64>,

    /// heartbeat interval in seconds (default: 30)
    #[argh(option)]
    heartbeat_interval: Option<u64>,

    /// how long to stay connected in seconds (default: 300)
    #[argh(option)]
    run_duration: Option<u64>,
}

struct LoggingHandler {
    closed: Arc<AtomicBool>,
}

impl SessionHandler for LoggingHandler {
    fn on_inbound_message(&self, message: Message) {
        info!("received {message:?}");
    }

    fn on_exception_caught(&self, error: SessionError) {
        warn!("session error: {error}");
    }

    fn on_connection_closed(&self) {
        info!("connection closed");
        self.closed.store(true, Ordering::Release);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let host = cli_args.host.unwrap_or_else(|| "localhost".to_owned());
    let port = cli_args.port.unwrap_or(13001);
    let run_duration = Duration::from_secs(cli_args.run_duration.unwrap_or(300));

    let mut config = SessionConfig::new(host.clone(), port, cli_args.box_id.clone())
        .with_connect_timeout(Duration::from_secs(cli_args.connect_timeout.unwrap_or(10)))
        .with_heartbeat_interval(Duration::from_secs(cli_args.heartbeat_interval.unwrap_or(30)));
    if let Some(seconds) = cli_args.write_timeout {
        config = config.with_write_timeout(Duration::from_secs(seconds));
    }

    info!("Connecting to bearerbox at {host}:{port}");

    let client = BoxClient::builder()
        .handle(tokio::runtime::Handle::current())
        .build()?;

    let closed = Arc::new(AtomicBool::new(false));
    let handler = Arc::new(LoggingHandler {
        closed: closed.clone(),
    });

    let session = match client.identify(&config, handler).await {
        Ok(session) => session,
        Err(e) => {
            error!("Identification failed: {e}");
            return Err(Box::<dyn Error>::from(e.to_string()));
        }
    };

    info!("Identified as {}, staying connected", cli_args.box_id);

    let start_time = std::time::Instant::now();
    while start_time.elapsed() < run_duration {
        if closed.load(Ordering::Acquire) {
            warn!("Gateway closed the connection");
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }

    if session.is_active() {
        info!("Run duration elapsed, closing the session");
        session.close();
    }

    let uptime = start_time.elapsed();
    info!("Client ran for {:.1} seconds", uptime.as_secs_f64());

    Ok(())
}
