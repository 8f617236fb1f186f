// ABOUTME: Per-handshake session configuration for connecting to a bearerbox
// ABOUTME: Plain value owned by the caller; the engine never retains it past identify

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use std::time::Duration;

/// Configuration for one `identify` attempt.
///
/// Constructed by the caller before each handshake; the engine reads it
/// during the call and does not keep it afterwards.
///
/// # Example
///
/// ```rust
/// use boxconn::client::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("localhost", 13001, "sms-box-1")
///     .with_connect_timeout(Duration::from_secs(10))
///     .with_write_timeout(Duration::from_secs(5))
///     .with_heartbeat_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bearerbox host name or address.
    pub host: String,
    /// Bearerbox box-connection port.
    pub port: u16,
    /// Identifier this client reports in the identify handshake.
    pub client_id: String,
    /// Bound on the transport connect phase; `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Bound on each raw write. `None` omits the write-timeout stage from
    /// the pipeline entirely rather than installing a disabled one.
    pub write_timeout: Option<Duration>,
    /// Interval between automatic heartbeats; `None` disables them.
    pub heartbeat_interval: Option<Duration>,
    /// Largest frame payload accepted from the peer.
    pub max_frame_size: usize,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            connect_timeout: None,
            write_timeout: None,
            heartbeat_interval: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}
