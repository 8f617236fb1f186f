// ABOUTME: Client module assembling the session engine, configuration and error types
// ABOUTME: Entry point for applications opening box connections to a bearerbox

//! Box-connection client engine.
//!
//! [`BoxClient`] owns the process-level resources (I/O worker pool,
//! transcoder, stage provider) and opens sessions with
//! [`identify`](BoxClient::identify); each successful handshake yields a
//! [`ClientSession`] whose inbound traffic is delivered through the
//! application's [`SessionHandler`](crate::session::SessionHandler).
//!
//! ```rust,no_run
//! use boxconn::client::{BoxClient, SessionConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # struct MyHandler;
//! # impl boxconn::session::SessionHandler for MyHandler {
//! #     fn on_inbound_message(&self, _: boxconn::msg::Message) {}
//! #     fn on_exception_caught(&self, _: boxconn::client::SessionError) {}
//! #     fn on_connection_closed(&self) {}
//! # }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BoxClient::builder()
//!     .handle(tokio::runtime::Handle::current())
//!     .build()?;
//!
//! let config = SessionConfig::new("localhost", 13001, "sms-box-1")
//!     .with_connect_timeout(Duration::from_secs(10))
//!     .with_heartbeat_interval(Duration::from_secs(30));
//!
//! let session = client.identify(&config, Arc::new(MyHandler)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;

pub use config::SessionConfig;
pub use driver::ClientSession;
pub use engine::{BoxClient, BoxClientBuilder};
pub use error::{SessionError, SessionResult};
