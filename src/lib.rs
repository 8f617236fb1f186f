//! Client implementation of the Kannel bearerbox box-connection protocol:
//! a length-framed, message-oriented TCP protocol used by SMS-gateway
//! boxes to register with, monitor and exchange traffic with a central
//! bearerbox process.
//!
//! The crate is organized around a layered pipeline, mirroring the wire
//! protocol:
//!
//! * [`msg`]: the typed message model ([`Message`], [`AdminCommand`],
//!   [`HeartBeat`]) with wire discriminants derived from the variant tag.
//! * [`transcode`]: the [`Transcoder`] boundary between frame payloads
//!   and messages, with [`BoxTranscoder`] as the reference grammar.
//! * [`codec`]: length-prefix framing with a hard upper bound on the
//!   declared frame size.
//! * [`pipeline`]: the ordered per-connection stage chain (write
//!   timeout, framing, transcoding, traffic logging, dispatch).
//! * [`session`]: the [`SessionHandler`] callback interface and its
//!   dedicated dispatch executor.
//! * [`client`]: the [`BoxClient`] engine for connect, identify
//!   handshake and session lifecycle.
//!
//! A session is opened with [`BoxClient::identify`]: the engine connects,
//! installs the pipeline, writes a single `Identify` administrative
//! command carrying the configured box id, and hands back a
//! [`ClientSession`]. The gateway acknowledges implicitly by keeping the
//! connection open; from then on inbound messages, recoverable errors and
//! the final connection-closed signal arrive through the application's
//! [`SessionHandler`].

pub mod client;
pub mod codec;
pub mod msg;
pub mod pipeline;
pub mod session;
pub mod transcode;


pub use client::{BoxClient, BoxClientBuilder, ClientSession, SessionConfig, SessionError, SessionResult};
pub use msg::{Admin, AdminCommand, HeartBeat, Message, MessageType, PARAM_UNDEFINED};
pub use session::{SessionHandler, SessionState};
pub use transcode::{BoxTranscoder, DecodeError, EncodeError, Transcoder};
