// ABOUTME: Session callback dispatch decoupling application handlers from connection I/O
// ABOUTME: Adapts pipeline events into the three-method SessionHandler interface

use crate::client::error::SessionError;
use crate::msg::Message;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use tokio::sync::mpsc;
use tracing::debug;

/// Callback interface consumed by application code.
///
/// All three methods run on a dedicated callback thread per session,
/// never on the I/O pool, so a slow handler cannot stall connection
/// processing. After `on_connection_closed` no further callbacks are
/// invoked for that connection.
pub trait SessionHandler: Send + Sync + 'static {
    /// A decoded inbound message; delivered exactly once, in arrival order.
    fn on_inbound_message(&self, message: Message);

    /// A non-fatal or fatal error surfaced by the pipeline or transport.
    fn on_exception_caught(&self, error: SessionError);

    /// The connection terminated, locally or remotely; delivered exactly once.
    fn on_connection_closed(&self);
}

/// Low-level connection event on its way to the application handler.
#[derive(Debug)]
pub enum SessionEvent {
    InboundMessage(Message),
    ExceptionCaught(SessionError),
    ConnectionClosed,
}

/// Pipeline stage forwarding events to the callback executor.
///
/// This is the final inbound stage: decoded messages and per-message
/// errors end here and are handed off through an unbounded channel, so
/// the I/O task never blocks on application code.
#[derive(Debug)]
pub struct SessionDispatcher {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionDispatcher {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }

    pub(crate) fn dispatch(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            // Callback thread already gone; nothing left to notify.
            debug!("dropping session event, callback executor has stopped");
        }
    }
}

/// Spawn the per-session callback executor.
///
/// Consumes events in order and stops after `ConnectionClosed`, which
/// guarantees the closed callback is terminal. Spawn failure is returned
/// to the caller; a session without its executor would silently lose the
/// exactly-once closed callback, so the handshake must fail instead.
pub(crate) fn spawn_callback_executor(
    handler: Arc<dyn SessionHandler>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("boxconn-callbacks".into())
        .spawn(move || {
            while let Some(event) = events.blocking_recv() {
                match event {
                    SessionEvent::InboundMessage(message) => handler.on_inbound_message(message),
                    SessionEvent::ExceptionCaught(error) => handler.on_exception_caught(error),
                    SessionEvent::ConnectionClosed => {
                        handler.on_connection_closed();
                        break;
                    }
                }
            }
        })
}

/// Lifecycle of one session/connection instance.
///
/// `Established` is reached after the identify write succeeds; `Closed`
/// is terminal for the connection. The intermediate states exist per
/// handshake attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Assembling,
    Identifying,
    Established,
    Failed,
    Closed,
}

/// Shared, lock-free session state cell.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn set(&self, state: SessionState) {
        debug!(?state, "session state changed");
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> SessionState {
        match self.0.load(Ordering::Acquire) {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Assembling,
            3 => SessionState::Identifying,
            4 => SessionState::Established,
            5 => SessionState::Failed,
            _ => SessionState::Closed,
        }
    }
}
