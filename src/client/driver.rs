// ABOUTME: Per-connection driver task serializing pipeline I/O, outbound writes and heartbeats
// ABOUTME: Exposes the ClientSession handle applications use to talk to an established session

use crate::client::error::{SessionError, SessionResult};
use crate::msg::{HeartBeat, Message};
use crate::pipeline::Pipeline;
use crate::session::{SessionEvent, SessionState, StateCell};
use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Instruction from a [`ClientSession`] to its driver.
#[derive(Debug)]
pub(crate) enum Command {
    Send(Message),
    Close,
}

/// Handle to an established box-connection session.
///
/// Messages submitted through [`send`](ClientSession::send) are written
/// to the transport in submission order. Dropping the handle closes the
/// connection, which surfaces as the session's single
/// `on_connection_closed` callback.
pub struct ClientSession {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<StateCell>,
}

impl ClientSession {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, state: Arc<StateCell>) -> Self {
        Self { commands, state }
    }

    /// Queue one message for transmission.
    pub fn send(&self, message: Message) -> SessionResult<()> {
        self.commands
            .send(Command::Send(message))
            .map_err(|_| SessionError::Closed)
    }

    /// Ask the driver to close the connection. Safe to call more than
    /// once; the closed callback still fires exactly once.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Current lifecycle state of this session.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// True while the connection is established and usable.
    pub fn is_active(&self) -> bool {
        self.state.get() == SessionState::Established
    }
}

/// Owns the socket and the assembled pipeline for one connection.
///
/// A single task runs [`Driver::run`], so every stage invocation for the
/// connection is serialized: inbound chunks, outbound messages and
/// heartbeat ticks never interleave mid-stage.
pub(crate) struct Driver {
    pub(crate) stream: TcpStream,
    pub(crate) pipeline: Pipeline,
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) heartbeat_interval: Option<Duration>,
    pub(crate) state: Arc<StateCell>,
}

impl Driver {
    pub(crate) async fn run(self) {
        let Driver {
            stream,
            mut pipeline,
            events,
            mut commands,
            heartbeat_interval,
            state,
        } = self;

        let write_timeout = pipeline.write_timeout();
        let (mut reader, mut writer) = stream.into_split();
        let mut read_buf = BytesMut::with_capacity(4 * 1024);
        let mut heartbeat = heartbeat_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                result = reader.read_buf(&mut read_buf) => match result {
                    Ok(0) => {
                        if pipeline.has_partial_input() {
                            // The peer closed while sending a frame.
                            report(&events, SessionError::Io(io::Error::new(
                                io::ErrorKind::ConnectionReset,
                                "connection reset by peer",
                            )));
                        }
                        break;
                    }
                    Ok(_) => {
                        let chunk = read_buf.split().freeze();
                        if let Err(error) = pipeline.read(chunk) {
                            report(&events, error);
                            break;
                        }
                    }
                    Err(error) => {
                        report(&events, SessionError::Io(error));
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Send(message)) => {
                        let alive = send_message(
                            &mut pipeline, &mut writer, &events, message, write_timeout,
                        )
                        .await;
                        if !alive {
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        debug!("session closed locally");
                        break;
                    }
                },
                _ = maybe_tick(&mut heartbeat) => {
                    let alive = send_message(
                        &mut pipeline,
                        &mut writer,
                        &events,
                        Message::HeartBeat(HeartBeat::new(0)),
                        write_timeout,
                    )
                    .await;
                    if !alive {
                        break;
                    }
                }
            }
        }

        let _ = writer.shutdown().await;
        state.set(SessionState::Closed);
        let _ = events.send(SessionEvent::ConnectionClosed);
    }
}

/// Run one outbound message through the pipeline and the socket.
/// Returns `false` when the failure is connection-fatal.
async fn send_message(
    pipeline: &mut Pipeline,
    writer: &mut OwnedWriteHalf,
    events: &mpsc::UnboundedSender<SessionEvent>,
    message: Message,
    write_timeout: Option<Duration>,
) -> bool {
    let chunks = match pipeline.write(message) {
        Ok(chunks) => chunks,
        Err(error) => {
            let fatal = error.is_fatal();
            report(events, error);
            return !fatal;
        }
    };
    match write_frames(writer, &chunks, write_timeout).await {
        Ok(()) => true,
        Err(error) => {
            report(events, error);
            false
        }
    }
}

fn report(events: &mpsc::UnboundedSender<SessionEvent>, error: SessionError) {
    let _ = events.send(SessionEvent::ExceptionCaught(error));
}

/// Write fully-encoded frames, bounding each write by the configured
/// timeout when one is installed. Timeout expiry is connection-fatal.
pub(crate) async fn write_frames<W: AsyncWrite + Unpin>(
    writer: &mut W,
    chunks: &[Bytes],
    write_timeout: Option<Duration>,
) -> Result<(), SessionError> {
    for chunk in chunks {
        match write_timeout {
            Some(bound) => match time::timeout(bound, writer.write_all(chunk)).await {
                Ok(result) => result?,
                Err(_) => return Err(SessionError::WriteTimeout(bound)),
            },
            None => writer.write_all(chunk).await?,
        }
    }
    writer.flush().await?;
    Ok(())
}

async fn maybe_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stalled_write_trips_the_timeout() {
        // A tiny duplex buffer that nobody drains: the second write can
        // make no progress.
        let (mut near, _far) = tokio::io::duplex(8);
        let chunks = vec![Bytes::from(vec![0u8; 64])];

        let result = write_frames(&mut near, &chunks, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(SessionError::WriteTimeout(_))));
    }

    #[tokio::test]
    async fn unbounded_write_completes() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        let chunks = vec![Bytes::from_static(b"abc"), Bytes::from_static(b"def")];

        write_frames(&mut near, &chunks, None).await.unwrap();

        let mut received = vec![0u8; 6];
        far.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"abcdef");
    }
}
