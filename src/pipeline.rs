//! Ordered handler pipeline applied to every byte and message in both
//! directions.
//!
//! Each connection owns one [`Pipeline`]: an explicit ordered list of
//! [`Stage`] values assembled immediately after the transport connects
//! and before the first handshake write. A freshly created pipeline
//! holds a single placeholder stage that swallows bytes arriving before
//! assembly; [`Pipeline::assemble`] appends the real stages in their
//! fixed protocol order and then removes the placeholder.
//!
//! The order is an invariant, not a convenience: the write-timeout stage
//! has to sit outermost to bound raw writes, and the logger has to sit
//! between the codec stages and dispatch so it observes every decoded
//! message exactly once per direction.

use crate::client::config::SessionConfig;
use crate::client::error::SessionError;
use crate::codec::{FrameDecoder, FrameEncoder};
use crate::msg::Message;
use crate::session::{SessionDispatcher, SessionEvent};
use crate::transcode::Transcoder;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Identifies a stage independently of its instance state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    WriteTimeout,
    LengthFrameDecoder,
    LengthFrameEncoder,
    MessageDecoder,
    MessageEncoder,
    MessageLogger,
    SessionDispatch,
    Placeholder,
}

/// A unit of data travelling through the pipeline.
#[derive(Debug)]
pub(crate) enum Flow {
    /// Undecoded wire bytes.
    Raw(Bytes),
    /// The payload of exactly one length-delimited frame.
    Frame(Bytes),
    /// A decoded protocol message.
    Message(Message),
    /// A per-message failure on its way to the application handler.
    Error(SessionError),
}

/// Carries the configured write bound; the raw write itself is timed by
/// the connection driver, which is the only place that sees the socket.
#[derive(Debug)]
pub struct WriteTimeoutStage {
    timeout: Duration,
}

impl WriteTimeoutStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Decodes frame payloads into messages through the transcoder.
pub struct MessageDecoder {
    transcoder: Arc<dyn Transcoder>,
}

impl MessageDecoder {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }
}

/// Encodes messages into frame payloads through the transcoder.
pub struct MessageEncoder {
    transcoder: Arc<dyn Transcoder>,
}

impl MessageEncoder {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }
}

/// Observes decoded traffic in both directions without altering it.
#[derive(Debug, Default)]
pub struct MessageLogger;

/// One stage of the handler pipeline.
pub enum Stage {
    WriteTimeout(WriteTimeoutStage),
    LengthFrameDecoder(FrameDecoder),
    LengthFrameEncoder(FrameEncoder),
    MessageDecoder(MessageDecoder),
    MessageEncoder(MessageEncoder),
    MessageLogger(MessageLogger),
    SessionDispatch(SessionDispatcher),
    Placeholder,
}

impl Stage {
    /// The kind tag, derived from the variant.
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::WriteTimeout(_) => StageKind::WriteTimeout,
            Stage::LengthFrameDecoder(_) => StageKind::LengthFrameDecoder,
            Stage::LengthFrameEncoder(_) => StageKind::LengthFrameEncoder,
            Stage::MessageDecoder(_) => StageKind::MessageDecoder,
            Stage::MessageEncoder(_) => StageKind::MessageEncoder,
            Stage::MessageLogger(_) => StageKind::MessageLogger,
            Stage::SessionDispatch(_) => StageKind::SessionDispatch,
            Stage::Placeholder => StageKind::Placeholder,
        }
    }

    /// Apply this stage to inbound items. `Err` is connection-fatal.
    fn read(&mut self, items: Vec<Flow>) -> Result<Vec<Flow>, SessionError> {
        match self {
            Stage::Placeholder => {
                if !items.is_empty() {
                    trace!("placeholder stage discarding traffic received before assembly");
                }
                Ok(Vec::new())
            }
            Stage::LengthFrameDecoder(decoder) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Flow::Raw(bytes) => {
                            for payload in decoder.decode(&bytes)? {
                                out.push(Flow::Frame(payload));
                            }
                        }
                        other => out.push(other),
                    }
                }
                Ok(out)
            }
            Stage::MessageDecoder(decoder) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Flow::Frame(payload) => match decoder.transcoder.decode(&payload) {
                            Ok(message) => out.push(Flow::Message(message)),
                            Err(error) => out.push(Flow::Error(error.into())),
                        },
                        other => out.push(other),
                    }
                }
                Ok(out)
            }
            Stage::MessageLogger(_) => {
                for item in &items {
                    if let Flow::Message(message) = item {
                        debug!(target: "boxconn::traffic", direction = "inbound", ?message);
                    }
                }
                Ok(items)
            }
            Stage::SessionDispatch(dispatcher) => {
                for item in items {
                    match item {
                        Flow::Message(message) => {
                            dispatcher.dispatch(SessionEvent::InboundMessage(message));
                        }
                        Flow::Error(error) => {
                            dispatcher.dispatch(SessionEvent::ExceptionCaught(error));
                        }
                        Flow::Raw(_) | Flow::Frame(_) => {
                            trace!("dispatch stage ignoring undecoded item");
                        }
                    }
                }
                Ok(Vec::new())
            }
            // Outbound-only and configuration stages pass inbound traffic
            // through untouched.
            Stage::WriteTimeout(_) | Stage::LengthFrameEncoder(_) | Stage::MessageEncoder(_) => {
                Ok(items)
            }
        }
    }

    /// Apply this stage to outbound items. `Err` aborts this message only
    /// unless the driver classifies it as fatal.
    fn write(&mut self, items: Vec<Flow>) -> Result<Vec<Flow>, SessionError> {
        match self {
            Stage::MessageLogger(_) => {
                for item in &items {
                    if let Flow::Message(message) = item {
                        debug!(target: "boxconn::traffic", direction = "outbound", ?message);
                    }
                }
                Ok(items)
            }
            Stage::MessageEncoder(encoder) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Flow::Message(message) => {
                            out.push(Flow::Frame(encoder.transcoder.encode(&message)?));
                        }
                        other => out.push(other),
                    }
                }
                Ok(out)
            }
            Stage::LengthFrameEncoder(encoder) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Flow::Frame(payload) => out.push(Flow::Raw(encoder.encode(&payload)?)),
                        other => out.push(other),
                    }
                }
                Ok(out)
            }
            // Inbound-only stages, the placeholder and the timeout carrier
            // pass outbound traffic through untouched.
            Stage::WriteTimeout(_)
            | Stage::LengthFrameDecoder(_)
            | Stage::MessageDecoder(_)
            | Stage::SessionDispatch(_)
            | Stage::Placeholder => Ok(items),
        }
    }
}

/// Creates the stages installed into each connection's pipeline.
///
/// Injectable at engine construction so every stage can be substituted
/// for composition and testing.
pub trait StageProvider: Send + Sync {
    fn write_timeout(&self, timeout: Duration) -> Stage;
    fn length_frame_decoder(&self, max_frame_size: usize) -> Stage;
    fn length_frame_encoder(&self) -> Stage;
    fn message_decoder(&self, transcoder: Arc<dyn Transcoder>) -> Stage;
    fn message_encoder(&self, transcoder: Arc<dyn Transcoder>) -> Stage;
    fn message_logger(&self) -> Stage;
    fn session_dispatch(&self, events: mpsc::UnboundedSender<SessionEvent>) -> Stage;
}

/// Stage provider used unless the engine is built with a substitute.
#[derive(Debug, Default)]
pub struct DefaultStageProvider;

impl StageProvider for DefaultStageProvider {
    fn write_timeout(&self, timeout: Duration) -> Stage {
        Stage::WriteTimeout(WriteTimeoutStage::new(timeout))
    }

    fn length_frame_decoder(&self, max_frame_size: usize) -> Stage {
        Stage::LengthFrameDecoder(FrameDecoder::new(max_frame_size))
    }

    fn length_frame_encoder(&self) -> Stage {
        Stage::LengthFrameEncoder(FrameEncoder)
    }

    fn message_decoder(&self, transcoder: Arc<dyn Transcoder>) -> Stage {
        Stage::MessageDecoder(MessageDecoder::new(transcoder))
    }

    fn message_encoder(&self, transcoder: Arc<dyn Transcoder>) -> Stage {
        Stage::MessageEncoder(MessageEncoder::new(transcoder))
    }

    fn message_logger(&self) -> Stage {
        Stage::MessageLogger(MessageLogger)
    }

    fn session_dispatch(&self, events: mpsc::UnboundedSender<SessionEvent>) -> Stage {
        Stage::SessionDispatch(SessionDispatcher::new(events))
    }
}

/// The ordered stage chain for one connection.
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// A fresh pipeline containing only the placeholder stage.
    pub fn new() -> Self {
        Self {
            stages: vec![Stage::Placeholder],
        }
    }

    /// Install the protocol stages in their fixed order, then remove the
    /// placeholder. The write-timeout stage is appended only when the
    /// configuration carries a bound; otherwise it is absent entirely.
    pub fn assemble(
        &mut self,
        provider: &dyn StageProvider,
        config: &SessionConfig,
        transcoder: Arc<dyn Transcoder>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) {
        if let Some(timeout) = config.write_timeout {
            self.add_last(provider.write_timeout(timeout));
        }
        self.add_last(provider.length_frame_decoder(config.max_frame_size));
        self.add_last(provider.length_frame_encoder());
        self.add_last(provider.message_decoder(transcoder.clone()));
        self.add_last(provider.message_encoder(transcoder));
        self.add_last(provider.message_logger());
        self.add_last(provider.session_dispatch(events));
        self.remove(StageKind::Placeholder);
    }

    /// Append a stage at the tail of the chain.
    pub fn add_last(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Remove every stage of the given kind.
    pub fn remove(&mut self, kind: StageKind) {
        self.stages.retain(|stage| stage.kind() != kind);
    }

    /// The kinds of the installed stages, in order.
    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// The configured write bound, when the stage is installed.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::WriteTimeout(stage) => Some(stage.timeout()),
            _ => None,
        })
    }

    /// True when the frame decoder holds bytes of an incomplete frame.
    pub fn has_partial_input(&self) -> bool {
        self.stages.iter().any(|stage| match stage {
            Stage::LengthFrameDecoder(decoder) => decoder.has_partial_frame(),
            _ => false,
        })
    }

    /// Run inbound bytes through every stage in order. Decoded messages
    /// and per-message errors end at the dispatch stage; `Err` is a
    /// connection-fatal failure.
    pub(crate) fn read(&mut self, chunk: Bytes) -> Result<(), SessionError> {
        let mut items = vec![Flow::Raw(chunk)];
        for stage in &mut self.stages {
            items = stage.read(items)?;
        }
        Ok(())
    }

    /// Run one outbound message through every stage in mirrored order,
    /// yielding the wire bytes to write.
    pub(crate) fn write(&mut self, message: Message) -> Result<Vec<Bytes>, SessionError> {
        let mut items = vec![Flow::Message(message)];
        for stage in self.stages.iter_mut().rev() {
            items = stage.write(items)?;
        }
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Flow::Raw(bytes) => Some(bytes),
                _ => None,
            })
            .collect())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_MAX_FRAME_SIZE;
    use crate::msg::{Admin, AdminCommand, HeartBeat};
    use crate::transcode::BoxTranscoder;
    use bytes::{BufMut, BytesMut};

    fn assembled(config: &SessionConfig) -> (Pipeline, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline::new();
        pipeline.assemble(
            &DefaultStageProvider,
            config,
            Arc::new(BoxTranscoder),
            tx,
        );
        (pipeline, rx)
    }

    fn framed(message: &Message) -> Bytes {
        let payload = crate::transcode::Transcoder::encode(&BoxTranscoder, message).unwrap();
        let mut wire = BytesMut::new();
        wire.put_u32(payload.len() as u32);
        wire.put_slice(&payload);
        wire.freeze()
    }

    #[test]
    fn new_pipeline_holds_only_the_placeholder() {
        assert_eq!(Pipeline::new().kinds(), vec![StageKind::Placeholder]);
    }

    #[test]
    fn assembly_order_with_write_timeout() {
        let config = SessionConfig::new("gw", 1, "box")
            .with_write_timeout(Duration::from_millis(1000));
        let (pipeline, _rx) = assembled(&config);

        assert_eq!(
            pipeline.kinds(),
            vec![
                StageKind::WriteTimeout,
                StageKind::LengthFrameDecoder,
                StageKind::LengthFrameEncoder,
                StageKind::MessageDecoder,
                StageKind::MessageEncoder,
                StageKind::MessageLogger,
                StageKind::SessionDispatch,
            ]
        );
        assert_eq!(pipeline.write_timeout(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn assembly_without_write_timeout_omits_the_stage_entirely() {
        let (pipeline, _rx) = assembled(&SessionConfig::new("gw", 1, "box"));

        let kinds = pipeline.kinds();
        assert_eq!(kinds.len(), 6);
        assert!(!kinds.contains(&StageKind::WriteTimeout));
        assert_eq!(pipeline.write_timeout(), None);
    }

    #[test]
    fn placeholder_swallows_premature_bytes() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.read(Bytes::from_static(b"early junk")).is_ok());
    }

    #[test]
    fn inbound_frame_reaches_dispatch() {
        let (mut pipeline, mut rx) = assembled(&SessionConfig::new("gw", 1, "box"));
        let message = Message::HeartBeat(HeartBeat::new(2));

        pipeline.read(framed(&message)).unwrap();

        match rx.try_recv().unwrap() {
            SessionEvent::InboundMessage(received) => assert_eq!(received, message),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn split_inbound_frame_is_reassembled() {
        let (mut pipeline, mut rx) = assembled(&SessionConfig::new("gw", 1, "box"));
        let message = Message::Admin(Admin::new(AdminCommand::Suspend, Some("box".into())));
        let wire = framed(&message);

        pipeline.read(wire.slice(..5)).unwrap();
        assert!(rx.try_recv().is_err());
        assert!(pipeline.has_partial_input());

        pipeline.read(wire.slice(5..)).unwrap();
        match rx.try_recv().unwrap() {
            SessionEvent::InboundMessage(received) => assert_eq!(received, message),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_failure_is_dispatched_and_later_frames_survive() {
        let (mut pipeline, mut rx) = assembled(&SessionConfig::new("gw", 1, "box"));

        // A frame whose payload names an unsupported message type.
        let mut wire = BytesMut::new();
        wire.put_u32(4);
        wire.put_i32(crate::msg::MessageType::Sms.value());
        pipeline.read(wire.freeze()).unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::ExceptionCaught(SessionError::Decode(_))
        ));

        let message = Message::HeartBeat(HeartBeat::default());
        pipeline.read(framed(&message)).unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::InboundMessage(_)
        ));
    }

    #[test]
    fn oversized_frame_is_fatal() {
        let config = SessionConfig::new("gw", 1, "box").with_max_frame_size(8);
        let (mut pipeline, _rx) = assembled(&config);

        let mut wire = BytesMut::new();
        wire.put_u32(1024);
        let result = pipeline.read(wire.freeze());
        assert!(matches!(result, Err(SessionError::Frame(_))));
    }

    #[test]
    fn outbound_message_is_encoded_then_framed() {
        let (mut pipeline, _rx) = assembled(&SessionConfig::new("gw", 1, "box"));
        let message = Message::Admin(Admin::new(AdminCommand::Identify, Some("id".into())));

        let chunks = pipeline.write(message.clone()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], framed(&message));
    }

    #[test]
    fn max_frame_size_default_matches_codec() {
        let config = SessionConfig::new("gw", 1, "box");
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }
}
