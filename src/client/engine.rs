// ABOUTME: Client session engine owning the I/O worker pool and the injectable collaborators
// ABOUTME: Orchestrates connect, pipeline assembly and the identify handshake per session

use crate::client::config::SessionConfig;
use crate::client::driver::{Driver, write_frames};
use crate::client::error::{SessionError, SessionResult};
use crate::client::ClientSession;
use crate::msg::{Admin, AdminCommand, Message};
use crate::pipeline::{DefaultStageProvider, Pipeline, StageProvider};
use crate::session::{SessionHandler, SessionState, StateCell, spawn_callback_executor};
use crate::transcode::{BoxTranscoder, Transcoder};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::{Builder as RuntimeBuilder, Handle, Runtime};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The I/O worker pool backing an engine instance: either a runtime the
/// engine owns, or a handle into one the embedding application owns.
enum IoPool {
    Owned(Runtime),
    Shared(Handle),
}

impl IoPool {
    fn handle(&self) -> &Handle {
        match self {
            IoPool::Owned(runtime) => runtime.handle(),
            IoPool::Shared(handle) => handle,
        }
    }
}

/// Client session engine for the bearerbox box-connection protocol.
///
/// One engine manages one logical session at a time: `identify` rejects
/// an overlapping handshake while an earlier session is still live. The
/// engine may open successive sessions sequentially; the I/O pool,
/// transcoder and stage provider are created once per engine and shared
/// by every connection it opens.
///
/// # Example
///
/// ```rust,no_run
/// use boxconn::client::{BoxClient, SessionConfig};
/// use boxconn::msg::{Admin, AdminCommand, Message};
/// use boxconn::session::SessionHandler;
/// use std::sync::Arc;
///
/// struct Printer;
///
/// impl SessionHandler for Printer {
///     fn on_inbound_message(&self, message: boxconn::msg::Message) {
///         println!("inbound: {message:?}");
///     }
///     fn on_exception_caught(&self, error: boxconn::client::SessionError) {
///         eprintln!("error: {error}");
///     }
///     fn on_connection_closed(&self) {
///         println!("connection closed");
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = BoxClient::builder()
///     .handle(tokio::runtime::Handle::current())
///     .build()?;
///
/// let config = SessionConfig::new("localhost", 13001, "sms-box-1");
/// let session = client.identify(&config, Arc::new(Printer)).await?;
///
/// session.send(Message::Admin(Admin::new(AdminCommand::Suspend, None)))?;
/// session.close();
/// # Ok(())
/// # }
/// ```
pub struct BoxClient {
    io: IoPool,
    transcoder: Arc<dyn Transcoder>,
    stage_provider: Arc<dyn StageProvider>,
    /// State cell of the most recently opened session, used to reject
    /// overlapping handshakes.
    active: Mutex<Option<Arc<StateCell>>>,
}

impl BoxClient {
    /// Engine with its own multi-threaded I/O pool of `io_threads` workers.
    pub fn new(io_threads: usize) -> io::Result<Self> {
        Self::builder().io_threads(io_threads).build()
    }

    /// Builder for substituting the pool, transcoder or stage provider.
    pub fn builder() -> BoxClientBuilder {
        BoxClientBuilder::default()
    }

    /// Handle into the engine's I/O pool, for embedding and tests.
    pub fn handle(&self) -> &Handle {
        self.io.handle()
    }

    /// Open a connection, assemble the pipeline and perform the
    /// identification handshake.
    ///
    /// Exactly one Admin frame with `AdminCommand::Identify` and the
    /// configured client id is written before any other outbound frame.
    /// The handshake succeeds once that write completes with the
    /// connection still open; a premature closure fails the call with
    /// [`SessionError::HandshakeFailed`] after the engine has closed the
    /// connection. While an earlier session opened by this engine has
    /// neither failed nor closed, the call fails with
    /// [`SessionError::SessionActive`] instead of opening a second
    /// connection. On success all further inbound traffic and errors
    /// reach the given handler on a dedicated callback thread.
    pub async fn identify(
        &self,
        config: &SessionConfig,
        handler: Arc<dyn SessionHandler>,
    ) -> SessionResult<ClientSession> {
        let state = self.claim_session_slot()?;
        let task = establish(
            config.clone(),
            self.transcoder.clone(),
            self.stage_provider.clone(),
            handler,
            state.clone(),
        );
        // Run the whole attempt on the engine's pool so connection I/O
        // never depends on the caller's executor.
        match self.io.handle().spawn(task).await {
            Ok(result) => result,
            Err(join_error) => {
                // An aborted attempt must still release the session slot.
                state.set(SessionState::Failed);
                Err(SessionError::Connect(io::Error::other(join_error)))
            }
        }
    }

    /// Reserve the engine's single session slot for a new attempt.
    ///
    /// A prior session blocks the slot until its state cell reaches
    /// `Failed` or `Closed`; a failed attempt releases the slot the same
    /// way, so the engine can be reused sequentially.
    fn claim_session_slot(&self) -> SessionResult<Arc<StateCell>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prior) = active.as_ref() {
            if !matches!(prior.get(), SessionState::Failed | SessionState::Closed) {
                return Err(SessionError::SessionActive);
            }
        }
        let state = Arc::new(StateCell::new(SessionState::Idle));
        *active = Some(state.clone());
        Ok(state)
    }

    /// Release the engine's I/O worker pool.
    ///
    /// Waits up to a short grace period for in-flight tasks, then drops
    /// the pool. Consumes the engine, so it can only happen once; call it
    /// from outside the pool's own threads. A shared handle supplied at
    /// construction is left running, since its runtime belongs to the
    /// embedding application.
    pub fn destroy(self) {
        match self.io {
            IoPool::Owned(runtime) => {
                debug!("shutting down engine I/O pool");
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
            }
            IoPool::Shared(_) => {
                debug!("engine destroyed, shared runtime left running");
            }
        }
    }
}

/// Builder injecting the engine's collaborators.
///
/// Every collaborator has a production default: an owned two-worker
/// runtime, the reference [`BoxTranscoder`] and the
/// [`DefaultStageProvider`].
#[derive(Default)]
pub struct BoxClientBuilder {
    io_threads: Option<usize>,
    handle: Option<Handle>,
    transcoder: Option<Arc<dyn Transcoder>>,
    stage_provider: Option<Arc<dyn StageProvider>>,
}

impl BoxClientBuilder {
    /// Worker count for an owned I/O pool. Ignored when a shared handle
    /// is supplied.
    pub fn io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = Some(io_threads);
        self
    }

    /// Run connection I/O on an existing runtime instead of an owned pool.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn stage_provider(mut self, stage_provider: Arc<dyn StageProvider>) -> Self {
        self.stage_provider = Some(stage_provider);
        self
    }

    pub fn build(self) -> io::Result<BoxClient> {
        let io = match self.handle {
            Some(handle) => IoPool::Shared(handle),
            None => IoPool::Owned(
                RuntimeBuilder::new_multi_thread()
                    .worker_threads(self.io_threads.unwrap_or(2))
                    .thread_name("boxconn-io")
                    .enable_all()
                    .build()?,
            ),
        };
        Ok(BoxClient {
            io,
            transcoder: self
                .transcoder
                .unwrap_or_else(|| Arc::new(BoxTranscoder)),
            stage_provider: self
                .stage_provider
                .unwrap_or_else(|| Arc::new(DefaultStageProvider)),
            active: Mutex::new(None),
        })
    }
}

/// One full handshake attempt, from connect to a live session.
async fn establish(
    config: SessionConfig,
    transcoder: Arc<dyn Transcoder>,
    stage_provider: Arc<dyn StageProvider>,
    handler: Arc<dyn SessionHandler>,
    state: Arc<StateCell>,
) -> SessionResult<ClientSession> {
    state.set(SessionState::Connecting);
    let mut stream = match connect(&config).await {
        Ok(stream) => stream,
        Err(error) => {
            state.set(SessionState::Failed);
            return Err(error);
        }
    };

    state.set(SessionState::Assembling);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut pipeline = Pipeline::new();
    pipeline.assemble(
        stage_provider.as_ref(),
        &config,
        transcoder,
        events_tx.clone(),
    );
    // The executor must exist before the session can be handed out, or
    // the closed callback could never fire.
    if let Err(error) = spawn_callback_executor(handler, events_rx) {
        state.set(SessionState::Failed);
        let _ = stream.shutdown().await;
        return Err(SessionError::Io(error));
    }

    state.set(SessionState::Identifying);
    let identify = Message::Admin(Admin::new(
        AdminCommand::Identify,
        Some(config.client_id.clone()),
    ));
    let chunks = match pipeline.write(identify) {
        Ok(chunks) => chunks,
        Err(error) => {
            state.set(SessionState::Failed);
            let _ = stream.shutdown().await;
            return Err(error);
        }
    };
    if let Err(error) = write_frames(&mut stream, &chunks, pipeline.write_timeout()).await {
        state.set(SessionState::Failed);
        let _ = stream.shutdown().await;
        return Err(match error {
            SessionError::Io(cause) => SessionError::HandshakeFailed(cause),
            other => other,
        });
    }
    info!(client_id = %config.client_id, "identified to bearerbox");

    state.set(SessionState::Established);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let driver = Driver {
        stream,
        pipeline,
        events: events_tx,
        commands: commands_rx,
        heartbeat_interval: config.heartbeat_interval,
        state: state.clone(),
    };
    tokio::spawn(driver.run());

    Ok(ClientSession::new(commands_tx, state))
}

async fn connect(config: &SessionConfig) -> SessionResult<TcpStream> {
    info!(host = %config.host, port = config.port, "connecting to bearerbox");
    let connect = TcpStream::connect((config.host.as_str(), config.port));
    match config.connect_timeout {
        Some(bound) => match time::timeout(bound, connect).await {
            Ok(result) => result.map_err(SessionError::Connect),
            Err(_) => Err(SessionError::ConnectTimeout(bound)),
        },
        None => connect.await.map_err(SessionError::Connect),
    }
}
