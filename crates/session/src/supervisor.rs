//! Session supervisor: owns the protocol client on a background thread.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use {
    futures::FutureExt,
    serde::Serialize,
    tokio::sync::{mpsc, oneshot},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    address::DEFAULT_COUNTRY_CODE,
    bridge,
    client::ProtocolClient,
    error::{DispatchError, Error, Result},
    media::MediaKind,
    operation::{Operation, OperationKind, Outcome, TEXT_TIMEOUT},
    state::{ConnectionState, SessionState},
};

const THREAD_NAME: &str = "wabridge-session";
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Per-kind dispatch budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub text: Duration,
    pub image: Duration,
    pub document: Duration,
    pub audio: Duration,
    pub video: Duration,
    pub sticker: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            text: TEXT_TIMEOUT,
            image: MediaKind::Image.profile().timeout,
            document: MediaKind::Document.profile().timeout,
            audio: MediaKind::Audio.profile().timeout,
            video: MediaKind::Video.profile().timeout,
            sticker: MediaKind::Sticker.profile().timeout,
        }
    }
}

impl Timeouts {
    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Text => self.text,
            OperationKind::Image => self.image,
            OperationKind::Document => self.document,
            OperationKind::Audio => self.audio,
            OperationKind::Video => self.video,
            OperationKind::Sticker => self.sticker,
        }
    }

    /// Largest budget across all kinds.
    pub fn longest(&self) -> Duration {
        [
            self.text,
            self.image,
            self.document,
            self.audio,
            self.video,
            self.sticker,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }

    /// Same budget for every kind. Handy in tests.
    pub fn uniform(budget: Duration) -> Self {
        Self {
            text: budget,
            image: budget,
            document: budget,
            audio: budget,
            video: budget,
            sticker: budget,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Applied to local numbers during recipient normalization.
    pub country_code: String,
    pub timeouts: Timeouts,
    /// How long `stop` waits for the background thread.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            timeouts: Timeouts::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Snapshot returned by [`Supervisor::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub started: bool,
    pub thread_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
}

struct Job {
    operation: Operation,
    reply: oneshot::Sender<Outcome>,
}

struct Running {
    jobs: mpsc::UnboundedSender<Job>,
    thread: Option<JoinHandle<()>>,
}

/// Owner of the process's single protocol session.
///
/// Construct once at startup, share behind an `Arc`, call [`start`] once and
/// [`stop`] at shutdown. [`dispatch`] may be called from any number of tasks
/// concurrently.
///
/// [`start`]: Supervisor::start
/// [`stop`]: Supervisor::stop
/// [`dispatch`]: Supervisor::dispatch
pub struct Supervisor {
    client: Arc<dyn ProtocolClient>,
    state: Arc<SessionState>,
    config: SupervisorConfig,
    cancel: CancellationToken,
    running: Mutex<Option<Running>>,
}

impl Supervisor {
    pub fn new(client: Arc<dyn ProtocolClient>, config: SupervisorConfig) -> Self {
        Self {
            client,
            state: Arc::new(SessionState::new(config.country_code.clone())),
            config,
            cancel: CancellationToken::new(),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Spawn the background session thread and begin connecting.
    ///
    /// Returns immediately; pairing and connection complete asynchronously.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || run_session_thread(client, state, jobs_rx, cancel))
            .map_err(Error::Spawn)?;

        *running = Some(Running {
            jobs: jobs_tx,
            thread: Some(thread),
        });
        info!("session thread started");
        Ok(())
    }

    /// Submit an operation to the session and wait for its outcome.
    ///
    /// Fails fast when the session was never started or is not connected.
    /// Otherwise waits at most the kind's budget; a timed-out operation is
    /// abandoned, not cancelled, and may still complete in the background.
    pub async fn dispatch(&self, operation: Operation) -> Outcome {
        let kind = operation.kind();

        let Some(jobs) = self.job_sender() else {
            return Err(DispatchError::NotStarted);
        };
        if !self.state.is_connected() {
            return Err(DispatchError::NotConnected);
        }

        let (reply, outcome) = oneshot::channel();
        if jobs.send(Job { operation, reply }).is_err() {
            return Err(DispatchError::aborted(kind, "session context is not running"));
        }

        let budget = self.config.timeouts.for_kind(kind);
        match tokio::time::timeout(budget, outcome).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(DispatchError::aborted(
                kind,
                "session context dropped the operation",
            )),
            Err(_) => {
                warn!(%kind, budget_secs = budget.as_secs_f32(), "dispatch timed out");
                Err(DispatchError::Timeout { kind, budget })
            },
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_started(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Whether the background thread is still running.
    pub fn is_alive(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(|r| r.thread.as_ref())
            .is_some_and(|t| !t.is_finished())
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state.connection();
        SessionStatus {
            state,
            connected: state == ConnectionState::Connected,
            started: self.is_started(),
            thread_alive: self.is_alive(),
            identity: self.state.identity(),
            pairing_code: self.state.pairing_code(),
        }
    }

    /// Halt the background context and wait up to the shutdown grace period
    /// for its thread. The session is reported disconnected afterwards either
    /// way.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let thread = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
            .and_then(|r| r.thread.take());

        if let Some(thread) = thread {
            let deadline = Instant::now() + self.config.shutdown_grace;
            while !thread.is_finished() && Instant::now() < deadline {
                tokio::time::sleep(JOIN_POLL_INTERVAL).await;
            }
            if thread.is_finished() {
                if thread.join().is_err() {
                    error!("session thread panicked");
                }
                info!("session stopped");
            } else {
                warn!(
                    grace_secs = self.config.shutdown_grace.as_secs_f32(),
                    "session thread did not stop in time, detaching"
                );
            }
        }

        self.state.set_connection(ConnectionState::Disconnected);
    }

    fn job_sender(&self) -> Option<mpsc::UnboundedSender<Job>> {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|r| r.jobs.clone())
    }
}

fn run_session_thread(
    client: Arc<dyn ProtocolClient>,
    state: Arc<SessionState>,
    jobs: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build session runtime");
            return;
        },
    };

    runtime.block_on(session_loop(client, state, jobs, cancel));
    debug!("session runtime finished");
}

/// Background event loop: connection, lifecycle events and queued jobs.
async fn session_loop(
    client: Arc<dyn ProtocolClient>,
    state: Arc<SessionState>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
) {
    let (events_tx, mut events) = mpsc::unbounded_channel();

    state.set_connection(ConnectionState::Connecting);
    info!("connecting session");
    let mut connection = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect(events_tx).await }
    });
    let mut connection_open = true;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("session loop cancelled");
                break;
            },
            Some(event) = events.recv() => state.apply(event),
            result = &mut connection, if connection_open => {
                connection_open = false;
                match result {
                    Ok(Ok(())) => info!("session connection closed"),
                    Ok(Err(e)) => error!(error = %e, "session connection error"),
                    Err(e) => error!(error = %e, "session connection task failed"),
                }
                // Deliver anything raised right before the connection ended.
                while let Ok(event) = events.try_recv() {
                    state.apply(event);
                }
                state.set_connection(ConnectionState::Disconnected);
            },
            job = jobs.recv() => match job {
                Some(job) => {
                    tokio::spawn(run_job(Arc::clone(&client), Arc::clone(&state), job));
                },
                None => break,
            },
        }
    }

    connection.abort();
}

async fn run_job(client: Arc<dyn ProtocolClient>, state: Arc<SessionState>, job: Job) {
    let Job { operation, reply } = job;
    let kind = operation.kind();

    let outcome = AssertUnwindSafe(bridge::execute(client.as_ref(), &state, operation))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let reason = panic_message(panic.as_ref());
            error!(%kind, reason, "operation panicked");
            Err(DispatchError::aborted(kind, reason))
        });

    if let Err(e) = &outcome {
        debug!(%kind, error = %e, "operation failed");
    }
    if reply.send(outcome).is_err() {
        debug!(%kind, "caller stopped waiting, dropping late outcome");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string())
}
