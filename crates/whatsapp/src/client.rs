//! [`ProtocolClient`] backed by the WhatsApp sidecar.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use {
    anyhow::{Context, Result, anyhow, bail},
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    futures::{SinkExt, StreamExt},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::tungstenite::Message,
    tracing::{debug, info, warn},
    uuid::Uuid,
    wabridge_session::{
        BuiltMessage, EventSender, MediaRequest, ProtocolClient, RecipientAddress, SendReceipt,
        SessionEvent, TextStrategy,
    },
};

use crate::{
    process::{SidecarConfig, start_sidecar},
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarStream, connect_with_retry},
    types::{GatewayMessage, SidecarMessage},
};

const DEFAULT_CONNECT_ATTEMPTS: u32 = 20;
/// Matches the longest default dispatch budget (video).
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct SidecarClientConfig {
    pub account_id: String,
    pub port: u16,
    pub auth_dir: Option<PathBuf>,
    pub connect_attempts: u32,
    /// How long a send waits for its `send_result` before giving up.
    pub send_timeout: Duration,
    /// Launch the sidecar ourselves instead of expecting one on `port`.
    pub launch: Option<SidecarConfig>,
}

impl Default for SidecarClientConfig {
    fn default() -> Self {
        Self {
            account_id: "default".into(),
            port: DEFAULT_SIDECAR_PORT,
            auth_dir: None,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            launch: None,
        }
    }
}

#[derive(Debug)]
struct SendResult {
    success: bool,
    message_id: Option<String>,
    error: Option<String>,
}

type Pending = HashMap<String, oneshot::Sender<SendResult>>;

pub struct SidecarClient {
    config: SidecarClientConfig,
    outbox: Mutex<Option<mpsc::UnboundedSender<GatewayMessage>>>,
    pending: Mutex<Pending>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes its waiter from the pending map when the send finishes, times out
/// or is dropped.
struct PendingSend<'a> {
    pending: &'a Mutex<Pending>,
    request_id: String,
}

impl Drop for PendingSend<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.request_id);
    }
}

impl SidecarClient {
    pub fn new(config: SidecarClientConfig) -> Self {
        Self {
            config,
            outbox: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SidecarClientConfig {
        &self.config
    }

    /// Sends still waiting for a `send_result`.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }

    fn enqueue(&self, frame: GatewayMessage) -> Result<()> {
        let outbox = lock(&self.outbox);
        let Some(tx) = outbox.as_ref() else {
            bail!("sidecar connection is not open");
        };
        tx.send(frame)
            .map_err(|_| anyhow!("sidecar connection is closing"))
    }

    fn handle_frame(&self, text: &str, events: &EventSender) {
        let message: SidecarMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "unrecognised sidecar frame");
                return;
            },
        };

        if let Some(account) = message.account_id()
            && account != self.config.account_id
        {
            debug!(account, "ignoring frame for another account");
            return;
        }

        match message {
            SidecarMessage::SendResult {
                request_id,
                success,
                message_id,
                error,
            } => {
                let Some(waiter) = lock(&self.pending).remove(&request_id) else {
                    debug!(request_id, "send result with no waiter");
                    return;
                };
                // The waiter may have given up already.
                let _ = waiter.send(SendResult {
                    success,
                    message_id,
                    error,
                });
            },
            SidecarMessage::Error { error, .. } => warn!(error, "sidecar reported an error"),
            other => {
                for event in other.into_events() {
                    if events.send(event).is_err() {
                        return;
                    }
                }
            },
        }
    }

    async fn run(&self, stream: SidecarStream, events: &EventSender) -> Result<()> {
        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(GatewayMessage::Login {
            account_id: self.config.account_id.clone(),
            auth_dir: self
                .config
                .auth_dir
                .as_ref()
                .map(|dir| dir.display().to_string()),
        })
        .map_err(|_| anyhow!("sidecar outbox closed"))?;
        *lock(&self.outbox) = Some(tx);

        let writer = async {
            while let Some(frame) = rx.recv().await {
                let json = serde_json::to_string(&frame)?;
                sink.send(Message::text(json)).await?;
            }
            Ok::<_, anyhow::Error>(())
        };

        let reader = async {
            while let Some(message) = source.next().await {
                match message.context("sidecar socket error")? {
                    Message::Text(text) => self.handle_frame(text.as_str(), events),
                    Message::Close(frame) => {
                        info!(?frame, "sidecar closed the connection");
                        break;
                    },
                    _ => {},
                }
            }
            Ok::<_, anyhow::Error>(())
        };

        tokio::select! {
            result = reader => result,
            result = writer => result,
        }
    }

    /// Drop the outbox and fail every in-flight send.
    fn close(&self) {
        lock(&self.outbox).take();
        let abandoned: Vec<_> = lock(&self.pending).drain().collect();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "dropping in-flight sends");
        }
    }
}

#[async_trait]
impl ProtocolClient for SidecarClient {
    async fn connect(&self, events: EventSender) -> Result<()> {
        let mut process = match &self.config.launch {
            Some(launch) => Some(start_sidecar(launch).await?),
            None => None,
        };

        let result = match connect_with_retry(self.config.port, self.config.connect_attempts).await
        {
            Ok(stream) => self.run(stream, &events).await,
            Err(e) => Err(e),
        };
        self.close();
        let _ = events.send(SessionEvent::Disconnected {
            reason: result.as_ref().err().map(|e| format!("{e:#}")),
        });

        if let Some(process) = process.as_mut() {
            process.stop().await;
        }
        result
    }

    async fn build_text(&self, strategy: TextStrategy, text: &str) -> Result<Option<BuiltMessage>> {
        let text = text.to_string();
        Ok(match strategy {
            // Extended text needs a body to carry context info.
            TextStrategy::ReplyMessage if text.trim().is_empty() => None,
            TextStrategy::ReplyMessage => Some(BuiltMessage::ExtendedText { text }),
            TextStrategy::DirectMessage => Some(BuiltMessage::Conversation { text }),
        })
    }

    async fn build_media(&self, request: &MediaRequest) -> Result<Option<BuiltMessage>> {
        let bytes = tokio::fs::read(&request.path)
            .await
            .with_context(|| format!("failed to read {}", request.path.display()))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(BuiltMessage::Media {
            kind: request.kind,
            mimetype: request.mimetype.clone(),
            file_name: request.file_name.clone(),
            caption: request.caption.clone(),
            data: STANDARD.encode(bytes),
        }))
    }

    async fn send_message(
        &self,
        to: &RecipientAddress,
        message: BuiltMessage,
    ) -> Result<SendReceipt> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id.clone(), tx);
        let _guard = PendingSend {
            pending: &self.pending,
            request_id: request_id.clone(),
        };

        self.enqueue(GatewayMessage::Send {
            request_id: request_id.clone(),
            account_id: self.config.account_id.clone(),
            to: to.to_string(),
            message,
        })?;

        let result = tokio::time::timeout(self.config.send_timeout, rx)
            .await
            .map_err(|_| {
                anyhow!(
                    "sidecar did not answer within {:?}",
                    self.config.send_timeout
                )
            })?
            .map_err(|_| anyhow!("sidecar connection closed before the send completed"))?;
        if !result.success {
            bail!(
                "{}",
                result
                    .error
                    .unwrap_or_else(|| "sidecar rejected the message".into())
            );
        }
        Ok(SendReceipt {
            message_id: result.message_id,
        })
    }
}
