//! Seam to the chat-protocol client.

use std::path::PathBuf;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use crate::{address::RecipientAddress, media::MediaKind, operation::TextStrategy};

/// Protocol-native message produced by a build step and consumed by a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuiltMessage {
    Conversation {
        text: String,
    },
    ExtendedText {
        text: String,
    },
    Media {
        kind: MediaKind,
        mimetype: String,
        file_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        /// Base64 file contents.
        data: String,
    },
}

/// Inputs for building a media message from a staged file.
#[derive(Debug, Clone)]
pub struct MediaRequest {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub mimetype: String,
    pub file_name: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Message received on the session, surfaced for logging only.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub chat: String,
    pub sender: String,
    pub is_from_me: bool,
    pub conversation: Option<String>,
    pub extended_text: Option<String>,
}

impl InboundMessage {
    /// Best-effort display text: plain conversation first, then extended text.
    pub fn display_text(&self) -> Option<&str> {
        [&self.conversation, &self.extended_text]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|text| !text.is_empty())
    }
}

/// Lifecycle events raised by a protocol client.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A pairing code (QR payload) is waiting to be scanned.
    PairingCode { code: String },
    /// Pairing finished; `user` is the session's own identity.
    PairSuccess { user: String },
    Connected,
    Disconnected { reason: Option<String> },
    LoggedOut,
    InboundMessage(InboundMessage),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// One logged-in chat session.
///
/// All methods run on the session's background runtime. Implementations
/// must tolerate several operations being in flight at once.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Connect, pair if needed, and raise lifecycle events until the session
    /// ends. Returning means the session is gone.
    async fn connect(&self, events: EventSender) -> anyhow::Result<()>;

    /// Build a text message with the given strategy. `Ok(None)` means the
    /// strategy produced nothing usable.
    async fn build_text(
        &self,
        strategy: TextStrategy,
        text: &str,
    ) -> anyhow::Result<Option<BuiltMessage>>;

    async fn build_media(&self, request: &MediaRequest) -> anyhow::Result<Option<BuiltMessage>>;

    async fn send_message(
        &self,
        to: &RecipientAddress,
        message: BuiltMessage,
    ) -> anyhow::Result<SendReceipt>;
}
