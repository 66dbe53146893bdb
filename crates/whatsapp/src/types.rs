//! JSON frames exchanged with the sidecar over its WebSocket.

use {
    serde::{Deserialize, Serialize},
    wabridge_session::{BuiltMessage, InboundMessage, SessionEvent},
};

/// Frames sent from the bridge to the sidecar.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Login {
        account_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        auth_dir: Option<String>,
    },
    Logout {
        account_id: String,
    },
    Send {
        request_id: String,
        account_id: String,
        to: String,
        message: BuiltMessage,
    },
}

/// Frames received from the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    Qr {
        account_id: String,
        qr: String,
    },
    Connected {
        account_id: String,
        #[serde(default)]
        phone_number: Option<String>,
    },
    Disconnected {
        account_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    LoggedOut {
        account_id: String,
    },
    InboundMessage {
        account_id: String,
        chat_jid: String,
        sender_jid: String,
        #[serde(default)]
        from_me: bool,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        extended_text: Option<String>,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        account_id: Option<String>,
        error: String,
    },
}

impl SidecarMessage {
    /// Account the frame belongs to, when it names one.
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::Qr { account_id, .. }
            | Self::Connected { account_id, .. }
            | Self::Disconnected { account_id, .. }
            | Self::LoggedOut { account_id }
            | Self::InboundMessage { account_id, .. } => Some(account_id),
            Self::Error { account_id, .. } => account_id.as_deref(),
            Self::SendResult { .. } => None,
        }
    }

    /// Lifecycle events carried by this frame. Send results and errors carry
    /// none.
    pub fn into_events(self) -> Vec<SessionEvent> {
        match self {
            Self::Qr { qr, .. } => vec![SessionEvent::PairingCode { code: qr }],
            Self::Connected { phone_number, .. } => phone_number
                .map(|user| SessionEvent::PairSuccess { user })
                .into_iter()
                .chain([SessionEvent::Connected])
                .collect(),
            Self::Disconnected { reason, .. } => vec![SessionEvent::Disconnected { reason }],
            Self::LoggedOut { .. } => vec![SessionEvent::LoggedOut],
            Self::InboundMessage {
                chat_jid,
                sender_jid,
                from_me,
                body,
                extended_text,
                ..
            } => vec![SessionEvent::InboundMessage(InboundMessage {
                chat: chat_jid,
                sender: sender_jid,
                is_from_me: from_me,
                conversation: body,
                extended_text,
            })],
            Self::SendResult { .. } | Self::Error { .. } => Vec::new(),
        }
    }
}
