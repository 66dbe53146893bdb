use std::{path::PathBuf, time::Duration};

use crate::operation::OperationKind;

/// Why a dispatched operation did not deliver.
///
/// Every variant is a final answer: nothing in this crate retries.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The background session context was never launched.
    #[error("session not started")]
    NotStarted,

    /// The session is not paired or has lost its connection.
    #[error("session not connected, scan the pairing QR code first")]
    NotConnected,

    /// The raw phone string could not be turned into a recipient address.
    #[error("invalid phone number: {reason}")]
    InvalidRecipient { reason: String },

    /// The staged file backing a media operation is gone.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The protocol client could not construct a message.
    #[error("failed to build {kind} message: {reason}")]
    BuildFailed { kind: OperationKind, reason: String },

    /// The message was built but transmission failed.
    #[error("failed to send {kind} message: {reason}")]
    SendFailed { kind: OperationKind, reason: String },

    /// No result arrived within the operation's budget.
    #[error("{kind} sending timeout after {}s", budget.as_secs_f32())]
    Timeout {
        kind: OperationKind,
        budget: Duration,
    },

    /// The background context dropped the operation (panic or shutdown).
    #[error("{kind} operation aborted: {reason}")]
    Aborted { kind: OperationKind, reason: String },
}

impl DispatchError {
    #[must_use]
    pub fn invalid_recipient(reason: impl Into<String>) -> Self {
        Self::InvalidRecipient {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn aborted(kind: OperationKind, reason: impl Into<String>) -> Self {
        Self::Aborted {
            kind,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable tag for the failure class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::NotConnected => "not_connected",
            Self::InvalidRecipient { .. } => "invalid_recipient",
            Self::FileNotFound { .. } => "file_not_found",
            Self::BuildFailed { .. } => "build_failed",
            Self::SendFailed { .. } => "send_failed",
            Self::Timeout { .. } => "timeout",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Supervisor lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session supervisor already started")]
    AlreadyStarted,

    #[error("failed to spawn session thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
