//! Outbound operations and their outcomes.

use std::{fmt, path::PathBuf, time::Duration};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
};

use crate::{error::DispatchError, media::MediaKind};

/// Default budget for text sends.
pub const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

/// What an operation does, used for timeouts, logging and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Text,
    Image,
    Document,
    Audio,
    Video,
    Sticker,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Sticker => "sticker",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<MediaKind> for OperationKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => Self::Image,
            MediaKind::Document => Self::Document,
            MediaKind::Audio => Self::Audio,
            MediaKind::Video => Self::Video,
            MediaKind::Sticker => Self::Sticker,
        }
    }
}

/// One way of turning plain text into a protocol-native message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStrategy {
    /// Reply-style extended text built by the client.
    ReplyMessage,
    /// Bare conversation message.
    DirectMessage,
}

impl TextStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReplyMessage => "reply_message",
            Self::DirectMessage => "direct_message",
        }
    }
}

impl fmt::Display for TextStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text construction strategies, tried in order until one yields a message.
/// Only a failed or empty build moves on; once a send fails the error is final.
pub const TEXT_STRATEGIES: &[TextStrategy] =
    &[TextStrategy::ReplyMessage, TextStrategy::DirectMessage];

/// Media payload backed by a staged file owned by the caller.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub caption: Option<String>,
    /// Name shown to the recipient; defaults to the staged file's basename.
    pub file_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Text { text: String },
    Media(MediaPayload),
}

/// A single send request. Consumed once by dispatch.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Raw phone string as supplied by the caller.
    pub recipient: String,
    pub payload: Payload,
}

impl Operation {
    pub fn text(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            payload: Payload::Text { text: text.into() },
        }
    }

    pub fn media(recipient: impl Into<String>, kind: MediaKind, path: impl Into<PathBuf>) -> Self {
        Self {
            recipient: recipient.into(),
            payload: Payload::Media(MediaPayload {
                kind,
                path: path.into(),
                caption: None,
                file_name: None,
            }),
        }
    }

    /// Attach a caption. Empty captions and text operations are left alone.
    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        let caption = caption.into();
        if let Payload::Media(media) = &mut self.payload
            && !caption.is_empty()
        {
            media.caption = Some(caption);
        }
        self
    }

    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        if let Payload::Media(media) = &mut self.payload
            && !file_name.is_empty()
        {
            media.file_name = Some(file_name);
        }
        self
    }

    pub fn kind(&self) -> OperationKind {
        match &self.payload {
            Payload::Text { .. } => OperationKind::Text,
            Payload::Media(media) => media.kind.into(),
        }
    }
}

/// Media metadata echoed back on success.
#[derive(Debug, Clone, Serialize)]
pub struct MediaEcho {
    pub path: PathBuf,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub mimetype: String,
}

/// Successful delivery report.
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    /// Fully-qualified recipient address.
    pub recipient: String,
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaEcho>,
    /// Text construction strategy that produced the sent message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<TextStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of exactly one dispatched operation.
pub type Outcome = Result<Delivery, DispatchError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn primary_strategy_comes_first() {
        assert_eq!(TEXT_STRATEGIES.first(), Some(&TextStrategy::ReplyMessage));
        assert_eq!(TEXT_STRATEGIES.len(), 2);
    }

    #[test]
    fn empty_caption_is_dropped() {
        let op = Operation::media("0812", MediaKind::Image, "/tmp/a.png").with_caption("");
        let Payload::Media(media) = op.payload else {
            panic!("expected media payload");
        };
        assert!(media.caption.is_none());
    }

    #[test]
    fn caption_on_text_is_ignored() {
        let op = Operation::text("0812", "hi").with_caption("ignored");
        assert_eq!(op.kind(), OperationKind::Text);
        assert!(matches!(op.payload, Payload::Text { ref text } if text == "hi"));
    }

    #[test]
    fn media_kind_maps_to_operation_kind() {
        let op = Operation::media("0812", MediaKind::Sticker, "/tmp/s.webp");
        assert_eq!(op.kind(), OperationKind::Sticker);
        assert_eq!(op.kind().to_string(), "sticker");
    }
}
