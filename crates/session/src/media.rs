//! Per-kind media profile table.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Kind of media attachment an operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Document,
    Audio,
    Video,
    Sticker,
}

/// Limits and defaults shared by every operation of one media kind.
#[derive(Debug, Clone, Copy)]
pub struct MediaProfile {
    pub kind: MediaKind,
    /// Default dispatch budget.
    pub timeout: Duration,
    /// Largest accepted upload, in bytes.
    pub max_bytes: u64,
    /// Lowercase extensions accepted for this kind.
    pub extensions: &'static [&'static str],
    /// Whether the kind carries a caption.
    pub captioned: bool,
}

/// Indexed by `MediaKind as usize`.
pub const MEDIA_PROFILES: [MediaProfile; 5] = [
    MediaProfile {
        kind: MediaKind::Image,
        timeout: Duration::from_secs(60),
        max_bytes: 16 * MIB,
        extensions: &["jpg", "jpeg", "png", "gif", "webp"],
        captioned: true,
    },
    MediaProfile {
        kind: MediaKind::Document,
        timeout: Duration::from_secs(60),
        max_bytes: 32 * MIB,
        extensions: &[
            "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "zip", "rar", "7z",
        ],
        captioned: true,
    },
    MediaProfile {
        kind: MediaKind::Audio,
        timeout: Duration::from_secs(90),
        max_bytes: 16 * MIB,
        extensions: &["mp3", "wav", "ogg", "m4a", "aac", "flac"],
        captioned: false,
    },
    MediaProfile {
        kind: MediaKind::Video,
        timeout: Duration::from_secs(120),
        max_bytes: 64 * MIB,
        extensions: &["mp4", "avi", "mov", "mkv", "webm", "3gp", "flv"],
        captioned: true,
    },
    MediaProfile {
        kind: MediaKind::Sticker,
        timeout: Duration::from_secs(30),
        max_bytes: MIB,
        extensions: &["webp"],
        captioned: false,
    },
];

impl MediaKind {
    pub const ALL: [MediaKind; 5] = [
        MediaKind::Image,
        MediaKind::Document,
        MediaKind::Audio,
        MediaKind::Video,
        MediaKind::Sticker,
    ];

    pub fn profile(self) -> &'static MediaProfile {
        &MEDIA_PROFILES[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Sticker => "sticker",
        }
    }

    /// Whether `file_name` has an extension allowed for this kind.
    pub fn accepts(self, file_name: &str) -> bool {
        extension_of(file_name)
            .is_some_and(|ext| self.profile().extensions.contains(&ext.as_str()))
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased text after the last dot, if any.
pub fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
