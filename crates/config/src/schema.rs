//! Config schema: HTTP server, session, and per-kind send timeouts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub timeouts: TimeoutsConfig,
}

/// HTTP gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    pub port: u16,
    /// Where uploads are staged before sending. System temp dir when unset.
    pub upload_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
            upload_dir: None,
        }
    }
}

/// Chat session and its sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub account_id: String,
    /// Prefix applied to local phone numbers.
    pub country_code: String,
    pub sidecar_port: u16,
    pub sidecar_dir: Option<PathBuf>,
    /// Pairing credentials, kept across restarts.
    pub auth_dir: Option<PathBuf>,
    /// Spawn the sidecar instead of connecting to one already running.
    pub auto_start_sidecar: bool,
    /// How long shutdown waits for the session thread.
    pub shutdown_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            account_id: "default".into(),
            country_code: "62".into(),
            sidecar_port: 9471,
            sidecar_dir: None,
            auth_dir: None,
            auto_start_sidecar: true,
            shutdown_grace_secs: 5,
        }
    }
}

/// Send budgets in seconds, one per operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub text: u64,
    pub image: u64,
    pub document: u64,
    pub audio: u64,
    pub video: u64,
    pub sticker: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            text: 30,
            image: 60,
            document: 60,
            audio: 90,
            video: 120,
            sticker: 30,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: BridgeConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [timeouts]
            video = 300
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.timeouts.video, 300);
        assert_eq!(cfg.timeouts.audio, 90);
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, BridgeConfig::default());
    }
}
