use std::sync::{
    RwLock,
    atomic::{AtomicU8, Ordering},
};

use {
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::client::SessionEvent;

/// Connection state of the live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// State shared between the background context and callers.
///
/// Only the background context writes it (through [`SessionState::apply`]);
/// callers read the atomically published connection state.
pub struct SessionState {
    connection: AtomicU8,
    country_code: String,
    identity: RwLock<Option<String>>,
    pairing_code: RwLock<Option<String>>,
}

impl SessionState {
    pub(crate) fn new(country_code: String) -> Self {
        Self {
            connection: AtomicU8::new(ConnectionState::Disconnected as u8),
            country_code,
            identity: RwLock::new(None),
            pairing_code: RwLock::new(None),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.connection() == ConnectionState::Connected
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Identity reported by the last successful pairing.
    pub fn identity(&self) -> Option<String> {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// QR payload waiting to be scanned, if any.
    pub fn pairing_code(&self) -> Option<String> {
        self.pairing_code
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_connection(&self, state: ConnectionState) {
        let previous = self.connection.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            debug!(from = ?ConnectionState::from_u8(previous), to = ?state, "session state changed");
        }
    }

    fn set_pairing_code(&self, code: Option<String>) {
        *self
            .pairing_code
            .write()
            .unwrap_or_else(|e| e.into_inner()) = code;
    }

    /// Handle one lifecycle event. Runs on the background context only.
    pub(crate) fn apply(&self, event: SessionEvent) {
        match event {
            SessionEvent::PairingCode { code } => {
                info!("pairing code received, scan it with the phone app");
                self.set_pairing_code(Some(code));
            },
            SessionEvent::PairSuccess { user } => {
                info!(user, "logged in");
                *self.identity.write().unwrap_or_else(|e| e.into_inner()) = Some(user);
            },
            SessionEvent::Connected => {
                info!("session connected");
                self.set_pairing_code(None);
                self.set_connection(ConnectionState::Connected);
            },
            SessionEvent::Disconnected { reason } => {
                warn!(?reason, "session disconnected");
                self.set_connection(ConnectionState::Disconnected);
            },
            SessionEvent::LoggedOut => {
                warn!("session logged out, pairing required");
                self.set_pairing_code(None);
                *self.identity.write().unwrap_or_else(|e| e.into_inner()) = None;
                self.set_connection(ConnectionState::Disconnected);
            },
            SessionEvent::InboundMessage(message) => {
                if message.is_from_me {
                    return;
                }
                if let Some(text) = message.display_text() {
                    info!(chat = %message.chat, sender = %message.sender, text, "inbound message");
                }
            },
        }
    }
}
