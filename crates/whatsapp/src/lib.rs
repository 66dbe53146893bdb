//! WhatsApp Web session client.
//!
//! Talks to a Node sidecar (Baileys) over a local WebSocket and implements
//! [`wabridge_session::ProtocolClient`] on top of it.

pub mod client;
pub mod process;
pub mod sidecar;
pub mod types;

pub use {
    client::{SidecarClient, SidecarClientConfig},
    process::{SIDECAR_DIR_ENV, SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::DEFAULT_SIDECAR_PORT,
};
