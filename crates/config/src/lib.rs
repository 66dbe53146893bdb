//! Configuration loading and env substitution.
//!
//! Config files: `wabridge.toml`, `wabridge.yaml`, or `wabridge.json`.
//! Searched in `./` then `~/.config/wabridge/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` in all values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{BridgeConfig, ServerConfig, SessionConfig, TimeoutsConfig},
};
