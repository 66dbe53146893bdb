//! HTTP gateway: REST endpoints that dispatch text and media sends onto the
//! session supervisor.

pub mod api;
pub mod error;
pub mod server;
pub mod state;
pub mod upload;

pub use {
    error::ApiError,
    server::{build_app, max_body_bytes, serve},
    state::AppState,
};
