//! WebSocket transport to the sidecar.

use std::time::Duration;

use {
    anyhow::{Context, Result},
    tokio::net::TcpStream,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async},
    tracing::{debug, info},
};

/// Port the sidecar listens on unless configured otherwise.
pub const DEFAULT_SIDECAR_PORT: u16 = 9471;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(4);

pub type SidecarStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn sidecar_url(port: u16) -> String {
    format!("ws://127.0.0.1:{port}")
}

/// Delay before the given (zero-based) retry, doubling up to a cap.
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(1_u32 << attempt.min(16))
        .min(RETRY_MAX_DELAY)
}

/// Connect to the sidecar, retrying while it boots.
pub async fn connect_with_retry(port: u16, attempts: u32) -> Result<SidecarStream> {
    let url = sidecar_url(port);
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(url, "connected to whatsapp sidecar");
                return Ok(stream);
            },
            Err(e) => {
                debug!(url, attempt, error = %e, "sidecar not reachable yet");
                last_error = Some(e);
            },
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(retry_delay(attempt)).await;
        }
    }

    match last_error {
        Some(e) => Err(e).with_context(|| format!("failed to connect to sidecar at {url}")),
        None => anyhow::bail!("failed to connect to sidecar at {url}"),
    }
}
