use std::future::Future;

use {
    axum::{
        Router,
        extract::{DefaultBodyLimit, Multipart, State},
        routing::{get, post},
    },
    tokio::net::TcpListener,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
    wabridge_session::{MEDIA_PROFILES, MediaKind},
};

use crate::{api, state::AppState};

/// Multipart framing allowance on top of the largest media limit.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Request body cap: the largest per-kind limit plus framing.
pub fn max_body_bytes() -> usize {
    let largest = MEDIA_PROFILES
        .iter()
        .map(|p| p.max_bytes)
        .max()
        .unwrap_or_default();
    usize::try_from(largest).unwrap_or(usize::MAX).saturating_add(MULTIPART_OVERHEAD)
}

fn media_route(router: Router<AppState>, kind: MediaKind) -> Router<AppState> {
    router.route(
        &format!("/api/send-{kind}"),
        post(move |State(state): State<AppState>, multipart: Multipart| {
            api::send_media(state, kind, multipart)
        }),
    )
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/", get(api::index))
        .route("/health", get(api::health))
        .route("/api/status", get(api::status))
        .route("/api/send-message", post(api::send_message));

    MediaKind::ALL
        .into_iter()
        .fold(router, media_route)
        .layer(DefaultBodyLimit::max(max_body_bytes()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gateway listening");
    }
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn body_limit_covers_largest_kind() {
        assert_eq!(max_body_bytes(), 64 * 1024 * 1024 + MULTIPART_OVERHEAD);
    }
}
