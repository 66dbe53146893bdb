//! Operation execution inside the background context.

use std::path::Path;

use {
    chrono::Utc,
    tracing::{debug, info, warn},
};

use crate::{
    address::RecipientAddress,
    client::{MediaRequest, ProtocolClient},
    error::DispatchError,
    operation::{
        Delivery, MediaEcho, MediaPayload, Operation, OperationKind, Outcome, Payload,
        TEXT_STRATEGIES,
    },
    state::SessionState,
};

const FALLBACK_MIMETYPE: &str = "application/octet-stream";

/// Run one operation to completion against the client.
pub(crate) async fn execute(
    client: &dyn ProtocolClient,
    session: &SessionState,
    operation: Operation,
) -> Outcome {
    // The caller checked before submitting, but the session may have dropped
    // while the operation sat in the queue.
    if !session.is_connected() {
        return Err(DispatchError::NotConnected);
    }

    let to = RecipientAddress::parse(&operation.recipient, session.country_code())?;

    match operation.payload {
        Payload::Text { text } => send_text(client, &to, text).await,
        Payload::Media(media) => send_media(client, &to, media).await,
    }
}

async fn send_text(client: &dyn ProtocolClient, to: &RecipientAddress, text: String) -> Outcome {
    let mut attempts = Vec::with_capacity(TEXT_STRATEGIES.len());

    for &strategy in TEXT_STRATEGIES {
        let message = match client.build_text(strategy, &text).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(%strategy, "text strategy produced no message");
                attempts.push(format!("{strategy}: no message"));
                continue;
            },
            Err(e) => {
                warn!(%strategy, error = %e, "text strategy failed");
                attempts.push(format!("{strategy}: {e:#}"));
                continue;
            },
        };

        let receipt = client
            .send_message(to, message)
            .await
            .map_err(|e| DispatchError::SendFailed {
                kind: OperationKind::Text,
                reason: format!("{e:#}"),
            })?;

        info!(to = %to, %strategy, "text message sent");
        return Ok(Delivery {
            recipient: to.to_string(),
            kind: OperationKind::Text,
            text: Some(text),
            media: None,
            strategy: Some(strategy),
            message_id: receipt.message_id,
            timestamp: Utc::now(),
        });
    }

    Err(DispatchError::BuildFailed {
        kind: OperationKind::Text,
        reason: format!("all strategies failed ({})", attempts.join(" | ")),
    })
}

async fn send_media(
    client: &dyn ProtocolClient,
    to: &RecipientAddress,
    media: MediaPayload,
) -> Outcome {
    let kind = OperationKind::from(media.kind);

    if !tokio::fs::try_exists(&media.path).await.unwrap_or(false) {
        return Err(DispatchError::FileNotFound { path: media.path });
    }

    let request = MediaRequest {
        kind: media.kind,
        mimetype: guess_mimetype(&media.path),
        file_name: media
            .file_name
            .unwrap_or_else(|| default_file_name(&media.path, kind)),
        caption: media.caption.filter(|_| media.kind.profile().captioned),
        path: media.path,
    };
    debug!(%kind, path = %request.path.display(), mimetype = request.mimetype, "building media message");

    let message = match client.build_media(&request).await {
        Ok(Some(message)) => message,
        Ok(None) => {
            return Err(DispatchError::BuildFailed {
                kind,
                reason: "client produced no message".into(),
            });
        },
        Err(e) => {
            return Err(DispatchError::BuildFailed {
                kind,
                reason: format!("{e:#}"),
            });
        },
    };

    let receipt = client
        .send_message(to, message)
        .await
        .map_err(|e| DispatchError::SendFailed {
            kind,
            reason: format!("{e:#}"),
        })?;

    info!(to = %to, %kind, file_name = request.file_name, "media message sent");
    Ok(Delivery {
        recipient: to.to_string(),
        kind,
        text: None,
        media: Some(MediaEcho {
            path: request.path,
            file_name: request.file_name,
            caption: request.caption,
            mimetype: request.mimetype,
        }),
        strategy: None,
        message_id: receipt.message_id,
        timestamp: Utc::now(),
    })
}

fn guess_mimetype(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_MIMETYPE)
        .to_string()
}

fn default_file_name(path: &Path, kind: OperationKind) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| kind.to_string())
}
