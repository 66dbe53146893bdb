//! REST handlers.

use {
    axum::{
        Json,
        extract::{Multipart, State, rejection::JsonRejection},
        response::IntoResponse,
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::info,
    wabridge_session::{DispatchError, MEDIA_PROFILES, MediaKind, Operation, normalize},
};

use crate::{error::ApiError, state::AppState, upload::read_media_form};

const SERVICE_NAME: &str = "wabridge";

fn supported_formats() -> Value {
    MEDIA_PROFILES
        .iter()
        .map(|p| (p.kind.to_string(), json!(p.extensions)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn size_limits() -> Value {
    MEDIA_PROFILES
        .iter()
        .map(|p| {
            let mb = p.max_bytes / (1024 * 1024);
            (p.kind.to_string(), json!(format!("{mb}MB")))
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn endpoints() -> Vec<String> {
    let mut list = vec![
        "GET /api/status".to_string(),
        "POST /api/send-message".to_string(),
    ];
    list.extend(MediaKind::ALL.iter().map(|kind| format!("POST /api/send-{kind}")));
    list
}

pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "connected": state.supervisor.is_connected(),
        "supported_formats": supported_formats(),
        "file_size_limits": size_limits(),
        "endpoints": endpoints(),
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.supervisor.status();
    Json(json!({
        "status": "success",
        "connected": session.connected,
        "session": session,
        "supported_formats": supported_formats(),
        "file_size_limits": size_limits(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::bad_request("JSON payload required"))?;
    let (Some(phone), Some(message)) = (required(request.phone), required(request.message))
    else {
        return Err(ApiError::bad_request("Phone and message required"));
    };
    let phone = normalize(&phone, state.country_code())?;

    let delivery = state
        .supervisor
        .dispatch(Operation::text(phone.as_str(), message.as_str()))
        .await?;
    info!(%phone, "text message delivered");

    Ok(Json(json!({
        "status": "success",
        "message": "Text message sent successfully",
        "data": {
            "phone": phone,
            "message": message,
            "type": delivery.kind,
            "message_id": delivery.message_id,
            "timestamp": delivery.timestamp,
        },
    })))
}

pub async fn send_media(
    state: AppState,
    kind: MediaKind,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    // Refuse before reading the body.
    if !state.supervisor.is_started() {
        return Err(DispatchError::NotStarted.into());
    }
    if !state.supervisor.is_connected() {
        return Err(DispatchError::NotConnected.into());
    }

    let form = read_media_form(multipart, kind, &state.upload_dir).await?;
    let phone =
        required(form.phone).ok_or_else(|| ApiError::bad_request("Phone number required"))?;
    let phone = normalize(&phone, state.country_code())?;
    let file = form
        .file
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let caption = required(form.caption).filter(|_| kind.profile().captioned);

    let mut operation = Operation::media(phone.as_str(), kind, file.path.to_path_buf())
        .with_file_name(&file.file_name);
    if let Some(caption) = &caption {
        operation = operation.with_caption(caption);
    }
    let delivery = state.supervisor.dispatch(operation).await?;
    info!(%phone, %kind, size = file.size, "media message delivered");

    let mut data = json!({
        "phone": phone,
        "filename": file.file_name,
        "type": delivery.kind,
        "file_size_kb": file.size_kb(),
        "message_id": delivery.message_id,
        "timestamp": delivery.timestamp,
    });
    if let Some(caption) = caption {
        data["caption"] = json!(caption);
    }

    // `file` drops here, removing the staged upload.
    Ok(Json(json!({
        "status": "success",
        "message": format!("{} sent successfully", capitalized(kind.as_str())),
        "data": data,
    })))
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_list_covers_every_kind() {
        let list = endpoints();
        assert!(list.contains(&"POST /api/send-sticker".to_string()));
        assert_eq!(list.len(), 2 + MediaKind::ALL.len());
    }

    #[test]
    fn limits_are_reported_in_megabytes() {
        let limits = size_limits();
        assert_eq!(limits["video"], "64MB");
        assert_eq!(limits["sticker"], "1MB");
        assert_eq!(supported_formats()["sticker"], json!(["webp"]));
    }

    #[test]
    fn capitalizes_kind() {
        assert_eq!(capitalized("image"), "Image");
        assert_eq!(capitalized(""), "");
    }
}
