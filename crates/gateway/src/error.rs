use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    tracing::warn,
    wabridge_session::DispatchError,
};

/// Failure returned by an API handler, rendered as
/// `{"status": "error", "message": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Dispatch(e) => match e {
                DispatchError::InvalidRecipient { .. } => StatusCode::BAD_REQUEST,
                DispatchError::NotStarted | DispatchError::NotConnected => {
                    StatusCode::SERVICE_UNAVAILABLE
                },
                DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                DispatchError::FileNotFound { .. }
                | DispatchError::BuildFailed { .. }
                | DispatchError::SendFailed { .. }
                | DispatchError::Aborted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Dispatch(e) => e.code(),
            Self::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(format!("failed to stage upload: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = serde_json::json!({
            "status": "error",
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        std::time::Duration,
        wabridge_session::{MediaKind, OperationKind},
    };

    #[rstest]
    #[case(DispatchError::invalid_recipient("short"), StatusCode::BAD_REQUEST)]
    #[case(DispatchError::NotStarted, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(DispatchError::NotConnected, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(
        DispatchError::Timeout { kind: OperationKind::Text, budget: Duration::from_secs(30) },
        StatusCode::GATEWAY_TIMEOUT
    )]
    #[case(
        DispatchError::SendFailed { kind: OperationKind::from(MediaKind::Video), reason: "x".into() },
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    #[case(
        DispatchError::aborted(OperationKind::Text, "panic"),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn dispatch_errors_map_to_status(#[case] error: DispatchError, #[case] expected: StatusCode) {
        assert_eq!(ApiError::from(error).status(), expected);
    }

    #[tokio::test]
    async fn body_carries_message_and_code() {
        let response = ApiError::from(DispatchError::NotConnected).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "not_connected");
        assert!(body["message"].as_str().unwrap().contains("not connected"));
    }
}
