//! End-to-end tests: real listener, real supervisor, stub protocol client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    reqwest::{
        StatusCode,
        multipart::{Form, Part},
    },
    serde_json::Value,
    tokio::net::TcpListener,
    wabridge_gateway::{AppState, build_app},
    wabridge_session::{
        BuiltMessage, EventSender, MediaRequest, ProtocolClient, RecipientAddress, SendReceipt,
        SessionEvent, Supervisor, SupervisorConfig, TextStrategy, Timeouts,
    },
};

/// Client that pairs immediately and records what it sends.
#[derive(Default)]
struct RecordingClient {
    send_delay: Option<Duration>,
    /// Staged file size observed while building, per media message.
    staged_sizes: Mutex<Vec<u64>>,
    sent: Mutex<Vec<(String, BuiltMessage)>>,
}

#[async_trait]
impl ProtocolClient for RecordingClient {
    async fn connect(&self, events: EventSender) -> anyhow::Result<()> {
        events.send(SessionEvent::PairSuccess {
            user: "628000000000".into(),
        })?;
        events.send(SessionEvent::Connected)?;
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn build_text(
        &self,
        strategy: TextStrategy,
        text: &str,
    ) -> anyhow::Result<Option<BuiltMessage>> {
        Ok(match strategy {
            TextStrategy::ReplyMessage => Some(BuiltMessage::ExtendedText { text: text.into() }),
            TextStrategy::DirectMessage => Some(BuiltMessage::Conversation { text: text.into() }),
        })
    }

    async fn build_media(&self, request: &MediaRequest) -> anyhow::Result<Option<BuiltMessage>> {
        let size = tokio::fs::metadata(&request.path).await?.len();
        self.staged_sizes.lock().unwrap().push(size);
        Ok(Some(BuiltMessage::Media {
            kind: request.kind,
            mimetype: request.mimetype.clone(),
            file_name: request.file_name.clone(),
            caption: request.caption.clone(),
            data: String::new(),
        }))
    }

    async fn send_message(
        &self,
        to: &RecipientAddress,
        message: BuiltMessage,
    ) -> anyhow::Result<SendReceipt> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push((to.to_string(), message));
        Ok(SendReceipt {
            message_id: Some("MSG".into()),
        })
    }
}

struct Harness {
    addr: SocketAddr,
    http: reqwest::Client,
    client: Arc<RecordingClient>,
    supervisor: Arc<Supervisor>,
    upload_dir: tempfile::TempDir,
}

impl Harness {
    async fn start(client: RecordingClient, config: SupervisorConfig, connect: bool) -> Self {
        let client = Arc::new(client);
        let supervisor = Arc::new(Supervisor::new(client.clone(), config));
        if connect {
            supervisor.start().unwrap();
            for _ in 0..200 {
                if supervisor.is_connected() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(supervisor.is_connected());
        }

        let upload_dir = tempfile::tempdir().unwrap();
        let app = build_app(AppState::new(supervisor.clone(), upload_dir.path()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            http: reqwest::Client::new(),
            client,
            supervisor,
            upload_dir,
        }
    }

    async fn connected() -> Self {
        Self::start(RecordingClient::default(), SupervisorConfig::default(), true).await
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self.http.post(self.url(path)).json(&body).send().await.unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    async fn post_form(&self, path: &str, form: Form) -> (StatusCode, Value) {
        let resp = self
            .http
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    fn staged_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }
}

fn file_part(name: &str, bytes: Vec<u8>) -> Part {
    Part::bytes(bytes).file_name(name.to_string())
}

#[tokio::test]
async fn health_and_index_respond() {
    let h = Harness::connected().await;

    let health: Value = h.http.get(h.url("/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let index: Value = h.http.get(h.url("/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(index["connected"], true);
    assert_eq!(index["file_size_limits"]["document"], "32MB");
    assert!(
        index["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e == "POST /api/send-video")
    );
}

#[tokio::test]
async fn status_reports_session() {
    let h = Harness::connected().await;
    let status: Value = h
        .http
        .get(h.url("/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connected"], true);
    assert_eq!(status["session"]["state"], "connected");
    assert_eq!(status["session"]["thread_alive"], true);
    assert_eq!(status["session"]["identity"], "628000000000");
}

#[tokio::test]
async fn text_message_is_normalized_and_sent() {
    let h = Harness::connected().await;
    let (status, body) = h
        .post_json(
            "/api/send-message",
            serde_json::json!({ "phone": "0812-3456-789", "message": "hello" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["phone"], "628123456789");
    assert_eq!(body["data"]["type"], "text");
    assert_eq!(body["data"]["message_id"], "MSG");

    let sent = h.client.sent.lock().unwrap().clone();
    assert_eq!(sent, vec![(
        "628123456789@s.whatsapp.net".to_string(),
        BuiltMessage::ExtendedText {
            text: "hello".into()
        }
    )]);
}

#[tokio::test]
async fn text_validation_errors_are_bad_requests() {
    let h = Harness::connected().await;

    let (status, body) = h
        .post_json("/api/send-message", serde_json::json!({ "phone": "08123456789" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Phone and message required");

    let (status, body) = h
        .post_json(
            "/api/send-message",
            serde_json::json!({ "phone": "12345", "message": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_recipient");

    let resp = h
        .http
        .post(h.url("/api/send-message"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(h.client.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn long_international_numbers_are_sent_as_is() {
    let h = Harness::connected().await;
    for phone in ["49151234567890", "491512345678901", "+62 812 3456 7890 12"] {
        let (status, body) = h
            .post_json(
                "/api/send-message",
                serde_json::json!({ "phone": phone, "message": "hi" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{phone}: {body}");
    }

    let recipients: Vec<String> = h
        .client
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|(to, _)| to.clone())
        .collect();
    assert_eq!(recipients, [
        "49151234567890@s.whatsapp.net",
        "491512345678901@s.whatsapp.net",
        "62812345678901@s.whatsapp.net",
    ]);
}

#[tokio::test]
async fn document_upload_is_sent_and_cleaned_up() {
    let h = Harness::connected().await;
    let form = Form::new()
        .text("phone", "628123456789")
        .text("caption", "Q3 numbers")
        .part("file", file_part("Q3 Report.pdf", vec![7; 3 * 1024]));

    let (status, body) = h.post_form("/api/send-document", form).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["type"], "document");
    assert_eq!(body["data"]["filename"], "Q3_Report.pdf");
    assert_eq!(body["data"]["caption"], "Q3 numbers");
    assert_eq!(body["data"]["file_size_kb"], 3.0);

    assert_eq!(*h.client.staged_sizes.lock().unwrap(), vec![3 * 1024]);
    let sent = h.client.sent.lock().unwrap().clone();
    let [(to, BuiltMessage::Media { mimetype, file_name, caption, .. })] = sent.as_slice() else {
        panic!("expected one media message, got {sent:?}");
    };
    assert_eq!(to, "628123456789@s.whatsapp.net");
    assert_eq!(mimetype, "application/pdf");
    assert_eq!(file_name, "Q3_Report.pdf");
    assert_eq!(caption.as_deref(), Some("Q3 numbers"));

    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn audio_ignores_caption() {
    let h = Harness::connected().await;
    let form = Form::new()
        .text("phone", "08123456789")
        .text("caption", "dropped")
        .part("file", file_part("note.ogg", vec![1; 64]));

    let (status, body) = h.post_form("/api/send-audio", form).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["data"].get("caption").is_none());

    let sent = h.client.sent.lock().unwrap().clone();
    assert!(matches!(
        &sent[0].1,
        BuiltMessage::Media { caption: None, .. }
    ));
}

#[tokio::test]
async fn media_validation_errors_are_bad_requests() {
    let h = Harness::connected().await;

    let cases = [
        (
            "/api/send-image",
            Form::new()
                .text("phone", "08123456789")
                .part("file", file_part("doc.pdf", vec![1; 8])),
            "Invalid file type",
        ),
        (
            "/api/send-sticker",
            Form::new()
                .text("phone", "08123456789")
                .part("file", file_part("big.webp", vec![0; 1024 * 1024 + 1])),
            "File too large",
        ),
        (
            "/api/send-video",
            Form::new().part("file", file_part("clip.mp4", vec![1; 8])),
            "Phone number required",
        ),
        (
            "/api/send-video",
            Form::new().text("phone", "08123456789"),
            "No file uploaded",
        ),
        (
            "/api/send-image",
            Form::new()
                .text("phone", "08123456789")
                .part("file", file_part("empty.png", Vec::new())),
            "Uploaded file is empty",
        ),
    ];

    for (path, form, expected) in cases {
        let (status, body) = h.post_form(path, form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}: {body}");
        assert!(
            body["message"].as_str().unwrap().starts_with(expected),
            "{path}: {body}"
        );
    }

    assert!(h.client.sent.lock().unwrap().is_empty());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn unstarted_session_is_unavailable() {
    let h = Harness::start(RecordingClient::default(), SupervisorConfig::default(), false).await;

    let (status, body) = h
        .post_json(
            "/api/send-message",
            serde_json::json!({ "phone": "08123456789", "message": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "not_started");

    let form = Form::new()
        .text("phone", "08123456789")
        .part("file", file_part("a.jpg", vec![1; 16]));
    let (status, _) = h.post_form("/api/send-image", form).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn stopped_session_is_unavailable() {
    let h = Harness::connected().await;
    h.supervisor.stop().await;

    let (status, body) = h
        .post_json(
            "/api/send-message",
            serde_json::json!({ "phone": "08123456789", "message": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "not_connected");
}

#[tokio::test]
async fn slow_send_times_out() {
    let client = RecordingClient {
        send_delay: Some(Duration::from_secs(3)),
        ..Default::default()
    };
    let config = SupervisorConfig {
        timeouts: Timeouts::uniform(Duration::from_millis(200)),
        ..Default::default()
    };
    let h = Harness::start(client, config, true).await;

    let (status, body) = h
        .post_json(
            "/api/send-message",
            serde_json::json!({ "phone": "08123456789", "message": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "timeout");
}
