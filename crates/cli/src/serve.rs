use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    tokio::net::TcpListener,
    tracing::{info, warn},
    wabridge_config::{BridgeConfig, TimeoutsConfig},
    wabridge_gateway::AppState,
    wabridge_session::{Supervisor, SupervisorConfig, Timeouts},
    wabridge_whatsapp::{SidecarClient, SidecarClientConfig, SidecarConfig},
};

fn timeouts(config: &TimeoutsConfig) -> Timeouts {
    Timeouts {
        text: Duration::from_secs(config.text),
        image: Duration::from_secs(config.image),
        document: Duration::from_secs(config.document),
        audio: Duration::from_secs(config.audio),
        video: Duration::from_secs(config.video),
        sticker: Duration::from_secs(config.sticker),
    }
}

fn supervisor_config(config: &BridgeConfig) -> SupervisorConfig {
    SupervisorConfig {
        country_code: config.session.country_code.clone(),
        timeouts: timeouts(&config.timeouts),
        shutdown_grace: Duration::from_secs(config.session.shutdown_grace_secs),
    }
}

fn client_config(config: &BridgeConfig) -> SidecarClientConfig {
    let session = &config.session;
    SidecarClientConfig {
        account_id: session.account_id.clone(),
        port: session.sidecar_port,
        auth_dir: session.auth_dir.clone(),
        send_timeout: timeouts(&config.timeouts).longest(),
        launch: session.auto_start_sidecar.then(|| SidecarConfig {
            dir: session.sidecar_dir.clone(),
            port: session.sidecar_port,
            auth_dir: session.auth_dir.clone(),
        }),
        ..Default::default()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

/// Run the session and the gateway until a shutdown signal.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let upload_dir = config
        .server
        .upload_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("wabridge-uploads"));
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .with_context(|| format!("failed to create upload dir {}", upload_dir.display()))?;

    let client = Arc::new(SidecarClient::new(client_config(&config)));
    let supervisor = Arc::new(Supervisor::new(client, supervisor_config(&config)));
    supervisor.start()?;
    info!("session started, scan the pairing QR code if prompted");

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let served = wabridge_gateway::serve(
        listener,
        AppState::new(Arc::clone(&supervisor), upload_dir),
        shutdown_signal(),
    )
    .await;

    supervisor.stop().await;
    info!("wabridge stopped");
    served.context("gateway server failed")
}
