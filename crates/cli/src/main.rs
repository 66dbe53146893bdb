mod config_commands;
mod serve;

use std::path::PathBuf;

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wabridge_config::BridgeConfig,
};

#[derive(Parser)]
#[command(name = "wabridge", about = "REST bridge to a WhatsApp Web session", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery in ./ and ~/.config/wabridge/).
    #[arg(long, global = true, env = "WABRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the session and the HTTP gateway (default).
    Serve,
    /// Inspect the effective configuration.
    Config {
        #[command(subcommand)]
        action: Option<config_commands::ConfigAction>,
    },
    /// Print the recipient address a phone number resolves to.
    Normalize {
        phone: String,
        /// Country code for local numbers (defaults to the configured one).
        #[arg(long)]
        country_code: Option<String>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit or discovered config, then apply CLI overrides.
fn load_config(cli: &Cli) -> Result<(BridgeConfig, Option<PathBuf>)> {
    let (mut config, path) = match &cli.config {
        Some(path) => (wabridge_config::load_config(path)?, Some(path.clone())),
        None => wabridge_config::discover_and_load(),
    };
    if let Some(bind) = &cli.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok((config, path))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let (config, path) = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "wabridge starting");
            if let Some(path) = &path {
                info!(path = %path.display(), "using config file");
            }
            serve::run(config).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action.unwrap_or_default(), &config, path.as_deref())
        },
        Some(Commands::Normalize {
            phone,
            country_code,
        }) => {
            let country_code = country_code.unwrap_or(config.session.country_code);
            let address = wabridge_session::RecipientAddress::parse(&phone, &country_code)?;
            println!("{address}");
            Ok(())
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wabridge.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1\"\nport = 7000\n").unwrap();

        let cli = Cli::parse_from([
            "wabridge",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7100",
            "serve",
        ]);
        let (config, found) = load_config(&cli).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 7100);
        assert_eq!(found, Some(path));
    }

    #[test]
    fn normalize_takes_phone_and_country_code() {
        let cli = Cli::parse_from(["wabridge", "normalize", "07700900123", "--country-code", "44"]);
        let Some(Commands::Normalize {
            phone,
            country_code,
        }) = cli.command
        else {
            panic!("expected normalize");
        };
        assert_eq!(phone, "07700900123");
        assert_eq!(country_code.as_deref(), Some("44"));
    }
}
