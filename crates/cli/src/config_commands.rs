use std::path::Path;

use {anyhow::Result, clap::Subcommand, wabridge_config::BridgeConfig};

#[derive(Subcommand, Default)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML (default).
    #[default]
    Show,
    /// Print which config file was loaded.
    Path,
}

pub fn handle_config(
    action: ConfigAction,
    config: &BridgeConfig,
    path: Option<&Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", render(config)?);
        },
        ConfigAction::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => eprintln!("No config file found; using defaults."),
        },
    }
    Ok(())
}

fn render(config: &BridgeConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}
