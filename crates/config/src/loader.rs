use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::BridgeConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "wabridge.toml",
    "wabridge.yaml",
    "wabridge.yml",
    "wabridge.json",
];

/// Returns the user-global config directory (`~/.config/wabridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "wabridge").map(|d| d.config_dir().to_path_buf())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./wabridge.{toml,yaml,yml,json}`
/// 2. `~/.config/wabridge/wabridge.{toml,yaml,yml,json}`
///
/// Falls back to defaults when nothing is found or the file is invalid.
pub fn discover_and_load() -> (BridgeConfig, Option<PathBuf>) {
    let search = [Some(PathBuf::from(".")), config_dir()];
    let Some(path) = find_config_file(search.iter().flatten().map(PathBuf::as_path)) else {
        debug!("no config file found, using defaults");
        return (BridgeConfig::default(), None);
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(config) => (config, Some(path)),
        Err(e) => {
            warn!(error = %e, "failed to load config, using defaults");
            (BridgeConfig::default(), None)
        },
    }
}

/// First config file found in `dirs`, in order.
pub fn find_config_file<'a>(dirs: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    dirs.into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn parse_config(raw: &str, path: &Path) -> Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parse_error = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| parse_error(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| parse_error(e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| parse_error(e.to_string())),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_format() {
        let tmp = tempfile::tempdir().unwrap();
        let cases = [
            ("wabridge.toml", "[server]\nport = 7001\n"),
            ("wabridge.yaml", "server:\n  port: 7001\n"),
            ("wabridge.json", r#"{"server":{"port":7001}}"#),
        ];
        for (name, body) in cases {
            let path = tmp.path().join(name);
            std::fs::write(&path, body).unwrap();
            assert_eq!(load_config(&path).unwrap().server.port, 7001, "{name}");
        }
    }

    #[test]
    fn toml_wins_over_yaml_in_same_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("wabridge.yaml"), "").unwrap();
        std::fs::write(tmp.path().join("wabridge.toml"), "").unwrap();
        assert_eq!(
            find_config_file([tmp.path()]),
            Some(tmp.path().join("wabridge.toml"))
        );
    }

    #[test]
    fn earlier_dir_wins() {
        let local = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();
        std::fs::write(global.path().join("wabridge.json"), "{}").unwrap();
        assert_eq!(
            find_config_file([local.path(), global.path()]),
            Some(global.path().join("wabridge.json"))
        );

        std::fs::write(local.path().join("wabridge.yml"), "").unwrap();
        assert_eq!(
            find_config_file([local.path(), global.path()]),
            Some(local.path().join("wabridge.yml"))
        );
    }

    #[test]
    fn rejects_bad_input() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wabridge.toml");
        std::fs::write(&path, "[server]\nport = \"not a port\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Parse { .. })));

        let path = tmp.path().join("wabridge.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(load_config(&path), Err(Error::UnsupportedFormat(ext)) if ext == "ini"));

        assert!(matches!(
            load_config(&tmp.path().join("missing.toml")),
            Err(Error::Read { .. })
        ));
    }

    #[test]
    fn placeholders_use_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wabridge.toml");
        std::fs::write(
            &path,
            "[session]\ncountry_code = \"${WABRIDGE_TEST_UNSET_CC:-44}\"\n",
        )
        .unwrap();
        assert_eq!(load_config(&path).unwrap().session.country_code, "44");
    }
}
