//! Launching and supervising the Node sidecar process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

use crate::sidecar::DEFAULT_SIDECAR_PORT;

/// Environment variable naming the sidecar directory.
pub const SIDECAR_DIR_ENV: &str = "WABRIDGE_SIDECAR_DIR";

const SIDECAR_SUBDIR: &str = "sidecar/whatsapp";
const ENTRYPOINT: &str = "dist/index.js";
const STARTUP_SETTLE: Duration = Duration::from_millis(500);
const STOP_GRACE: Duration = Duration::from_secs(5);
const LOG_TARGET: &str = "wabridge_sidecar";

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Directory holding the sidecar's `package.json`. Discovered when unset.
    pub dir: Option<PathBuf>,
    pub port: u16,
    /// Where the sidecar persists its pairing credentials.
    pub auth_dir: Option<PathBuf>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            dir: None,
            port: DEFAULT_SIDECAR_PORT,
            auth_dir: None,
        }
    }
}

/// A running sidecar. Killed when dropped.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the sidecar to exit, then kill it if it lingers.
    pub async fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        info!(pid = self.pid(), "stopping whatsapp sidecar");
        self.terminate().await;

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(%status, "whatsapp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for whatsapp sidecar"),
            Err(_) => {
                warn!("whatsapp sidecar ignored SIGTERM, killing");
                if let Err(e) = self.child.kill().await {
                    error!(error = %e, "failed to kill whatsapp sidecar");
                }
            },
        }
    }

    #[cfg(unix)]
    async fn terminate(&mut self) {
        use nix::{
            sys::signal::{Signal, kill},
            unistd::Pid,
        };

        let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM failed");
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "failed to signal sidecar");
        }
    }
}

fn has_manifest(dir: &Path) -> bool {
    dir.join("package.json").is_file()
}

/// Directories searched, in order, when no explicit path is configured.
fn candidate_dirs(env_dir: Option<PathBuf>, exe_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = env_dir.into_iter().collect();
    if let Some(exe_dir) = exe_dir {
        dirs.push(exe_dir.join("..").join(SIDECAR_SUBDIR));
        dirs.push(exe_dir.join("../..").join(SIDECAR_SUBDIR));
    }
    dirs.extend(
        ["", "..", "../.."]
            .into_iter()
            .map(|prefix| Path::new(prefix).join(SIDECAR_SUBDIR)),
    );
    dirs
}

/// Locate the sidecar directory.
///
/// An explicit path must exist. Otherwise `WABRIDGE_SIDECAR_DIR`, then paths
/// next to the executable, then paths relative to the working directory.
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if has_manifest(path) {
            return Ok(path.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", path.display());
    }

    let env_dir = std::env::var_os(SIDECAR_DIR_ENV).map(PathBuf::from);
    let exe = std::env::current_exe().ok();
    let exe_dir = exe.as_deref().and_then(Path::parent);

    candidate_dirs(env_dir, exe_dir)
        .into_iter()
        .find(|dir| has_manifest(dir))
        .map(|dir| dir.canonicalize().unwrap_or(dir))
        .with_context(|| {
            format!("whatsapp sidecar not found; set {SIDECAR_DIR_ENV} or create {SIDECAR_SUBDIR}")
        })
}

async fn npm(dir: &Path, args: &[&str]) -> Result<()> {
    info!(path = %dir.display(), ?args, "running npm for sidecar");
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to run npm {}", args.join(" ")))?;

    if !output.status.success() {
        bail!(
            "npm {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Install dependencies and build the entrypoint if it is missing.
async fn ensure_built(dir: &Path) -> Result<()> {
    if dir.join(ENTRYPOINT).is_file() {
        return Ok(());
    }
    if !dir.join("node_modules").is_dir() {
        npm(dir, &["install"]).await?;
    }
    npm(dir, &["run", "build"]).await
}

/// Map a pino JSON log line to its level and message.
fn pino_record(line: &str) -> Option<(u64, String)> {
    if !line.starts_with('{') {
        return None;
    }
    let record: serde_json::Value = serde_json::from_str(line).ok()?;
    let level = record.get("level").and_then(serde_json::Value::as_u64).unwrap_or(30);
    let msg = record
        .get("msg")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(line)
        .to_string();
    Some((level, msg))
}

fn forward_output<R>(reader: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match pino_record(&line) {
                Some((level, msg)) if level <= 20 => debug!(target: LOG_TARGET, "{msg}"),
                Some((30, msg)) => info!(target: LOG_TARGET, "{msg}"),
                Some((40, msg)) => warn!(target: LOG_TARGET, "{msg}"),
                Some((_, msg)) => error!(target: LOG_TARGET, "{msg}"),
                None if is_stderr => warn!(target: LOG_TARGET, "{line}"),
                None => info!(target: LOG_TARGET, "{line}"),
            }
        }
    });
}

/// Build if needed, spawn `node dist/index.js`, and wait for it to settle.
pub async fn start_sidecar(config: &SidecarConfig) -> Result<SidecarProcess> {
    let dir = find_sidecar_dir(config.dir.as_deref())?;
    ensure_built(&dir).await?;

    info!(path = %dir.display(), port = config.port, "starting whatsapp sidecar");
    let mut command = Command::new("node");
    command
        .arg(ENTRYPOINT)
        .current_dir(&dir)
        .env("WABRIDGE_SIDECAR_PORT", config.port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(auth_dir) = &config.auth_dir {
        command.env("WABRIDGE_AUTH_DIR", auth_dir);
    }

    let mut child = command.spawn().context("failed to spawn whatsapp sidecar")?;
    if let Some(stdout) = child.stdout.take() {
        forward_output(stdout, false);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output(stderr, true);
    }

    tokio::time::sleep(STARTUP_SETTLE).await;
    if let Some(status) = child
        .try_wait()
        .context("failed to poll whatsapp sidecar")?
    {
        bail!("whatsapp sidecar exited during startup with {status}");
    }

    Ok(SidecarProcess {
        child,
        port: config.port,
    })
}
