use std::{path::PathBuf, sync::Arc};

use wabridge_session::Supervisor;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    /// Directory uploads are staged in while they are being sent.
    pub upload_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            supervisor,
            upload_dir: Arc::new(upload_dir.into()),
        }
    }

    pub fn country_code(&self) -> &str {
        &self.supervisor.config().country_code
    }
}
