use std::path::{Path, PathBuf};

use tracing::info;

/// Progress of the batch currently being loaded. Owned by whoever starts the
/// batch and lent to [`crate::session::Session::process_files`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadingState {
    active: bool,
    total_files: usize,
    completed_files: usize,
    current_file: Option<PathBuf>,
    records_loaded: usize,
}

impl LoadingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn completed_files(&self) -> usize {
        self.completed_files
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    pub fn records_loaded(&self) -> usize {
        self.records_loaded
    }

    pub(crate) fn begin(&mut self, total_files: usize) {
        info!("Loading {} file(s)", total_files);
        *self = Self { active: true, total_files, ..Self::default() };
    }

    pub(crate) fn start_file(&mut self, path: &Path) {
        info!("Reading file {}/{}: {}", self.completed_files + 1, self.total_files, path.display());
        self.current_file = Some(path.to_owned());
    }

    pub(crate) fn finish_file(&mut self, records: usize) {
        if let Some(path) = self.current_file.take() {
            info!("Loaded {} record(s) from {}", records, path.display());
        }
        self.completed_files += 1;
        self.records_loaded += records;
    }

    /// Ends the batch. On failure the counters are left where the batch
    /// stopped and the failing file stays in `current_file`.
    pub(crate) fn finish(&mut self, succeeded: bool) {
        self.active = false;
        if succeeded {
            info!(
                "Finished loading {} record(s) from {} file(s)",
                self.records_loaded, self.completed_files
            );
        }
    }
}
