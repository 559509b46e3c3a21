use std::path::Path;

use tracing::{info, warn};

use crate::{
    config::AnalysisConfig,
    error::AnalysisError,
    normalize,
    progress::LoadingState,
    records::ExecutionRecord,
    sheet::Sheet,
    tools::run_stats::{self, Analysis},
};

/// Holds the records of the most recently loaded batch of files.
#[derive(Debug, Default)]
pub struct Session {
    records: Vec<ExecutionRecord>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Replaces the held records with those of `paths`, read one file at a
    /// time in the given order. The first file that cannot be read, fails
    /// header validation or has no valid rows aborts the batch and leaves
    /// the session empty.
    pub async fn process_files<P>(
        &mut self,
        paths: &[P],
        config: &AnalysisConfig,
        loading: &mut LoadingState,
    ) -> Result<&[ExecutionRecord], AnalysisError>
    where
        P: AsRef<Path>,
    {
        self.reset();
        loading.begin(paths.len());

        let mut batch = Vec::new();
        for path in paths {
            let path = path.as_ref();
            loading.start_file(path);
            match load_file(path, config).await {
                Ok(records) => {
                    loading.finish_file(records.len());
                    batch.extend(records);
                }
                Err(err) => {
                    warn!("aborting batch: {}", err);
                    loading.finish(false);
                    return Err(err.in_file(path));
                }
            }
        }

        loading.finish(true);
        self.records = batch;
        Ok(&self.records)
    }

    pub fn analyze(&self, config: &AnalysisConfig) -> Analysis {
        info!("Analyzing {} record(s)", self.records.len());
        run_stats::calculate_run_stats(self.records.clone(), config.threshold_multiplier)
    }
}

async fn load_file(
    path: &Path,
    config: &AnalysisConfig,
) -> Result<Vec<ExecutionRecord>, AnalysisError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AnalysisError::file_read("error reading file", e))?;
    let sheet = Sheet::from_bytes(path, bytes)?;
    normalize::normalize_sheet(&sheet, config)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::error::ErrorKind;

    const HEADER: &str = "Job Name,Agent Name,Start Time,End Time\n";

    fn csv_file(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn files_are_concatenated_in_selection_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = csv_file(
            &dir,
            "first.csv",
            &format!("{HEADER}backup,a1,15/03/2024 10:00,15/03/2024 10:10\n"),
        );
        let second = csv_file(
            &dir,
            "second.csv",
            &format!("{HEADER}report,a2,2024-03-16 08:00,2024-03-16 08:05\n"),
        );

        let mut session = Session::new();
        let mut loading = LoadingState::new();
        let config = AnalysisConfig::default();
        let records =
            session.process_files(&[&second, &first], &config, &mut loading).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job_name, "report");
        assert_eq!(records[1].job_name, "backup");
        assert!(!loading.is_active());
        assert_eq!(loading.completed_files(), 2);
        assert_eq!(loading.records_loaded(), 2);
    }

    #[tokio::test]
    async fn failing_file_discards_the_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = csv_file(
            &dir,
            "good.csv",
            &format!("{HEADER}backup,a1,15/03/2024 10:00,15/03/2024 10:10\n"),
        );
        let bad = csv_file(
            &dir,
            "bad.csv",
            "Job,Agent Name,Start Time,End Time\nbackup,a1,15/03/2024 10:00,15/03/2024 10:10\n",
        );

        let mut session = Session::new();
        let mut loading = LoadingState::new();
        let config = AnalysisConfig::default();
        session.process_files(&[&good], &config, &mut loading).await.unwrap();
        assert_eq!(session.records().len(), 1);

        let err = session.process_files(&[&good, &bad], &config, &mut loading).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("bad.csv"));
        assert!(session.records().is_empty());
        assert_eq!(loading.completed_files(), 1);
        assert_eq!(loading.current_file(), Some(bad.as_path()));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new();
        let err = session
            .process_files(
                &[dir.path().join("nope.csv")],
                &AnalysisConfig::default(),
                &mut LoadingState::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileRead);
    }

    #[tokio::test]
    async fn reprocessing_after_reset_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = csv_file(
            &dir,
            "runs.csv",
            &format!(
                "{HEADER}backup,a1,15/03/2024 10:00,15/03/2024 10:10\n\
                 backup,a2,15/03/2024 11:00,15/03/2024 11:20\n\
                 backup,a1,15/03/2024 12:00,15/03/2024 12:30\n"
            ),
        );
        let config = AnalysisConfig::default();
        let mut session = Session::new();

        session.process_files(&[&path], &config, &mut LoadingState::new()).await.unwrap();
        let first_records = session.records().to_vec();
        let first_analysis = session.analyze(&config);

        session.reset();
        assert!(session.records().is_empty());
        session.process_files(&[&path], &config, &mut LoadingState::new()).await.unwrap();
        assert_eq!(session.records(), first_records.as_slice());
        assert_eq!(session.analyze(&config).statistics, first_analysis.statistics);
        assert_eq!(session.analyze(&config).overdue, first_analysis.overdue);
    }
}
