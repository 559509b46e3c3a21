use std::path::PathBuf;

use anyhow::bail;
use runlens::{error::AnalysisError, normalize, sheet::Sheet};
use tracing::warn;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// The spreadsheet exports to check.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// A JSON file describing the header row and column layout.
    #[arg(short, long, env = "RUNLENS_CONFIG")]
    config: Option<PathBuf>,
}

pub async fn main(args: Args) -> anyhow::Result<()> {
    let Args { files, config } = args;
    let config = crate::load_config(config.as_deref())?;

    let mut failures = 0;
    for file in &files {
        let result = match tokio::fs::read(file).await {
            Ok(bytes) => Sheet::from_bytes(file, bytes)
                .and_then(|sheet| normalize::validate_header(&sheet, &config)),
            Err(e) => Err(AnalysisError::file_read("error reading file", e)),
        };
        match result {
            Ok(()) => println!("ok      {}", file.display()),
            Err(err) => {
                warn!("{} failed validation", file.display());
                println!("FAILED  {}: {}", file.display(), err);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} file(s) failed validation", failures, files.len());
    }
    Ok(())
}
