use std::{io::Write as _, path::PathBuf};

use anyhow::bail;
use clap::CommandFactory as _;
use runlens::{progress::LoadingState, session::Session, tools};
use tracing::info;

use crate::CliArgs;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// The spreadsheet exports (.xlsx, .xls, .ods or .csv) to analyze. Files
    /// are read in the order given and their runs are concatenated.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// A JSON file describing the header row, the column layout and the
    /// overdue threshold multiplier. See `default-config`.
    #[arg(short, long, env = "RUNLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Flag runs longer than mean + K standard deviations of their job.
    /// Overrides the value from the configuration file.
    #[arg(short = 'k', long)]
    threshold_multiplier: Option<f64>,

    /// The format in which to print the output.
    #[arg(long, value_enum, default_value = "human")]
    format: CliOutputFormat,

    /// Where to write the output. For `human` and `csv`, "-" or unspecified
    /// writes concatenated tables to stdout and anything else is a
    /// directory that receives one file per table. For `json`, a file or
    /// stdout. For `xlsx`, the workbook file; required.
    #[arg(short, long, default_value = None)]
    output: Option<String>,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy, Eq, PartialEq)]
enum CliOutputFormat {
    /// Human-readable text: per-job statistics, overdue runs, all runs.
    Human,
    /// CSV tables for statistics, overdue summary and all runs.
    Csv,
    /// A single JSON document with the runs, statistics and overdue summary.
    Json,
    /// An Excel workbook with one sheet per table.
    Xlsx,
}

enum OutputSpec {
    /// Prints a human-readable report into a write stream.
    HumanIntoSingleFile(Box<dyn std::io::Write + Send>),
    /// Prints a human-readable report into a directory, one file per table.
    HumanIntoDirectory(PathBuf),
    /// Prints CSV tables into a write stream.
    CsvIntoSingleFile(Box<dyn std::io::Write + Send>),
    /// Prints CSV tables into a directory, one file per table.
    CsvIntoDirectory(PathBuf),
    /// Prints a JSON document into a write stream.
    Json(Box<dyn std::io::Write + Send>),
    /// Writes an Excel workbook to a file.
    Xlsx(PathBuf),
}

pub async fn main(args: Args) -> anyhow::Result<()> {
    let Args { files, config, threshold_multiplier, format, output } = args;

    // load the configuration
    let mut config = crate::load_config(config.as_deref())?;
    if let Some(k) = threshold_multiplier {
        config = config.with_threshold_multiplier(k)?;
    }

    // parse the output format
    let output_spec = match (format, output.as_deref()) {
        (CliOutputFormat::Human, Some("-") | None) => {
            OutputSpec::HumanIntoSingleFile(Box::new(std::io::stdout()))
        }
        (CliOutputFormat::Human, Some(dir)) => OutputSpec::HumanIntoDirectory(PathBuf::from(dir)),
        (CliOutputFormat::Csv, Some("-") | None) => {
            OutputSpec::CsvIntoSingleFile(Box::new(std::io::stdout()))
        }
        (CliOutputFormat::Csv, Some(dir)) => OutputSpec::CsvIntoDirectory(PathBuf::from(dir)),
        (CliOutputFormat::Json, Some("-") | None) => OutputSpec::Json(Box::new(std::io::stdout())),
        (CliOutputFormat::Json, Some(file)) => {
            OutputSpec::Json(Box::new(std::io::BufWriter::new(std::fs::File::create(file)?)))
        }
        (CliOutputFormat::Xlsx, Some("-") | None) => {
            let err = CliArgs::command().error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "`--format xlsx` requires `--output <FILE>`",
            );
            bail!(err);
        }
        (CliOutputFormat::Xlsx, Some(file)) => OutputSpec::Xlsx(PathBuf::from(file)),
    };

    // do the processing
    let mut session = Session::new();
    let mut loading = LoadingState::new();
    session.process_files(&files, &config, &mut loading).await?;
    let analysis = session.analyze(&config);
    info!(
        "Analyzed {} run(s) of {} job(s) from {} file(s)",
        analysis.records.len(),
        analysis.statistics.len(),
        loading.completed_files()
    );

    // output the results
    use tools::run_stats::output;
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        match output_spec {
            OutputSpec::HumanIntoSingleFile(mut writer) => {
                output::human::print_entire_report_to_writer(&analysis, &mut writer)?;
                writer.flush()?;
            }
            OutputSpec::HumanIntoDirectory(dir) => {
                output::human::print_entire_report_directory(&analysis, &dir)?;
            }
            OutputSpec::CsvIntoSingleFile(mut writer) => {
                output::csv::print_entire_report_to_writer(&analysis, &mut writer)?;
                writer.flush()?;
            }
            OutputSpec::CsvIntoDirectory(dir) => {
                output::csv::print_entire_report_directory(&analysis, &dir)?;
            }
            OutputSpec::Json(mut writer) => {
                output::json::print_entire_report_to_writer(&analysis, &mut writer)?;
                writer.flush()?;
            }
            OutputSpec::Xlsx(file) => {
                tools::workbook::write_workbook(&analysis, &file)?;
            }
        }
        Ok(())
    })
    .await??;

    Ok(())
}
