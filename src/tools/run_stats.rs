use std::collections::BTreeMap;

use serde::Serialize;

use crate::records::ExecutionRecord;

pub use processing::{aggregate, classify_overdue, is_overdue};

/// Duration statistics for every run of one job, in minutes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatistics {
    pub job_name: String,
    pub mean: f64,
    /// Population standard deviation (divided by `count`, not `count - 1`).
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub unique_agent_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverdueSummary {
    pub job_name: String,
    /// `mean + k * stddev`. Runs strictly longer than this are overdue.
    pub threshold: f64,
    pub overdue_count: usize,
    pub total_count: usize,
    pub overdue_percentage: f64,
}

/// Everything the report writers need. They only read it.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub threshold_multiplier: f64,
    pub records: Vec<ExecutionRecord>,
    pub statistics: BTreeMap<String, JobStatistics>,
    pub overdue: BTreeMap<String, OverdueSummary>,
}

impl Analysis {
    /// The individual overdue runs, in input order.
    pub fn overdue_records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter().filter(|record| {
            self.overdue.get(&record.job_name).is_some_and(|summary| is_overdue(record, summary))
        })
    }
}

pub fn calculate_run_stats(records: Vec<ExecutionRecord>, threshold_multiplier: f64) -> Analysis {
    let statistics = aggregate(&records);
    let overdue = classify_overdue(&records, &statistics, threshold_multiplier);
    Analysis { threshold_multiplier, records, statistics, overdue }
}

mod processing {
    use std::collections::{BTreeMap, BTreeSet};

    use tracing::info;

    use crate::records::ExecutionRecord;

    use super::{JobStatistics, OverdueSummary};

    /// Groups the records by job name and computes the statistics of each
    /// group from scratch.
    pub fn aggregate(records: &[ExecutionRecord]) -> BTreeMap<String, JobStatistics> {
        let mut groups: BTreeMap<&str, Vec<&ExecutionRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.job_name.as_str()).or_default().push(record);
        }
        info!("Aggregating {} record(s) across {} job(s)", records.len(), groups.len());

        groups
            .into_iter()
            .map(|(job_name, group)| (job_name.to_owned(), job_statistics(job_name, &group)))
            .collect()
    }

    /// `group` is never empty since groups only exist for names that were
    /// seen.
    fn job_statistics(job_name: &str, group: &[&ExecutionRecord]) -> JobStatistics {
        let count = group.len();
        let mean = group.iter().map(|r| r.duration_minutes).sum::<f64>() / count as f64;
        let variance = group
            .iter()
            .map(|r| {
                let diff = r.duration_minutes - mean;
                diff * diff
            })
            .sum::<f64>()
            / count as f64;
        let min = group.iter().map(|r| r.duration_minutes).fold(f64::INFINITY, f64::min);
        let max = group.iter().map(|r| r.duration_minutes).fold(f64::NEG_INFINITY, f64::max);
        let unique_agent_count =
            group.iter().map(|r| r.agent_name.as_str()).collect::<BTreeSet<_>>().len();

        JobStatistics {
            job_name: job_name.to_owned(),
            mean,
            stddev: variance.sqrt(),
            min,
            max,
            count,
            unique_agent_count,
        }
    }

    /// Counts, per job, the runs longer than `mean + k * stddev`. The counts
    /// come from the individual durations, not from the aggregates.
    pub fn classify_overdue(
        records: &[ExecutionRecord],
        statistics: &BTreeMap<String, JobStatistics>,
        threshold_multiplier: f64,
    ) -> BTreeMap<String, OverdueSummary> {
        let mut summaries: BTreeMap<String, OverdueSummary> = statistics
            .iter()
            .map(|(job_name, stats)| {
                let summary = OverdueSummary {
                    job_name: job_name.clone(),
                    threshold: stats.mean + threshold_multiplier * stats.stddev,
                    overdue_count: 0,
                    total_count: stats.count,
                    overdue_percentage: 0.0,
                };
                (job_name.clone(), summary)
            })
            .collect();

        for record in records {
            if let Some(summary) = summaries.get_mut(&record.job_name) {
                if is_overdue(record, summary) {
                    summary.overdue_count += 1;
                }
            }
        }
        for summary in summaries.values_mut() {
            summary.overdue_percentage =
                summary.overdue_count as f64 / summary.total_count as f64 * 100.0;
        }

        let overdue_total: usize = summaries.values().map(|s| s.overdue_count).sum();
        info!("Flagged {} overdue run(s) with k = {}", overdue_total, threshold_multiplier);
        summaries
    }

    /// Ties with the threshold are not overdue.
    pub fn is_overdue(record: &ExecutionRecord, summary: &OverdueSummary) -> bool {
        record.duration_minutes > summary.threshold
    }
}

pub mod output {
    use std::{
        fs::File,
        io::{BufWriter, Write},
        path::Path,
    };

    use crate::records::Timestamp;

    use super::{is_overdue, Analysis, JobStatistics};

    pub mod human {
        use super::*;

        pub fn print_statistics<W>(analysis: &Analysis, out: &mut W) -> std::io::Result<()>
        where
            W: Write,
        {
            for stats in analysis.statistics.values() {
                print_single_job(analysis, stats, out)?;
                writeln!(out)?;
            }
            Ok(())
        }

        pub fn print_single_job<W>(
            analysis: &Analysis,
            stats: &JobStatistics,
            out: &mut W,
        ) -> std::io::Result<()>
        where
            W: Write,
        {
            writeln!(out, "Job {}: ================", stats.job_name)?;
            writeln!(out, "Runs {} | Agents {}", stats.count, stats.unique_agent_count)?;
            writeln!(
                out,
                "Mean {:.2} min | Std Dev {:.2} min | Min {:.2} min | Max {:.2} min",
                stats.mean, stats.stddev, stats.min, stats.max
            )?;
            if let Some(summary) = analysis.overdue.get(&stats.job_name) {
                writeln!(
                    out,
                    "Threshold {:.2} min | Overdue {} of {} ({})",
                    summary.threshold,
                    summary.overdue_count,
                    summary.total_count,
                    format_percent(summary.overdue_percentage)
                )?;
            }
            Ok(())
        }

        pub fn print_overdue<W>(analysis: &Analysis, out: &mut W) -> std::io::Result<()>
        where
            W: Write,
        {
            writeln!(
                out,
                "Overdue runs (longer than mean + {} x std dev): ================",
                analysis.threshold_multiplier
            )?;
            for record in analysis.overdue_records() {
                let threshold =
                    analysis.overdue.get(&record.job_name).map_or(f64::NAN, |s| s.threshold);
                writeln!(
                    out,
                    "{} on {}: {} -> {} ({:.2} min, threshold {:.2} min)",
                    record.job_name,
                    or_unknown(&record.agent_name),
                    format_timestamp(&record.start),
                    format_timestamp(&record.end),
                    record.duration_minutes,
                    threshold,
                )?;
            }
            Ok(())
        }

        pub fn print_records<W>(analysis: &Analysis, out: &mut W) -> std::io::Result<()>
        where
            W: Write,
        {
            writeln!(out, "All runs: ================")?;
            for record in &analysis.records {
                writeln!(
                    out,
                    "{} on {}: {} -> {} ({:.2} min)",
                    record.job_name,
                    or_unknown(&record.agent_name),
                    format_timestamp(&record.start),
                    format_timestamp(&record.end),
                    record.duration_minutes,
                )?;
            }
            Ok(())
        }

        /// Writes one `job-<name>-stats.txt` per job and an `overdue.txt`.
        pub fn print_entire_report_directory(
            analysis: &Analysis,
            output_dir: &Path,
        ) -> std::io::Result<()> {
            // make sure that the output directory exists
            std::fs::create_dir_all(output_dir)?;

            // print the per-job statistics
            for stats in analysis.statistics.values() {
                let file_name = format!("job-{}-stats.txt", file_stem(&stats.job_name));
                write_file(&output_dir.join(file_name), analysis, |analysis, out| {
                    print_single_job(analysis, stats, out)
                })?;
            }

            // print the overdue runs
            write_file(&output_dir.join("overdue.txt"), analysis, print_overdue)?;

            Ok(())
        }

        /// Job names are free text; anything that could escape the output
        /// directory becomes `_`.
        fn file_stem(job_name: &str) -> String {
            let stem: String = job_name
                .chars()
                .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect();
            if stem.is_empty() {
                "_".to_owned()
            } else {
                stem
            }
        }

        pub fn print_entire_report_to_writer<W>(analysis: &Analysis, out: W) -> std::io::Result<()>
        where
            W: Write,
        {
            super::print_entire_report_to_writer(
                analysis,
                out,
                print_statistics,
                print_overdue,
                print_records,
            )
        }
    }

    pub mod csv {
        use super::*;

        pub fn print_statistics<W>(analysis: &Analysis, out: &mut W) -> std::io::Result<()>
        where
            W: Write,
        {
            let mut writer = ::csv::Writer::from_writer(out);
            writer.write_record([
                "Job Name",
                "Runs",
                "Unique Agents",
                "Mean (min)",
                "Std Dev (min)",
                "Min (min)",
                "Max (min)",
            ])?;
            for stats in analysis.statistics.values() {
                writer.write_record([
                    stats.job_name.as_str(),
                    &stats.count.to_string(),
                    &stats.unique_agent_count.to_string(),
                    &stats.mean.to_string(),
                    &stats.stddev.to_string(),
                    &stats.min.to_string(),
                    &stats.max.to_string(),
                ])?;
            }
            writer.flush()?;
            Ok(())
        }

        pub fn print_overdue<W>(analysis: &Analysis, out: &mut W) -> std::io::Result<()>
        where
            W: Write,
        {
            let mut writer = ::csv::Writer::from_writer(out);
            writer.write_record([
                "Job Name",
                "Threshold (min)",
                "Overdue Runs",
                "Total Runs",
                "Overdue %",
            ])?;
            for summary in analysis.overdue.values() {
                writer.write_record([
                    summary.job_name.as_str(),
                    &summary.threshold.to_string(),
                    &summary.overdue_count.to_string(),
                    &summary.total_count.to_string(),
                    &format!("{:.2}", summary.overdue_percentage),
                ])?;
            }
            writer.flush()?;
            Ok(())
        }

        pub fn print_records<W>(analysis: &Analysis, out: &mut W) -> std::io::Result<()>
        where
            W: Write,
        {
            let mut writer = ::csv::Writer::from_writer(out);
            writer.write_record([
                "Job Name",
                "Agent Name",
                "Start Time",
                "End Time",
                "Duration (min)",
                "Overdue",
            ])?;
            for record in &analysis.records {
                let overdue = analysis
                    .overdue
                    .get(&record.job_name)
                    .is_some_and(|summary| is_overdue(record, summary));
                writer.write_record([
                    record.job_name.as_str(),
                    record.agent_name.as_str(),
                    &format_timestamp(&record.start),
                    &format_timestamp(&record.end),
                    &record.duration_minutes.to_string(),
                    if overdue { "yes" } else { "no" },
                ])?;
            }
            writer.flush()?;
            Ok(())
        }

        pub fn print_entire_report_directory(
            analysis: &Analysis,
            output_dir: &Path,
        ) -> std::io::Result<()> {
            super::print_entire_report_directory(
                analysis,
                output_dir,
                "csv",
                print_statistics,
                print_overdue,
                print_records,
            )
        }

        pub fn print_entire_report_to_writer<W>(analysis: &Analysis, out: W) -> std::io::Result<()>
        where
            W: Write,
        {
            super::print_entire_report_to_writer(
                analysis,
                out,
                print_statistics,
                print_overdue,
                print_records,
            )
        }
    }

    pub mod json {
        use super::*;

        pub fn print_entire_report_to_writer<W>(
            analysis: &Analysis,
            mut out: W,
        ) -> std::io::Result<()>
        where
            W: Write,
        {
            serde_json::to_writer_pretty(&mut out, analysis)?;
            writeln!(out)?;
            Ok(())
        }
    }

    fn print_entire_report_directory<F0, F1, F2>(
        analysis: &Analysis,
        output_dir: &Path,
        extension: &str,
        print_statistics: F0,
        print_overdue: F1,
        print_records: F2,
    ) -> std::io::Result<()>
    where
        F0: Fn(&Analysis, &mut BufWriter<File>) -> std::io::Result<()>,
        F1: Fn(&Analysis, &mut BufWriter<File>) -> std::io::Result<()>,
        F2: Fn(&Analysis, &mut BufWriter<File>) -> std::io::Result<()>,
    {
        // make sure that the output directory exists
        std::fs::create_dir_all(output_dir)?;

        let path = |name: &str| output_dir.join(format!("{name}.{extension}"));
        write_file(&path("statistics"), analysis, print_statistics)?;
        write_file(&path("overdue"), analysis, print_overdue)?;
        write_file(&path("records"), analysis, print_records)?;

        Ok(())
    }

    fn write_file<F>(path: &Path, analysis: &Analysis, print: F) -> std::io::Result<()>
    where
        F: Fn(&Analysis, &mut BufWriter<File>) -> std::io::Result<()>,
    {
        let mut out_file = BufWriter::new(File::create(path)?);
        print(analysis, &mut out_file)?;
        out_file.flush()
    }

    fn print_entire_report_to_writer<W, F0, F1, F2>(
        analysis: &Analysis,
        mut out: W,
        print_statistics: F0,
        print_overdue: F1,
        print_records: F2,
    ) -> std::io::Result<()>
    where
        W: Write,
        F0: Fn(&Analysis, &mut W) -> std::io::Result<()>,
        F1: Fn(&Analysis, &mut W) -> std::io::Result<()>,
        F2: Fn(&Analysis, &mut W) -> std::io::Result<()>,
    {
        print_statistics(analysis, &mut out)?;
        writeln!(out)?;
        print_overdue(analysis, &mut out)?;
        writeln!(out)?;
        print_records(analysis, &mut out)?;
        Ok(())
    }

    pub fn format_timestamp(ts: &Timestamp) -> String {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    }
    pub fn format_percent(percentage: f64) -> String {
        format!("{:6.2}%", percentage)
    }
    fn or_unknown(agent_name: &str) -> &str {
        if agent_name.is_empty() {
            "[unknown agent]"
        } else {
            agent_name
        }
    }
}
