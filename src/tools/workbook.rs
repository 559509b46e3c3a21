//! Spreadsheet export: one workbook with the raw runs, the per-job
//! statistics and the overdue summary on separate sheets.

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tracing::info;

use crate::{date_parser::to_serial_date, tools::run_stats::Analysis};

use super::run_stats::is_overdue;

struct Formats {
    header: Format,
    timestamp: Format,
    minutes: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            timestamp: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
            minutes: Format::new().set_num_format("0.00"),
        }
    }
}

pub fn write_workbook(analysis: &Analysis, path: &Path) -> Result<(), XlsxError> {
    let mut workbook = build_workbook(analysis)?;
    workbook.save(path)?;
    info!("Wrote workbook to {}", path.display());
    Ok(())
}

pub fn workbook_to_bytes(analysis: &Analysis) -> Result<Vec<u8>, XlsxError> {
    build_workbook(analysis)?.save_to_buffer()
}

fn build_workbook(analysis: &Analysis) -> Result<Workbook, XlsxError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    add_records_sheet(workbook.add_worksheet(), analysis, &formats)?;
    add_statistics_sheet(workbook.add_worksheet(), analysis, &formats)?;
    add_overdue_sheet(workbook.add_worksheet(), analysis, &formats)?;
    Ok(workbook)
}

fn write_header(
    sheet: &mut Worksheet,
    headers: &[&str],
    formats: &Formats,
) -> Result<(), XlsxError> {
    for (column, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, column as u16, *header, &formats.header)?;
        sheet.set_column_width(column as u16, 18)?;
    }
    Ok(())
}

fn add_records_sheet(
    sheet: &mut Worksheet,
    analysis: &Analysis,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name("Raw Data")?;
    write_header(
        sheet,
        &["Job Name", "Agent Name", "Start Time", "End Time", "Duration (min)", "Overdue"],
        formats,
    )?;
    for (i, record) in analysis.records.iter().enumerate() {
        let row = i as u32 + 1;
        let overdue = analysis
            .overdue
            .get(&record.job_name)
            .is_some_and(|summary| is_overdue(record, summary));
        sheet.write_string(row, 0, record.job_name.as_str())?;
        sheet.write_string(row, 1, record.agent_name.as_str())?;
        sheet.write_number_with_format(row, 2, to_serial_date(&record.start), &formats.timestamp)?;
        sheet.write_number_with_format(row, 3, to_serial_date(&record.end), &formats.timestamp)?;
        sheet.write_number_with_format(row, 4, record.duration_minutes, &formats.minutes)?;
        sheet.write_boolean(row, 5, overdue)?;
    }
    Ok(())
}

fn add_statistics_sheet(
    sheet: &mut Worksheet,
    analysis: &Analysis,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name("Statistics")?;
    write_header(
        sheet,
        &[
            "Job Name",
            "Runs",
            "Unique Agents",
            "Mean (min)",
            "Std Dev (min)",
            "Min (min)",
            "Max (min)",
        ],
        formats,
    )?;
    for (i, stats) in analysis.statistics.values().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, stats.job_name.as_str())?;
        sheet.write_number(row, 1, stats.count as f64)?;
        sheet.write_number(row, 2, stats.unique_agent_count as f64)?;
        sheet.write_number_with_format(row, 3, stats.mean, &formats.minutes)?;
        sheet.write_number_with_format(row, 4, stats.stddev, &formats.minutes)?;
        sheet.write_number_with_format(row, 5, stats.min, &formats.minutes)?;
        sheet.write_number_with_format(row, 6, stats.max, &formats.minutes)?;
    }
    Ok(())
}

fn add_overdue_sheet(
    sheet: &mut Worksheet,
    analysis: &Analysis,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name("Overdue")?;
    write_header(
        sheet,
        &["Job Name", "Threshold (min)", "Overdue Runs", "Total Runs", "Overdue %"],
        formats,
    )?;
    for (i, summary) in analysis.overdue.values().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, summary.job_name.as_str())?;
        sheet.write_number_with_format(row, 1, summary.threshold, &formats.minutes)?;
        sheet.write_number(row, 2, summary.overdue_count as f64)?;
        sheet.write_number(row, 3, summary.total_count as f64)?;
        sheet.write_number_with_format(row, 4, summary.overdue_percentage, &formats.minutes)?;
    }
    Ok(())
}
