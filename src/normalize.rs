use tracing::{info, warn};

use crate::{
    config::AnalysisConfig,
    date_parser,
    error::AnalysisError,
    records::{ExecutionRecord, RawRow},
    sheet::Sheet,
};

/// Why a data row was dropped. These never abort a file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowRejection {
    #[error("start time {0:?} is not a recognized date")]
    InvalidStart(String),
    #[error("end time {0:?} is not a recognized date")]
    InvalidEnd(String),
    #[error("end time is before start time ({0:.2} minutes)")]
    NegativeDuration(f64),
}

/// Checks that every configured column carries its label on the header row.
/// All mismatches are reported together.
pub fn validate_header(sheet: &Sheet, config: &AnalysisConfig) -> Result<(), AnalysisError> {
    let header_row = config.header_row as usize;
    if header_row >= sheet.row_count() {
        return Err(AnalysisError::validation(format!(
            "header row {} is missing (the sheet has {} row(s))",
            header_row + 1,
            sheet.row_count()
        )));
    }

    let mismatches: Vec<String> = config
        .columns
        .iter()
        .filter_map(|(_, spec)| {
            let found = sheet.cell(header_row, spec.column.index()).to_trimmed_string();
            (found != spec.label).then(|| {
                format!(
                    "expected \"{}\" in {}{}, found \"{}\"",
                    spec.label,
                    spec.column,
                    header_row + 1,
                    found
                )
            })
        })
        .collect();

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::validation(format!("unexpected header: {}", mismatches.join("; "))))
    }
}

pub fn normalize_row(row: &RawRow) -> Result<ExecutionRecord, RowRejection> {
    let start = date_parser::parse_timestamp(&row.start)
        .ok_or_else(|| RowRejection::InvalidStart(row.start.to_trimmed_string()))?;
    let end = date_parser::parse_timestamp(&row.end)
        .ok_or_else(|| RowRejection::InvalidEnd(row.end.to_trimmed_string()))?;
    let job_name = row.job_name.to_trimmed_string();
    let agent_name = row.agent_name.to_trimmed_string();
    ExecutionRecord::new(job_name, agent_name, start, end).ok_or_else(|| {
        RowRejection::NegativeDuration(crate::records::into_minutes(end - start))
    })
}

/// Validates the header, then turns every following row into a record.
/// Rows that fail to parse are logged and skipped; a sheet without a single
/// valid row is an error.
pub fn normalize_sheet(
    sheet: &Sheet,
    config: &AnalysisConfig,
) -> Result<Vec<ExecutionRecord>, AnalysisError> {
    validate_header(sheet, config)?;

    let columns = &config.columns;
    let mut records = Vec::new();
    let mut dropped = 0;
    for row in (config.header_row as usize + 1)..sheet.row_count() {
        let raw = RawRow {
            row_number: row + 1,
            job_name: sheet.cell(row, columns.job_name.column.index()).clone(),
            agent_name: sheet.cell(row, columns.agent_name.column.index()).clone(),
            start: sheet.cell(row, columns.start.column.index()).clone(),
            end: sheet.cell(row, columns.end.column.index()).clone(),
        };
        if [&raw.job_name, &raw.agent_name, &raw.start, &raw.end].iter().all(|c| c.is_empty()) {
            continue;
        }
        match normalize_row(&raw) {
            Ok(record) => records.push(record),
            Err(rejection) => {
                warn!("dropping row {}: {}", raw.row_number, rejection);
                dropped += 1;
            }
        }
    }

    if records.is_empty() {
        return Err(AnalysisError::empty_dataset(format!(
            "no valid rows found ({} row(s) dropped)",
            dropped
        )));
    }
    info!("normalized {} row(s), dropped {}", records.len(), dropped);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone as _, Utc};

    use super::*;
    use crate::{error::ErrorKind, records::CellValue};

    fn text_row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    fn header() -> Vec<CellValue> {
        text_row(&["Job Name", "Agent Name", "Start Time", "End Time"])
    }

    fn raw(start: CellValue, end: CellValue) -> RawRow {
        RawRow {
            row_number: 2,
            job_name: CellValue::Text(" backup ".into()),
            agent_name: CellValue::Number(7.0),
            start,
            end,
        }
    }

    #[test]
    fn row_with_unparsable_end_is_dropped_but_neighbours_survive() {
        let sheet = Sheet::from_rows(vec![
            header(),
            text_row(&["backup", "a1", "15/03/2024 10:00", "15/03/2024 10:10"]),
            text_row(&["backup", "a1", "15/03/2024 11:00", "whenever"]),
            text_row(&["backup", "a2", "15/03/2024 12:00", "15/03/2024 12:30"]),
        ]);
        let records = normalize_sheet(&sheet, &AnalysisConfig::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].duration_minutes, 10.0);
        assert_eq!(records[1].duration_minutes, 30.0);
        assert_eq!(records[1].agent_name, "a2");
    }

    #[test]
    fn missing_header_label_fails_even_with_good_rows() {
        let sheet = Sheet::from_rows(vec![
            text_row(&["Job Name", "Agent", "Start Time", "End Time"]),
            text_row(&["backup", "a1", "15/03/2024 10:00", "15/03/2024 10:10"]),
        ]);
        let err = normalize_sheet(&sheet, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("\"Agent Name\" in B1"), "{}", err.message);
    }

    #[test]
    fn header_row_beyond_sheet_fails_validation() {
        let config = AnalysisConfig { header_row: 3, ..AnalysisConfig::default() };
        let err = validate_header(&Sheet::from_rows(vec![header()]), &config).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn header_cells_are_trimmed_but_case_sensitive() {
        let padded = Sheet::from_rows(vec![text_row(&[
            " Job Name ",
            "Agent Name",
            "Start Time",
            "End Time",
        ])]);
        assert!(validate_header(&padded, &AnalysisConfig::default()).is_ok());
        let lowercase = Sheet::from_rows(vec![text_row(&[
            "job name",
            "Agent Name",
            "Start Time",
            "End Time",
        ])]);
        assert!(validate_header(&lowercase, &AnalysisConfig::default()).is_err());
    }

    #[test]
    fn no_valid_rows_is_an_empty_dataset() {
        let sheet = Sheet::from_rows(vec![
            header(),
            text_row(&["backup", "a1", "yesterday", "today"]),
            text_row(&["", "", "", ""]),
        ]);
        let err = normalize_sheet(&sheet, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EmptyDataset);
    }

    #[test]
    fn names_are_trimmed_and_stringified() {
        let record = normalize_row(&raw(
            CellValue::Text("2024-03-15 10:00".into()),
            CellValue::Text("2024-03-15 10:45".into()),
        ))
        .unwrap();
        assert_eq!(record.job_name, "backup");
        assert_eq!(record.agent_name, "7");
        assert_eq!(record.start, Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap());
        assert_eq!(record.duration_minutes, 45.0);
    }

    #[test]
    fn missing_names_become_empty_strings() {
        let row = RawRow {
            row_number: 5,
            job_name: CellValue::Empty,
            agent_name: CellValue::Empty,
            start: CellValue::Text("2024-03-15 10:00".into()),
            end: CellValue::Text("2024-03-15 10:05".into()),
        };
        let record = normalize_row(&row).unwrap();
        assert_eq!(record.job_name, "");
        assert_eq!(record.agent_name, "");
    }

    #[test]
    fn rejections_name_the_cause() {
        let bad_start = normalize_row(&raw(CellValue::Empty, CellValue::Number(45366.5)));
        assert_eq!(bad_start, Err(RowRejection::InvalidStart(String::new())));

        let backwards = normalize_row(&raw(
            CellValue::Text("2024-03-15 11:00".into()),
            CellValue::Text("2024-03-15 10:00".into()),
        ));
        assert_eq!(backwards, Err(RowRejection::NegativeDuration(-60.0)));
    }

    #[test]
    fn sub_millisecond_inversions_are_rejected() {
        let from_text = normalize_row(&raw(
            CellValue::Text("15/03/2024 10:30:00.0009".into()),
            CellValue::Text("15/03/2024 10:30:00.0001".into()),
        ));
        assert!(matches!(from_text, Err(RowRejection::NegativeDuration(_))));

        let start = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_nano_opt(10, 30, 0, 900_000)
            .unwrap();
        let end = start - chrono::TimeDelta::nanoseconds(500_000);
        let from_cells = normalize_row(&raw(CellValue::DateTime(start), CellValue::DateTime(end)));
        assert!(matches!(from_cells, Err(RowRejection::NegativeDuration(_))));

        let forwards = normalize_row(&raw(CellValue::DateTime(end), CellValue::DateTime(start)))
            .unwrap();
        assert!(forwards.end >= forwards.start);
    }

    #[test]
    fn data_starts_after_configured_header_row() {
        let config = AnalysisConfig { header_row: 1, ..AnalysisConfig::default() };
        let sheet = Sheet::from_rows(vec![
            text_row(&["Nightly export"]),
            header(),
            text_row(&["backup", "a1", "2024-03-15 10:00", "2024-03-15 10:20"]),
        ]);
        let records = normalize_sheet(&sheet, &config).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_minutes, 20.0);
    }
}
