use std::{
    io::{Cursor, Read},
    path::Path,
};

use calamine::{open_workbook_auto_from_rs, Data, Reader as _};
use tracing::debug;

use crate::{error::AnalysisError, records::CellValue};

/// The first worksheet of an input file as a grid addressed from `A1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Workbook,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(FileFormat::Workbook),
            _ => None,
        }
    }
}

impl Sheet {
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells outside the grid read as [`CellValue::Empty`].
    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.rows.get(row).and_then(|cells| cells.get(column)).unwrap_or(EMPTY)
    }

    /// Decodes the bytes of `path` according to its extension.
    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, AnalysisError> {
        match FileFormat::from_path(path) {
            Some(FileFormat::Csv) => Self::from_csv_reader(bytes.as_slice())
                .map_err(|e| AnalysisError::file_read("error parsing CSV", e)),
            Some(FileFormat::Workbook) => Self::from_workbook_bytes(bytes),
            None => Err(AnalysisError::file_read(
                "unsupported file type",
                "expected one of .csv, .xlsx, .xlsm, .xlsb, .xls, .ods",
            )),
        }
    }

    pub fn from_csv_reader(reader: impl Read) -> Result<Self, csv::Error> {
        let mut reader =
            csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(reader);
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(CellValue::from).collect());
        }
        debug!("read {} CSV rows", rows.len());
        Ok(Self { rows })
    }

    pub fn from_workbook_bytes(bytes: Vec<u8>) -> Result<Self, AnalysisError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| AnalysisError::file_read("error opening workbook", e))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                AnalysisError::file_read("error reading workbook", "workbook has no sheets")
            })?
            .map_err(|e| AnalysisError::file_read("error reading first sheet", e))?;

        // the range starts at the first used cell, so re-anchor it at A1
        let Some((last_row, last_column)) = range.end() else {
            return Ok(Self::default());
        };
        let rows = (0..=last_row)
            .map(|row| {
                (0..=last_column)
                    .map(|column| {
                        range
                            .get_value((row, column))
                            .map(CellValue::from)
                            .unwrap_or(CellValue::Empty)
                    })
                    .collect()
            })
            .collect::<Vec<Vec<_>>>();
        debug!("read {} workbook rows", rows.len());
        Ok(Self { rows })
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::String(text) | Data::DateTimeIso(text) => CellValue::from(text.as_str()),
            Data::Float(n) => CellValue::Number(*n),
            Data::Int(n) => CellValue::Number(*n as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => {
                dt.as_datetime().map(CellValue::DateTime).unwrap_or(CellValue::Number(dt.as_f64()))
            }
            _ => CellValue::Empty,
        }
    }
}
