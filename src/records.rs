use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;

pub type Timestamp = DateTime<Utc>;

/// A single spreadsheet cell, already decoded from whichever file format it
/// came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell the way a user would read it in the spreadsheet,
    /// trimmed. Integral numbers print without a fractional part.
    pub fn to_trimmed_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.trim().to_owned(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(text.to_owned())
        }
    }
}

/// The four configured cells of one data row.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based row number in the source sheet, for diagnostics.
    pub row_number: usize,
    pub job_name: CellValue,
    pub agent_name: CellValue,
    pub start: CellValue,
    pub end: CellValue,
}

/// One job run. Only constructed by the row normalizer, which guarantees
/// `end >= start` and a finite, non-negative duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub job_name: String,
    pub agent_name: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub duration_minutes: f64,
}

impl ExecutionRecord {
    /// Returns `None` unless `end` is at or after `start`.
    pub fn new(
        job_name: String,
        agent_name: String,
        start: Timestamp,
        end: Timestamp,
    ) -> Option<Self> {
        if end < start {
            return None;
        }
        let duration_minutes = into_minutes(end - start);
        Some(Self { job_name, agent_name, start, end, duration_minutes })
    }
}

pub fn into_minutes(delta: TimeDelta) -> f64 {
    const MILLIS_PER_MINUTE: f64 = 60_000.0;
    delta.num_milliseconds() as f64 / MILLIS_PER_MINUTE
}
