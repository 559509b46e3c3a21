use std::{collections::HashSet, fmt::Display, fs::File, io::BufReader, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnalysisError, ErrorKind};

/// The last column a spreadsheet can address (`XFD`).
const MAX_COLUMN_INDEX: u32 = 16_383;

/// A spreadsheet column, written as letters (`A`, `B`, ..., `AA`) in
/// configuration files and held as a 0-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef(u32);

impl ColumnRef {
    pub fn from_index(index: u32) -> Option<Self> {
        (index <= MAX_COLUMN_INDEX).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FromStr for ColumnRef {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let letters = s.trim();
        if letters.is_empty() || letters.len() > 3 {
            return Err(AnalysisError::config(format!("invalid column \"{s}\"")));
        }
        let mut index: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(AnalysisError::config(format!("invalid column \"{s}\"")));
            }
            index = index * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        ColumnRef::from_index(index - 1)
            .ok_or_else(|| AnalysisError::config(format!("column \"{s}\" is past XFD")))
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.0 + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        write!(f, "{}", letters.iter().rev().collect::<String>())
    }
}

/// Where a field lives and which header label must sit above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column: ColumnRef,
    pub label: String,
}

impl ColumnSpec {
    fn new(column: u32, label: &str) -> Self {
        Self { column: ColumnRef(column), label: label.to_owned() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub job_name: ColumnSpec,
    pub agent_name: ColumnSpec,
    pub start: ColumnSpec,
    pub end: ColumnSpec,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            job_name: ColumnSpec::new(0, "Job Name"),
            agent_name: ColumnSpec::new(1, "Agent Name"),
            start: ColumnSpec::new(2, "Start Time"),
            end: ColumnSpec::new(3, "End Time"),
        }
    }
}

impl ColumnLayout {
    /// The four columns paired with a short name for diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ColumnSpec)> {
        [
            ("job name", &self.job_name),
            ("agent name", &self.agent_name),
            ("start", &self.start),
            ("end", &self.end),
        ]
        .into_iter()
    }
}

/// Everything the pipeline needs to know about the input layout and the
/// overdue rule. Built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 0-based index of the header row. Data starts on the row after it.
    pub header_row: u32,
    pub columns: ColumnLayout,
    /// `k` in the overdue threshold `mean + k * stddev`.
    pub threshold_multiplier: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { header_row: 0, columns: ColumnLayout::default(), threshold_multiplier: 1.0 }
    }
}

impl AnalysisConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            AnalysisError::with_source(
                ErrorKind::Config,
                format!("error opening config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            AnalysisError::with_source(
                ErrorKind::Config,
                format!("error deserializing config file {}", path.display()),
                e,
            )
        })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            AnalysisError::with_source(ErrorKind::Config, "invalid config", e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_threshold_multiplier(
        self,
        threshold_multiplier: f64,
    ) -> Result<Self, AnalysisError> {
        let config = Self { threshold_multiplier, ..self };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.threshold_multiplier.is_finite() || self.threshold_multiplier < 0.0 {
            return Err(AnalysisError::config(format!(
                "threshold multiplier must be a non-negative number, got {}",
                self.threshold_multiplier
            )));
        }
        let mut seen = HashSet::new();
        for (name, spec) in self.columns.iter() {
            if !seen.insert(spec.column) {
                return Err(AnalysisError::config(format!(
                    "column {} is assigned to more than one field (again for {})",
                    spec.column, name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_round_trip() {
        for (letters, index) in [("A", 0), ("Z", 25), ("AA", 26), ("AZ", 51), ("XFD", 16_383)] {
            let column: ColumnRef = letters.parse().unwrap();
            assert_eq!(column.index(), index);
            assert_eq!(column.to_string(), letters);
        }
        assert_eq!("c".parse::<ColumnRef>().unwrap().index(), 2);
    }

    #[test]
    fn bad_column_letters_are_rejected() {
        for letters in ["", "1", "A1", "XFE", "ABCD"] {
            assert!(letters.parse::<ColumnRef>().is_err(), "{letters} should be rejected");
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AnalysisConfig::from_json_str(r#"{ "threshold_multiplier": 2.0 }"#).unwrap();
        assert_eq!(config.threshold_multiplier, 2.0);
        assert_eq!(config.columns, ColumnLayout::default());
        assert_eq!(config.header_row, 0);
    }

    #[test]
    fn layout_is_read_from_letters() {
        let config = AnalysisConfig::from_json_str(
            r#"{
                "header_row": 2,
                "columns": {
                    "job_name": { "column": "B", "label": "Job" },
                    "agent_name": { "column": "E", "label": "Host" },
                    "start": { "column": "F", "label": "Started" },
                    "end": { "column": "G", "label": "Ended" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.header_row, 2);
        assert_eq!(config.columns.agent_name.column.index(), 4);
        assert_eq!(config.columns.end.label, "Ended");
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = AnalysisConfig::from_json_str(
            r#"{ "columns": { "end": { "column": "A", "label": "End Time" } } }"#,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let err = AnalysisConfig::default().with_threshold_multiplier(-1.0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(AnalysisConfig::default().with_threshold_multiplier(f64::NAN).is_err());
    }

    #[test]
    fn default_config_serializes_with_letters() {
        let json = serde_json::to_value(AnalysisConfig::default()).unwrap();
        assert_eq!(json["columns"]["start"]["column"], "C");
        assert_eq!(json["columns"]["start"]["label"], "Start Time");
    }
}
