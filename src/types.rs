// src/types.rs

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::fmt;

/// Timestamp layout used inside run notes and the run report.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %I:%M:%S %P";

/// Placeholder for a label or period that could not be determined.
pub const UNKNOWN: &str = "UNKNOWN";

/// One ordered sequence of cells extracted from a table row.
pub type ExtractedRow = Vec<String>;

/// One unit of fetchable work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    /// Row the address was read from, echoed back in failure records.
    pub origin_row: u32,
}

impl Target {
    pub fn new(address: impl Into<String>, origin_row: u32) -> Self {
        Self {
            address: address.into(),
            origin_row,
        }
    }
}

/// Why a target produced no data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusCode {
    NoData,
    NoRowsInTable,
    InvalidTarget,
    LessThanExpectedStructure,
    NoLinks,
    Error(String),
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::NoData => f.write_str("NO_DATA"),
            StatusCode::NoRowsInTable => f.write_str("NO_ROWS_IN_TABLE"),
            StatusCode::InvalidTarget => f.write_str("INVALID_TARGET"),
            StatusCode::LessThanExpectedStructure => f.write_str("LESS_THAN_EXPECTED_STRUCTURE"),
            StatusCode::NoLinks => f.write_str("NO_LINKS"),
            StatusCode::Error(detail) => write!(f, "ERROR:{}", detail),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    pub row: Option<u32>,
    pub label: String,
    pub period: String,
    pub status: StatusCode,
}

impl FailureRecord {
    /// Row layout of the failure log: `[row, label, period, status, run_note]`.
    pub fn to_log_row(&self, run_note: &str) -> Vec<String> {
        vec![
            self.row.map(|r| r.to_string()).unwrap_or_default(),
            self.label.clone(),
            self.period.clone(),
            self.status.to_string(),
            run_note.to_string(),
        ]
    }
}

/// Identity of one job execution. The run note rendered from it is the
/// correlation key between the failure log and the run report.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub job_id: String,
    pub job_path: String,
    pub started_at: DateTime<FixedOffset>,
    pub runner_kind: String,
}

impl RunContext {
    /// Start a run now, in the ledger's configured offset.
    pub fn start(
        job_id: impl Into<String>,
        job_path: impl Into<String>,
        offset: FixedOffset,
        runner_kind: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_path: job_path.into(),
            started_at: Utc::now().with_timezone(&offset),
            runner_kind: runner_kind.into(),
        }
    }

    pub fn timestamp(&self) -> String {
        self.started_at.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn run_note(&self) -> String {
        format!(
            "{} | {} | {}",
            self.job_path,
            self.timestamp(),
            self.runner_kind
        )
    }

    /// Calendar date of the run in the ledger's offset.
    pub fn today(&self) -> NaiveDate {
        self.started_at.date_naive()
    }
}
