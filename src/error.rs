// src/error.rs

use std::fmt;
use thiserror::Error;

use crate::types::StatusCode;

/// Failure of a single fetch attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("non-success status {0}")]
    Status(u16),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Short symbolic code recorded in the failure log (`ERROR:<code>`).
    pub fn code(&self) -> String {
        match self {
            TransportError::Timeout => "TIMEOUT".to_string(),
            TransportError::Status(status) => format!("HTTP_{}", status),
            TransportError::Connect(_) => "CONNECT".to_string(),
            TransportError::Other(msg) => msg.clone(),
        }
    }
}

/// Structural problems found while extracting rows from fetched content.
/// These are never retried: the content is already in hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("expected at least {expected} tables, found {found}")]
    LessThanExpectedStructure { expected: usize, found: usize },
    #[error("table has no data rows")]
    NoRowsInTable,
    #[error("document produced no data")]
    NoData,
    #[error("page has no hyperlinks")]
    NoLinks,
}

impl ParseFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            ParseFailure::LessThanExpectedStructure { .. } => StatusCode::LessThanExpectedStructure,
            ParseFailure::NoRowsInTable => StatusCode::NoRowsInTable,
            ParseFailure::NoData => StatusCode::NoData,
            ParseFailure::NoLinks => StatusCode::NoLinks,
        }
    }
}

/// Errors raised by a [`crate::store::LedgerStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("store request failed: {0}")]
    Request(String),
    #[error("malformed store response: {0}")]
    Malformed(String),
    #[error("invalid range `{0}`")]
    Range(String),
    #[error("write to `{0}` kept being overwritten")]
    Conflict(String),
}

/// Where in a job run a non-fatal problem happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    LoadTargets,
    Destination,
    FailureLog,
    ColumnRegistry,
    RunCounter,
    RunReport,
    RunLog,
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Stage::LoadTargets => "load_targets",
            Stage::Destination => "destination",
            Stage::FailureLog => "failure_log",
            Stage::ColumnRegistry => "column_registry",
            Stage::RunCounter => "run_counter",
            Stage::RunReport => "run_report",
            Stage::RunLog => "run_log",
        }
    }
}

/// A swallowed, best-effort failure surfaced to the caller instead of aborting the job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, err: impl fmt::Display) -> Self {
        Self {
            stage,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage.as_str(), self.message)
    }
}
