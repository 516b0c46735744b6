// src/config.rs

use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::extract::{ExtractConfig, ParserSpec};

/// Knobs for the target fetcher. Passed explicitly, never read from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Targets fetched concurrently per batch.
    pub concurrency: usize,
    /// Retries after the first failed attempt.
    pub retries: u32,
    pub timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_step_ms: u64,
    /// Pause between consecutive batches.
    pub batch_pause_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retries: 3,
            timeout_ms: 20_000,
            backoff_base_ms: 500,
            backoff_step_ms: 500,
            batch_pause_ms: 300,
            user_agent: "Mozilla/5.0 (compatible; tablescrape/0.1)".to_string(),
        }
    }
}

/// Where the shared ledger lives and how its tabs are named.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub sheet_id: String,
    #[serde(default = "default_failure_tab")]
    pub failure_tab: String,
    #[serde(default = "default_run_tab")]
    pub run_tab: String,
    #[serde(default = "default_run_log_tab")]
    pub run_log_tab: String,
    /// Offset used for run timestamps and for deciding what "today" is.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

fn default_failure_tab() -> String {
    "SCRAPE_STATUS".to_string()
}

fn default_run_tab() -> String {
    "run".to_string()
}

fn default_run_log_tab() -> String {
    "Runs".to_string()
}

fn default_utc_offset_minutes() -> i32 {
    330
}

impl LedgerConfig {
    pub fn new(sheet_id: impl Into<String>) -> Self {
        Self {
            sheet_id: sheet_id.into(),
            failure_tab: default_failure_tab(),
            run_tab: default_run_tab(),
            run_log_tab: default_run_log_tab(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Where a job's targets come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    /// Addresses listed in the job file; origin rows are 1-based list positions.
    Inline(Vec<String>),
    /// One address per row of a store range, e.g. `Sheet3!B3:B`.
    Range {
        #[serde(default)]
        sheet_id: Option<String>,
        range: String,
    },
}

/// Destination tab for extracted rows.
#[derive(Debug, Clone, Deserialize)]
pub struct Destination {
    pub sheet_id: String,
    /// Top-left cell of the written block, e.g. `Sheet5!C3`.
    pub start_cell: String,
    /// Cleared before writing (best-effort).
    #[serde(default)]
    pub clear_range: Option<String>,
    #[serde(default)]
    pub header: Option<Vec<String>>,
    #[serde(default)]
    pub header_cell: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    /// Job identity; names the job's column in the run tab.
    pub id: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub targets: TargetSource,
    pub destination: Destination,
    #[serde(default)]
    pub parser: ParserSpec,
    #[serde(default)]
    pub extract: ExtractConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub jobs: Vec<JobSpec>,
}

impl JobFile {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: JobFile = serde_yaml::from_str(text).context("parsing job file")?;
        let offset = file.ledger.utc_offset_minutes.checked_mul(60);
        if offset.and_then(FixedOffset::east_opt).is_none() {
            bail!(
                "ledger.utc_offset_minutes {} is out of range",
                file.ledger.utc_offset_minutes
            );
        }
        if file.fetch.concurrency == 0 {
            bail!("fetch.concurrency must be at least 1");
        }
        for job in &file.jobs {
            job.parser
                .validate()
                .with_context(|| format!("job {}: bad metadata pattern", job.id))?;
        }
        Ok(file)
    }
}

/// Read and validate a YAML job file.
pub fn load_job_file(path: impl AsRef<Path>) -> Result<JobFile> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    JobFile::from_yaml(&text).with_context(|| format!("loading {:?}", path))
}
