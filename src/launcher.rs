// src/launcher.rs

use chrono::{FixedOffset, Utc};
use std::fmt;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{JobSpec, TargetSource};
use crate::pipeline::{Pipeline, RunSummary};
use crate::store::a1::A1Range;
use crate::types::{RunContext, TIMESTAMP_FORMAT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Exec,
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Ok,
    Fail,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Action::Exec => "EXEC",
            Action::Skip => "SKIP",
        })
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            JobOutcome::Ok => "OK",
            JobOutcome::Fail => "FAIL",
        })
    }
}

/// One line of the launcher's run log.
#[derive(Debug)]
pub struct LaunchEntry {
    pub job_id: String,
    pub action: Action,
    pub outcome: JobOutcome,
    pub duration_ms: u64,
    pub note: String,
    pub summary: Option<RunSummary>,
}

impl LaunchEntry {
    pub fn log_row(&self, timestamp: &str) -> Vec<String> {
        vec![
            timestamp.to_string(),
            self.job_id.clone(),
            self.action.to_string(),
            self.outcome.to_string(),
            self.duration_ms.to_string(),
            self.note.clone(),
        ]
    }
}

/// Reason a job cannot be run, if any.
pub fn validate(job: &JobSpec) -> Result<(), String> {
    if job.id.trim().is_empty() {
        return Err("EMPTY_ID".to_string());
    }
    if job.destination.sheet_id.trim().is_empty() {
        return Err("NO_DESTINATION_SHEET".to_string());
    }
    A1Range::parse(&job.destination.start_cell)
        .map_err(|e| format!("BAD_START_CELL: {}", e))?;
    match &job.targets {
        TargetSource::Inline(addresses) if addresses.is_empty() => Err("NO_TARGETS".to_string()),
        TargetSource::Range { range, .. } => A1Range::parse(range)
            .map(|_| ())
            .map_err(|e| format!("BAD_TARGET_RANGE: {}", e)),
        TargetSource::Inline(_) => Ok(()),
    }
}

fn note_for(summary: &RunSummary) -> String {
    let mut note = format!(
        "targets={} rows={} failures={}",
        summary.targets,
        summary.rows_written,
        summary.failures.len()
    );
    if !summary.diagnostics.is_empty() {
        let diags: Vec<String> = summary.diagnostics.iter().map(|d| d.to_string()).collect();
        note.push_str(" | ");
        note.push_str(&diags.join("; "));
    }
    note
}

/// Run `jobs` one after another, logging each to the run-log tab.
/// `job_path` names a job in run notes.
pub async fn run_jobs(
    pipeline: &Pipeline<'_>,
    jobs: &[JobSpec],
    job_path: impl Fn(&JobSpec) -> String,
    runner_kind: &str,
    offset: FixedOffset,
) -> Vec<LaunchEntry> {
    let ledger = pipeline.ledger();
    let mut entries = Vec::with_capacity(jobs.len());

    for job in jobs {
        let entry = match validate(job) {
            Err(reason) => {
                warn!(job = %job.id, %reason, "skipping job");
                LaunchEntry {
                    job_id: job.id.clone(),
                    action: Action::Skip,
                    outcome: JobOutcome::Fail,
                    duration_ms: 0,
                    note: reason,
                    summary: None,
                }
            }
            Ok(()) => {
                info!(job = %job.id, "executing job");
                let start = Instant::now();
                let ctx = RunContext::start(&job.id, job_path(job), offset, runner_kind);
                let summary = pipeline.run(job, &ctx).await;
                let outcome = if summary.is_ok() {
                    JobOutcome::Ok
                } else {
                    JobOutcome::Fail
                };
                LaunchEntry {
                    job_id: job.id.clone(),
                    action: Action::Exec,
                    outcome,
                    duration_ms: start.elapsed().as_millis() as u64,
                    note: note_for(&summary),
                    summary: Some(summary),
                }
            }
        };

        let timestamp = Utc::now()
            .with_timezone(&offset)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        if let Err(d) = ledger.append_run_log(entry.log_row(&timestamp)).await {
            error!(job = %entry.job_id, %d, "run log append failed");
        }
        match entry.outcome {
            JobOutcome::Ok => info!(job = %entry.job_id, ms = entry.duration_ms, "OK"),
            JobOutcome::Fail => warn!(job = %entry.job_id, action = %entry.action, note = %entry.note, "FAIL"),
        }
        entries.push(entry);
    }

    entries
}

/// `true` when every job ran and succeeded.
pub fn all_ok(entries: &[LaunchEntry]) -> bool {
    entries.iter().all(|e| e.outcome == JobOutcome::Ok)
}
