// src/pipeline.rs

use tracing::{info, instrument, warn};

use crate::config::{Destination, FetchConfig, JobSpec, LedgerConfig, TargetSource};
use crate::error::{Diagnostic, Stage, StoreError};
use crate::extract::{aggregate, pad_rows, Parser};
use crate::fetch::{fetch_all, Transport};
use crate::ledger::{report::render_report, ColumnSlot, Ledger};
use crate::store::{a1::A1Range, LedgerStore};
use crate::types::{ExtractedRow, FailureRecord, RunContext, StatusCode, Target, UNKNOWN};

/// Everything one job run produced. Ledger problems are in `diagnostics`.
#[derive(Debug)]
pub struct RunSummary {
    pub job_id: String,
    pub run_note: String,
    pub targets_loaded: bool,
    pub targets: usize,
    pub rows_written: usize,
    pub failures: Vec<FailureRecord>,
    pub column: ColumnSlot,
    pub runs_today: usize,
    pub report: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    /// A run fails when it had nothing to work on or produced no rows at all.
    pub fn is_ok(&self) -> bool {
        self.targets_loaded && (self.targets == 0 || self.rows_written > 0)
    }
}

pub struct Pipeline<'a> {
    transport: &'a dyn Transport,
    store: &'a dyn LedgerStore,
    fetch: &'a FetchConfig,
    ledger: &'a LedgerConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        store: &'a dyn LedgerStore,
        fetch: &'a FetchConfig,
        ledger: &'a LedgerConfig,
    ) -> Self {
        Self {
            transport,
            store,
            fetch,
            ledger,
        }
    }

    pub fn ledger(&self) -> Ledger<'a> {
        Ledger::new(self.store, self.ledger)
    }

    /// Run `job` with its configured HTML table parser.
    pub async fn run(&self, job: &JobSpec, ctx: &RunContext) -> RunSummary {
        self.run_with_parser(job, &job.parser, ctx).await
    }

    #[instrument(level = "info", skip_all, fields(job = %job.id))]
    pub async fn run_with_parser(
        &self,
        job: &JobSpec,
        parser: &dyn Parser,
        ctx: &RunContext,
    ) -> RunSummary {
        let mut diagnostics = Vec::new();
        let run_note = ctx.run_note();
        info!(%run_note, "job started");

        // 1) targets
        let (targets, targets_loaded, mut failures) = match self.load_targets(&job.targets).await {
            Ok(targets) => (targets, true, Vec::new()),
            Err(e) => {
                warn!(error = %e, "could not load targets");
                let failure = FailureRecord {
                    row: None,
                    label: UNKNOWN.to_string(),
                    period: UNKNOWN.to_string(),
                    status: StatusCode::Error(e.to_string()),
                };
                diagnostics.push(Diagnostic::new(Stage::LoadTargets, e));
                (Vec::new(), false, vec![failure])
            }
        };
        info!(targets = targets.len(), "targets loaded");

        // 2) fetch + extract
        let outcomes = fetch_all(self.transport, &targets, self.fetch).await;
        let mut extraction = aggregate(outcomes, parser, &job.extract);
        failures.append(&mut extraction.failures);

        // 3) destination, independent of ledger bookkeeping
        let mut rows_written = 0;
        if targets_loaded {
            match write_destination(self.store, &job.destination, extraction.rows, &mut diagnostics).await {
                Ok(n) => rows_written = n,
                Err(e) => {
                    warn!(error = %e, "destination write failed");
                    diagnostics.push(Diagnostic::new(Stage::Destination, e));
                }
            }
        }

        // 4) ledger
        let ledger = self.ledger();
        if let Err(d) = ledger.append_failures(&failures, &run_note).await {
            warn!(%d, "could not append failures");
            diagnostics.push(d);
        }

        let column = match ledger.resolve_column(&ctx.job_id).await {
            Ok(slot) => slot,
            Err(d) => {
                warn!(%d, "defaulting to column A");
                diagnostics.push(d);
                ColumnSlot::fallback(&ctx.job_id)
            }
        };

        let runs_today = ledger.runs_today(ctx.today()).await.unwrap_or_else(|d| {
            warn!(%d, "run count unavailable");
            diagnostics.push(d);
            0
        });

        let report = render_report(ctx, &failures, runs_today);
        if let Err(d) = ledger.write_report(&column, &report).await {
            warn!(%d, "could not write run report");
            diagnostics.push(d);
        }

        info!(
            rows = rows_written,
            failures = failures.len(),
            diagnostics = diagnostics.len(),
            "job finished"
        );

        RunSummary {
            job_id: job.id.clone(),
            run_note,
            targets_loaded,
            targets: targets.len(),
            rows_written,
            failures,
            column,
            runs_today,
            report,
            diagnostics,
        }
    }

    /// Targets from the job file, or one per non-blank row of a store range.
    pub async fn load_targets(&self, source: &TargetSource) -> Result<Vec<Target>, StoreError> {
        match source {
            TargetSource::Inline(addresses) => Ok(addresses
                .iter()
                .enumerate()
                .map(|(i, a)| Target::new(a.trim(), i as u32 + 1))
                .collect()),
            TargetSource::Range { sheet_id, range } => {
                let first_row = A1Range::parse(range)?.start_row;
                let sheet_id = sheet_id.as_deref().unwrap_or(&self.ledger.sheet_id);
                let rows = self.store.get_range(sheet_id, range).await?;
                Ok(rows
                    .iter()
                    .enumerate()
                    .filter_map(|(i, row)| {
                        let address = row.first()?.trim();
                        (!address.is_empty()).then(|| Target::new(address, first_row + i as u32))
                    })
                    .collect())
            }
        }
    }
}

/// Overwrite the destination block with `rows`, padded to a common width.
/// The clear range is emptied even when there are no rows, so a run never
/// leaves the previous run's data behind. Clearing and the header row are
/// best-effort and only add diagnostics.
pub async fn write_destination(
    store: &dyn LedgerStore,
    dest: &Destination,
    mut rows: Vec<ExtractedRow>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<usize, StoreError> {
    let start = A1Range::parse(&dest.start_cell)?;

    if let Some(clear) = &dest.clear_range {
        if let Err(e) = store.clear_range(&dest.sheet_id, clear).await {
            warn!(range = %clear, error = %e, "could not clear destination");
            diagnostics.push(Diagnostic::new(Stage::Destination, e));
        }
    }
    if rows.is_empty() {
        warn!("no data rows to write");
        return Ok(0);
    }

    if let (Some(header), Some(cell)) = (&dest.header, &dest.header_cell) {
        if let Err(e) = store
            .update_range(&dest.sheet_id, cell, &[header.clone()])
            .await
        {
            warn!(range = %cell, error = %e, "could not write destination header");
            diagnostics.push(Diagnostic::new(Stage::Destination, e));
        }
    }

    let width = pad_rows(&mut rows);
    let range = start.block(width, rows.len());
    store.update_range(&dest.sheet_id, &range, &rows).await?;
    info!(%range, rows = rows.len(), width, "wrote destination block");
    Ok(rows.len())
}
