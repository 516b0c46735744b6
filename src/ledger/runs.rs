// src/ledger/runs.rs

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::debug;

use super::Ledger;
use crate::error::{Diagnostic, Stage, StoreError};
use crate::store::a1;

/// Column of the run note within a failure log row.
const RUN_NOTE_COLUMN: usize = 4;

/// Date a run note was stamped with. The timestamp is the second
/// `|`-separated field and may be ISO (`2025-01-01T…`) or day-first
/// (`1/9/2025, 10:00:00 am`).
pub fn run_date(note: &str) -> Option<NaiveDate> {
    let stamp = note.split('|').nth(1)?.trim();
    let date = stamp
        .split(|c: char| c == ',' || c == ' ' || c == 'T')
        .next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%d/%m/%Y"))
        .ok()
}

/// Distinct run notes dated `today`. Many failure rows of one run count once.
pub fn count_runs_today<'a>(notes: impl IntoIterator<Item = &'a str>, today: NaiveDate) -> usize {
    notes
        .into_iter()
        .filter(|note| run_date(note) == Some(today))
        .collect::<HashSet<_>>()
        .len()
}

impl Ledger<'_> {
    /// Count of distinct runs logged today, read from the failure log.
    /// A ledger without a failure log has no runs to count.
    pub async fn runs_today(&self, today: NaiveDate) -> Result<usize, Diagnostic> {
        let diag = |e: StoreError| Diagnostic::new(Stage::RunCounter, e);
        let tab = &self.config.failure_tab;
        let tabs = self
            .store
            .list_tabs(&self.config.sheet_id)
            .await
            .map_err(diag)?;
        if !tabs.contains(tab) {
            return Ok(0);
        }
        let rows = self
            .store
            .get_range(&self.config.sheet_id, &a1::qualify(tab, "A2:E"))
            .await
            .map_err(diag)?;
        let count = count_runs_today(
            rows.iter()
                .filter_map(|r| r.get(RUN_NOTE_COLUMN))
                .map(String::as_str),
            today,
        );
        debug!(%today, count, "runs today");
        Ok(count)
    }
}
