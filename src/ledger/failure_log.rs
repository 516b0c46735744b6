// src/ledger/failure_log.rs

use tracing::info;

use super::Ledger;
use crate::error::{Diagnostic, Stage, StoreError};
use crate::store::a1;
use crate::types::FailureRecord;

/// Fixed header row of the failure log tab.
pub const FAILURE_HEADER: [&str; 5] = ["row", "label", "period", "status", "run_note"];

impl Ledger<'_> {
    /// Append every failure, stamped with `run_note`, to the failure log.
    /// Returns the number of rows appended.
    pub async fn append_failures(
        &self,
        failures: &[FailureRecord],
        run_note: &str,
    ) -> Result<usize, Diagnostic> {
        if failures.is_empty() {
            return Ok(0);
        }
        let tab = &self.config.failure_tab;
        let diag = |e: StoreError| Diagnostic::new(Stage::FailureLog, e);

        self.ensure_tab_with_header(tab, &FAILURE_HEADER)
            .await
            .map_err(diag)?;
        let rows: Vec<Vec<String>> = failures.iter().map(|f| f.to_log_row(run_note)).collect();
        self.store
            .append_rows(&self.config.sheet_id, &a1::qualify(tab, "A2"), &rows)
            .await
            .map_err(diag)?;

        info!(rows = rows.len(), %tab, "appended failure rows");
        Ok(rows.len())
    }
}
