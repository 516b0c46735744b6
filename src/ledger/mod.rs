// src/ledger/mod.rs
//! Shared ledger protocol: failure log, per-job run columns, run counting and
//! the fixed-shape run report. Every operation is best-effort and reports
//! problems as a [`Diagnostic`] instead of failing the job.

use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::error::{Diagnostic, Stage, StoreError};
use crate::store::{a1, LedgerStore};

pub mod columns;
pub mod failure_log;
pub mod report;
pub mod runs;

pub use columns::ColumnSlot;

/// Header of the launcher's run-log tab.
pub const RUN_LOG_HEADER: [&str; 6] = ["Timestamp", "Job", "Action", "Status", "Duration(ms)", "Note"];

pub struct Ledger<'a> {
    store: &'a dyn LedgerStore,
    config: &'a LedgerConfig,
}

impl<'a> Ledger<'a> {
    pub fn new(store: &'a dyn LedgerStore, config: &'a LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        self.config
    }

    async fn has_tab(&self, tab: &str) -> Result<bool, StoreError> {
        let tabs = self.store.list_tabs(&self.config.sheet_id).await?;
        Ok(tabs.iter().any(|t| t == tab))
    }

    /// Create `tab` if it is missing. Returns whether this call created it.
    /// Losing a creation race to another job counts as already present.
    pub async fn ensure_tab(&self, tab: &str) -> Result<bool, StoreError> {
        if self.has_tab(tab).await? {
            return Ok(false);
        }
        match self.store.create_tab(&self.config.sheet_id, tab).await {
            Ok(()) => {
                info!(%tab, "created ledger tab");
                Ok(true)
            }
            Err(e) => {
                if self.has_tab(tab).await? {
                    debug!(%tab, error = %e, "tab created concurrently");
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Create `tab` with `header` in row 1 if it is missing.
    pub async fn ensure_tab_with_header(&self, tab: &str, header: &[&str]) -> Result<(), StoreError> {
        if self.ensure_tab(tab).await? {
            let range = a1::qualify(
                tab,
                &format!("A1:{}1", a1::column_letter(header.len() as u32)),
            );
            let values = vec![header.iter().map(|h| h.to_string()).collect()];
            self.store
                .update_range(&self.config.sheet_id, &range, &values)
                .await?;
        }
        Ok(())
    }

    /// Append one row to the launcher's run log.
    pub async fn append_run_log(&self, row: Vec<String>) -> Result<(), Diagnostic> {
        let tab = &self.config.run_log_tab;
        let diag = |e: StoreError| Diagnostic::new(Stage::RunLog, e);
        self.ensure_tab_with_header(tab, &RUN_LOG_HEADER)
            .await
            .map_err(diag)?;
        self.store
            .append_rows(&self.config.sheet_id, &a1::qualify(tab, "A2"), &[row])
            .await
            .map_err(diag)
    }
}
