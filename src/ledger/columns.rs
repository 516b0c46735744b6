// src/ledger/columns.rs

use tracing::{debug, info, warn};

use super::Ledger;
use crate::error::{Diagnostic, Stage, StoreError};
use crate::store::a1;

/// A job's column in the run tab. 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSlot {
    pub job_identity: String,
    pub column_index: u32,
}

impl ColumnSlot {
    /// Column `A`, used when the header row cannot be read or written.
    pub fn fallback(job_identity: &str) -> Self {
        Self {
            job_identity: job_identity.to_string(),
            column_index: 1,
        }
    }

    pub fn letter(&self) -> String {
        a1::column_letter(self.column_index)
    }
}

/// Position of `identity` in `headers`, or the slot it should claim:
/// the first empty cell, else the one after the last. The flag is `true`
/// when the slot is new.
pub fn find_or_allocate(headers: &[String], identity: &str) -> (u32, bool) {
    if let Some(i) = headers.iter().position(|h| h.trim() == identity) {
        return (i as u32 + 1, false);
    }
    let free = headers
        .iter()
        .position(|h| h.trim().is_empty())
        .unwrap_or(headers.len());
    (free as u32 + 1, true)
}

/// Claim attempts before giving up on a contended header row.
const CLAIM_ATTEMPTS: usize = 3;

impl Ledger<'_> {
    /// Find or claim the run-tab column headed by `identity`.
    ///
    /// A new claim is read back after writing. If another job overwrote the
    /// cell in between, the header row is re-read and the next free cell is
    /// tried. Two processes racing on the same new identity may still both
    /// claim a column; later runs settle on the leftmost one.
    pub async fn resolve_column(&self, identity: &str) -> Result<ColumnSlot, Diagnostic> {
        self.claim_column(identity)
            .await
            .map_err(|e| Diagnostic::new(Stage::ColumnRegistry, e))
    }

    async fn header_row(&self) -> Result<Vec<String>, StoreError> {
        let header = self
            .store
            .get_range(&self.config.sheet_id, &a1::qualify(&self.config.run_tab, "1:1"))
            .await?;
        Ok(header.into_iter().next().unwrap_or_default())
    }

    async fn claim_column(&self, identity: &str) -> Result<ColumnSlot, StoreError> {
        let tab = &self.config.run_tab;
        self.ensure_tab(tab).await?;

        for attempt in 1..=CLAIM_ATTEMPTS {
            let cells = self.header_row().await?;
            let (column_index, is_new) = find_or_allocate(&cells, identity);
            let slot = ColumnSlot {
                job_identity: identity.to_string(),
                column_index,
            };
            if !is_new {
                debug!(%identity, column = %slot.letter(), "found run column");
                return Ok(slot);
            }

            let cell = a1::qualify(tab, &format!("{}1", slot.letter()));
            self.store
                .update_range(&self.config.sheet_id, &cell, &[vec![identity.to_string()]])
                .await?;

            let after = self.header_row().await?;
            let held = after
                .get(column_index as usize - 1)
                .is_some_and(|h| h.trim() == identity);
            if held {
                info!(%identity, column = %slot.letter(), "claimed run column");
                return Ok(slot);
            }
            warn!(%identity, column = %slot.letter(), attempt, "run column taken by another job");
        }

        Err(StoreError::Conflict(a1::qualify(tab, "1:1")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::store::{LedgerStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Another job overwrites the first header cell written.
    struct ContendedHeader {
        inner: MemoryStore,
        taken: AtomicBool,
    }

    #[async_trait]
    impl LedgerStore for ContendedHeader {
        async fn get_range(&self, sheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
            self.inner.get_range(sheet_id, range).await
        }

        async fn update_range(
            &self,
            sheet_id: &str,
            range: &str,
            values: &[Vec<String>],
        ) -> Result<(), StoreError> {
            self.inner.update_range(sheet_id, range, values).await?;
            if range.ends_with("1") && !self.taken.swap(true, Ordering::SeqCst) {
                self.inner
                    .update_range(sheet_id, range, &[vec!["labour".to_string()]])
                    .await?;
            }
            Ok(())
        }

        async fn append_rows(
            &self,
            sheet_id: &str,
            range: &str,
            rows: &[Vec<String>],
        ) -> Result<(), StoreError> {
            self.inner.append_rows(sheet_id, range, rows).await
        }

        async fn clear_range(&self, sheet_id: &str, range: &str) -> Result<(), StoreError> {
            self.inner.clear_range(sheet_id, range).await
        }

        async fn list_tabs(&self, sheet_id: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_tabs(sheet_id).await
        }

        async fn create_tab(&self, sheet_id: &str, name: &str) -> Result<(), StoreError> {
            self.inner.create_tab(sheet_id, name).await
        }
    }

    fn headers(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn allocation_rules() {
        assert_eq!(find_or_allocate(&headers(&[]), "a"), (1, true));
        assert_eq!(find_or_allocate(&headers(&["x", " a "]), "a"), (2, false));
        assert_eq!(find_or_allocate(&headers(&["x", "", "y"]), "a"), (2, true));
        assert_eq!(find_or_allocate(&headers(&["x", "y"]), "a"), (3, true));
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let store = MemoryStore::new();
        let cfg = LedgerConfig::new("ledger");
        let ledger = Ledger::new(&store, &cfg);

        let first = ledger.resolve_column("works").await.unwrap();
        let second = ledger.resolve_column("works").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.cell("ledger", "run", 1, first.column_index).as_deref(),
            Some("works")
        );
    }

    #[tokio::test]
    async fn new_job_takes_first_gap() {
        let store = MemoryStore::new().with_tab("ledger", "run");
        store.seed("ledger", "run!A1", &[&["labour", "", "master"]]);
        let cfg = LedgerConfig::new("ledger");
        let ledger = Ledger::new(&store, &cfg);

        let slot = ledger.resolve_column("works").await.unwrap();
        assert_eq!(slot.letter(), "B");

        let slot = ledger.resolve_column("link").await.unwrap();
        assert_eq!(slot.column_index, 4);
        assert_eq!(ledger.resolve_column("master").await.unwrap().column_index, 3);
    }

    #[tokio::test]
    async fn overwritten_claim_moves_to_next_free_column() {
        let store = ContendedHeader {
            inner: MemoryStore::new().with_tab("ledger", "run"),
            taken: AtomicBool::new(false),
        };
        let cfg = LedgerConfig::new("ledger");
        let ledger = Ledger::new(&store, &cfg);

        let slot = ledger.resolve_column("works").await.unwrap();

        assert_eq!(slot.letter(), "B");
        assert_eq!(store.inner.rows("ledger", "run")[0], ["labour", "works"]);
    }

    #[tokio::test]
    async fn store_failure_is_a_diagnostic() {
        let store = MemoryStore::new();
        store.fail_sheet("ledger");
        let cfg = LedgerConfig::new("ledger");
        let ledger = Ledger::new(&store, &cfg);

        let err = ledger.resolve_column("works").await.unwrap_err();
        assert_eq!(err.stage, Stage::ColumnRegistry);
        assert_eq!(ColumnSlot::fallback("works").letter(), "A");
    }
}
