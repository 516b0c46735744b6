// src/store/mod.rs

use async_trait::async_trait;

use crate::error::StoreError;

pub mod a1;
pub mod memory;
pub mod sheets;

pub use memory::MemoryStore;
pub use sheets::SheetsStore;

/// Range-addressed tabular store backing the ledger and the destination tabs.
/// Ranges use A1 notation including the tab, e.g. `run!C3:C12`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cells in `range`, trailing empty cells and rows omitted.
    async fn get_range(&self, sheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, StoreError>;

    /// Overwrite cells starting at the top-left of `range`.
    async fn update_range(
        &self,
        sheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), StoreError>;

    /// Append rows after the last occupied row of the table at `range`.
    async fn append_rows(
        &self,
        sheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), StoreError>;

    async fn clear_range(&self, sheet_id: &str, range: &str) -> Result<(), StoreError>;

    async fn list_tabs(&self, sheet_id: &str) -> Result<Vec<String>, StoreError>;

    async fn create_tab(&self, sheet_id: &str, name: &str) -> Result<(), StoreError>;
}
