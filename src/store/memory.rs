// src/store/memory.rs

use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use super::{a1::A1Range, LedgerStore};
use crate::error::StoreError;

type Grid = Vec<Vec<String>>;

/// In-process store with spreadsheet semantics. Backs `--dry-run` and the tests.
#[derive(Default)]
pub struct MemoryStore {
    /// sheet id -> tabs in creation order
    sheets: Mutex<HashMap<String, Vec<(String, Grid)>>>,
    failing: Mutex<HashSet<String>>,
    /// (sheet id, range) pairs whose calls fail.
    failing_ranges: Mutex<HashSet<(String, String)>>,
    /// Create tabs on first write instead of rejecting the range.
    auto_create: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that creates missing tabs on demand.
    pub fn permissive() -> Self {
        Self {
            auto_create: true,
            ..Self::default()
        }
    }

    pub fn with_tab(self, sheet_id: &str, tab: &str) -> Self {
        self.lock()
            .entry(sheet_id.to_string())
            .or_default()
            .push((tab.to_string(), Grid::new()));
        self
    }

    /// Overwrite cells starting at `range`, creating the tab if needed.
    pub fn seed(&self, sheet_id: &str, range: &str, rows: &[&[&str]]) {
        let values: Grid = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        if let Ok(r) = A1Range::parse(range) {
            let mut sheets = self.lock();
            let grid = tab_entry(&mut sheets, sheet_id, &r.tab);
            write_at(grid, r.start_row, r.start_col, &values);
        }
    }

    /// Make every operation on `sheet_id` fail from now on.
    pub fn fail_sheet(&self, sheet_id: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sheet_id.to_string());
    }

    /// Make calls addressed exactly to `range` on `sheet_id` fail.
    pub fn fail_range(&self, sheet_id: &str, range: &str) {
        self.failing_ranges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((sheet_id.to_string(), range.to_string()));
    }

    /// Snapshot of a tab's grid.
    pub fn rows(&self, sheet_id: &str, tab: &str) -> Grid {
        self.lock()
            .get(sheet_id)
            .and_then(|tabs| tabs.iter().find(|(name, _)| name == tab))
            .map(|(_, grid)| grid.clone())
            .unwrap_or_default()
    }

    /// Single cell, 1-based; `None` when never written or out of range.
    pub fn cell(&self, sheet_id: &str, tab: &str, row: u32, col: u32) -> Option<String> {
        let (r, c) = ((row as usize).checked_sub(1)?, (col as usize).checked_sub(1)?);
        self.rows(sheet_id, tab).get(r)?.get(c).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(String, Grid)>>> {
        self.sheets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, sheet_id: &str) -> Result<(), StoreError> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(sheet_id) {
            return Err(StoreError::Http {
                status: 503,
                body: format!("sheet {} unavailable", sheet_id),
            });
        }
        Ok(())
    }

    /// Run `f` against the grid addressed by `range`.
    fn with_grid<T>(
        &self,
        sheet_id: &str,
        range: &str,
        create: bool,
        f: impl FnOnce(&mut Grid, &A1Range) -> T,
    ) -> Result<T, StoreError> {
        self.check(sheet_id)?;
        let failing = self
            .failing_ranges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(sheet_id.to_string(), range.to_string()));
        if failing {
            return Err(StoreError::Http {
                status: 500,
                body: format!("range {} unavailable", range),
            });
        }
        let r = A1Range::parse(range)?;
        let mut sheets = self.lock();
        if create && self.auto_create {
            return Ok(f(tab_entry(&mut sheets, sheet_id, &r.tab), &r));
        }
        let grid = sheets
            .get_mut(sheet_id)
            .and_then(|tabs| tabs.iter_mut().find(|(name, _)| *name == r.tab))
            .map(|(_, grid)| grid)
            .ok_or_else(|| StoreError::Range(range.to_string()))?;
        Ok(f(grid, &r))
    }
}

fn tab_entry<'a>(
    sheets: &'a mut HashMap<String, Vec<(String, Grid)>>,
    sheet_id: &str,
    tab: &str,
) -> &'a mut Grid {
    let tabs = sheets.entry(sheet_id.to_string()).or_default();
    let pos = match tabs.iter().position(|(name, _)| name == tab) {
        Some(pos) => pos,
        None => {
            tabs.push((tab.to_string(), Grid::new()));
            tabs.len() - 1
        }
    };
    &mut tabs[pos].1
}

fn write_at(grid: &mut Grid, row: u32, col: u32, values: &[Vec<String>]) {
    for (i, cells) in values.iter().enumerate() {
        let r = row as usize - 1 + i;
        if grid.len() <= r {
            grid.resize_with(r + 1, Vec::new);
        }
        let line = &mut grid[r];
        for (j, cell) in cells.iter().enumerate() {
            let c = col as usize - 1 + j;
            if line.len() <= c {
                line.resize(c + 1, String::new());
            }
            line[c] = cell.clone();
        }
    }
}

fn trim_trailing(mut cells: Vec<String>) -> Vec<String> {
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_range(&self, sheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        self.with_grid(sheet_id, range, false, |grid, r| {
            let mut out: Vec<Vec<String>> = grid
                .iter()
                .enumerate()
                .skip(r.start_row as usize - 1)
                .take_while(|(i, _)| r.end_row.map_or(true, |end| *i < end as usize))
                .map(|(_, line)| {
                    let cells = line
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| r.contains(r.start_row, *j as u32 + 1))
                        .map(|(_, c)| c.clone())
                        .collect();
                    trim_trailing(cells)
                })
                .collect();
            while out.last().is_some_and(|line| line.is_empty()) {
                out.pop();
            }
            out
        })
    }

    async fn update_range(
        &self,
        sheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), StoreError> {
        self.with_grid(sheet_id, range, true, |grid, r| {
            write_at(grid, r.start_row, r.start_col, values)
        })
    }

    async fn append_rows(
        &self,
        sheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), StoreError> {
        self.with_grid(sheet_id, range, true, |grid, r| {
            let last_occupied = grid
                .iter()
                .rposition(|line| line.iter().any(|c| !c.is_empty()))
                .map_or(0, |i| i as u32 + 1);
            let next = (last_occupied + 1).max(r.start_row);
            write_at(grid, next, r.start_col, rows)
        })
    }

    async fn clear_range(&self, sheet_id: &str, range: &str) -> Result<(), StoreError> {
        self.with_grid(sheet_id, range, false, |grid, r| {
            for (i, line) in grid.iter_mut().enumerate() {
                for (j, cell) in line.iter_mut().enumerate() {
                    if r.contains(i as u32 + 1, j as u32 + 1) {
                        cell.clear();
                    }
                }
            }
        })
    }

    async fn list_tabs(&self, sheet_id: &str) -> Result<Vec<String>, StoreError> {
        self.check(sheet_id)?;
        Ok(self
            .lock()
            .get(sheet_id)
            .map(|tabs| tabs.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    async fn create_tab(&self, sheet_id: &str, name: &str) -> Result<(), StoreError> {
        self.check(sheet_id)?;
        let mut sheets = self.lock();
        let tabs = sheets.entry(sheet_id.to_string()).or_default();
        if tabs.iter().any(|(existing, _)| existing == name) {
            return Err(StoreError::Http {
                status: 400,
                body: format!("a sheet with the name \"{}\" already exists", name),
            });
        }
        tabs.push((name.to_string(), Grid::new()));
        Ok(())
    }
}
