// src/ledger/report.rs

use tracing::info;

use super::{ColumnSlot, Ledger};
use crate::error::{Diagnostic, Stage};
use crate::store::a1;
use crate::types::{FailureRecord, RunContext};

pub const REPORT_LINES: usize = 10;
/// Failures shown in the block; the rest live only in the failure log.
pub const FAILURE_SLOTS: usize = 4;
/// First row of the block in a job's column.
pub const REPORT_FIRST_ROW: u32 = 3;

/// Render the fixed 10-line run report.
pub fn render_report(ctx: &RunContext, failures: &[FailureRecord], runs_today: usize) -> Vec<String> {
    let mut lines = vec![
        format!("1) File: {}", ctx.job_path),
        format!("2) Time: {}", ctx.timestamp()),
        format!("3) By: {}", ctx.runner_kind),
        "4) Failures:".to_string(),
    ];

    if failures.is_empty() {
        lines.push("NONE".to_string());
    }
    lines.extend(
        failures
            .iter()
            .take(FAILURE_SLOTS)
            .map(|f| format!("{}\t{}", f.label, f.period)),
    );
    lines.resize(4 + FAILURE_SLOTS, String::new());

    lines.push(format!("Runs today: {}", runs_today));
    lines.push("5) Run complete".to_string());
    lines.resize(REPORT_LINES, String::new());
    lines
}

impl Ledger<'_> {
    /// Overwrite rows 3-12 of the job's column with `lines`.
    pub async fn write_report(&self, slot: &ColumnSlot, lines: &[String]) -> Result<(), Diagnostic> {
        let col = slot.letter();
        let range = a1::qualify(
            &self.config.run_tab,
            &format!(
                "{col}{}:{col}{}",
                REPORT_FIRST_ROW,
                REPORT_FIRST_ROW + REPORT_LINES as u32 - 1
            ),
        );
        let values: Vec<Vec<String>> = lines.iter().map(|l| vec![l.clone()]).collect();
        self.store
            .update_range(&self.config.sheet_id, &range, &values)
            .await
            .map_err(|e| Diagnostic::new(Stage::RunReport, e))?;
        info!(%range, "run report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::store::MemoryStore;
    use crate::types::StatusCode;
    use chrono::{FixedOffset, TimeZone};

    fn ctx() -> RunContext {
        let offset = FixedOffset::east_opt(330 * 60).unwrap();
        RunContext {
            job_id: "works".into(),
            job_path: "/srv/jobs.yaml#works".into(),
            started_at: offset.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap(),
            runner_kind: "system".into(),
        }
    }

    fn failures(n: u32) -> Vec<FailureRecord> {
        (1..=n)
            .map(|i| FailureRecord {
                row: Some(i),
                label: format!("P{}", i),
                period: "2025-2026".into(),
                status: StatusCode::NoRowsInTable,
            })
            .collect()
    }

    #[test]
    fn shows_only_first_four_failures() {
        let lines = render_report(&ctx(), &failures(7), 3);

        assert_eq!(lines.len(), REPORT_LINES);
        assert_eq!(lines[0], "1) File: /srv/jobs.yaml#works");
        assert_eq!(lines[1], "2) Time: 01/01/2025, 09:30:00 am");
        assert_eq!(lines[2], "3) By: system");
        assert_eq!(lines[3], "4) Failures:");
        assert_eq!(&lines[4..8], &["P1\t2025-2026", "P2\t2025-2026", "P3\t2025-2026", "P4\t2025-2026"]);
        assert_eq!(lines[8], "Runs today: 3");
        assert_eq!(lines[9], "5) Run complete");
    }

    #[test]
    fn pads_short_failure_lists() {
        let lines = render_report(&ctx(), &failures(1), 1);
        assert_eq!(&lines[4..8], &["P1\t2025-2026", "", "", ""]);
        assert_eq!(lines.len(), REPORT_LINES);

        let lines = render_report(&ctx(), &[], 0);
        assert_eq!(&lines[4..8], &["NONE", "", "", ""]);
        assert_eq!(lines[8], "Runs today: 0");
    }

    #[tokio::test]
    async fn report_overwrites_column_rows_3_to_12() {
        let store = MemoryStore::new().with_tab("ledger", "run");
        store.seed("ledger", "run!B1", &[&["works"], &[""], &["stale"]]);
        let cfg = LedgerConfig::new("ledger");
        let ledger = Ledger::new(&store, &cfg);
        let slot = ColumnSlot {
            job_identity: "works".into(),
            column_index: 2,
        };

        let lines = render_report(&ctx(), &failures(2), 1);
        ledger.write_report(&slot, &lines).await.unwrap();

        assert_eq!(store.cell("ledger", "run", 1, 2).as_deref(), Some("works"));
        assert_eq!(store.cell("ledger", "run", 3, 2).as_deref(), Some("1) File: /srv/jobs.yaml#works"));
        assert_eq!(store.cell("ledger", "run", 12, 2).as_deref(), Some("5) Run complete"));
        assert_eq!(store.rows("ledger", "run").len(), 12);
    }
}
