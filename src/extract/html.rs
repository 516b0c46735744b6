// src/extract/html.rs

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{trace, warn};

use super::{PageMeta, Parser};
use crate::error::ParseFailure;
use crate::types::ExtractedRow;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table selector should parse"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector should parse"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").expect("cell selector should parse"));

/// Generic table layout: pick tables by document position, drop leading and
/// trailing rows of each, keep every remaining row's cell text.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HtmlTableParser {
    /// 0-based positions of the tables to read, in document order.
    pub tables: Vec<usize>,
    /// Rows dropped from the top of each table.
    pub skip_rows: usize,
    /// Rows dropped from the bottom of each table.
    pub skip_trailing_rows: usize,
    /// Named fields captured from a metadata table on the same page.
    pub meta: Option<MetaCapture>,
}

/// Reads named values out of one table's text. Each pattern is matched
/// case-insensitively against the table's upper-cased, whitespace-collapsed
/// text; capture group 1 is the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaCapture {
    /// 0-based position of the metadata table.
    pub table: usize,
    pub fields: BTreeMap<String, String>,
}

impl MetaCapture {
    pub fn compile(&self) -> Result<Vec<(&str, Regex)>, regex::Error> {
        self.fields
            .iter()
            .map(|(name, pattern)| {
                let rx = RegexBuilder::new(pattern).case_insensitive(true).build()?;
                Ok((name.as_str(), rx))
            })
            .collect()
    }

    fn capture(&self, doc: &Html) -> PageMeta {
        let patterns = match self.compile() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "bad metadata pattern");
                return PageMeta::new();
            }
        };
        let Some(table) = doc.select(&TABLE).nth(self.table) else {
            return PageMeta::new();
        };
        let text = cell_text(table).to_uppercase();

        patterns
            .into_iter()
            .filter_map(|(name, rx)| {
                let value = rx.captures(&text)?.get(1)?.as_str().trim().to_string();
                (!value.is_empty()).then(|| (name.to_string(), value))
            })
            .collect()
    }
}

impl Default for HtmlTableParser {
    fn default() -> Self {
        Self {
            tables: vec![0],
            skip_rows: 0,
            skip_trailing_rows: 0,
            meta: None,
        }
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

impl Parser for HtmlTableParser {
    fn parse(&self, content: &str, source: &str) -> Result<Vec<ExtractedRow>, ParseFailure> {
        let doc = Html::parse_document(content);
        let tables: Vec<ElementRef<'_>> = doc.select(&TABLE).collect();

        let needed = self.tables.iter().max().map_or(0, |m| m + 1);
        if tables.len() < needed {
            return Err(ParseFailure::LessThanExpectedStructure {
                expected: needed,
                found: tables.len(),
            });
        }

        let mut out = Vec::new();
        for &index in &self.tables {
            let rows: Vec<ElementRef<'_>> = tables[index].select(&ROW).collect();
            let end = rows.len().saturating_sub(self.skip_trailing_rows);
            for row in rows.iter().take(end).skip(self.skip_rows) {
                let cells: ExtractedRow = row.select(&CELL).map(cell_text).collect();
                if !cells.is_empty() {
                    out.push(cells);
                }
            }
            trace!(%source, table = index, rows = out.len(), "table read");
        }

        if out.is_empty() {
            return Err(ParseFailure::NoRowsInTable);
        }
        Ok(out)
    }

    fn page_meta(&self, content: &str) -> PageMeta {
        match &self.meta {
            Some(meta) => meta.capture(&Html::parse_document(content)),
            None => PageMeta::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <table><tr><td>nav</td></tr></table>
  <table>
    <tr><th>SNo.</th><th>Name</th><th>Amount</th></tr>
    <tr><td>1</td><td> North
        Ridge </td><td>120</td></tr>
    <tr><td>2</td><td>East</td></tr>
    <tr><td colspan="3">Total</td></tr>
  </table>
</body></html>"#;

    #[test]
    fn reads_selected_table_and_trims_rows() {
        let parser = HtmlTableParser {
            tables: vec![1],
            skip_rows: 1,
            skip_trailing_rows: 1,
            meta: None,
        };

        let rows = parser.parse(PAGE, "http://x").unwrap();

        assert_eq!(
            rows,
            vec![vec!["1", "North Ridge", "120"], vec!["2", "East"]]
        );
    }

    #[test]
    fn too_few_tables() {
        let parser = HtmlTableParser {
            tables: vec![3],
            ..HtmlTableParser::default()
        };
        assert_eq!(
            parser.parse(PAGE, "http://x"),
            Err(ParseFailure::LessThanExpectedStructure {
                expected: 4,
                found: 2
            })
        );
    }

    #[test]
    fn empty_selection_is_no_rows() {
        let parser = HtmlTableParser {
            tables: vec![0],
            skip_rows: 1,
            ..HtmlTableParser::default()
        };
        assert_eq!(
            parser.parse(PAGE, "http://x"),
            Err(ParseFailure::NoRowsInTable)
        );
    }

    const REPORT: &str = r#"
<html><body>
  <table><tr><td>nav</td></tr></table>
  <table>
    <tr><td>State : Madhya Pradesh</td><td>District : Sagar</td></tr>
    <tr><td>Block : Rahatgarh</td><td>Panchayat : North   Ridge</td></tr>
  </table>
  <table><tr><td>1</td><td>Well</td></tr></table>
</body></html>"#;

    fn meta_parser() -> HtmlTableParser {
        let fields = [
            ("district", r"DISTRICT\s*:?\s+([A-Z0-9\-/()\s]+?)\s+(?:BLOCK|GRAM|PANCHAYAT)"),
            ("block", r"BLOCK\s*:?\s+([A-Z0-9\-/()\s]+?)\s+(?:PANCHAYAT|GRAM)"),
            ("label", r"PANCHAYAT\s*:?\s*([A-Z0-9\-()/\s]+)"),
            ("missing", r"TEHSIL\s*:\s*(\w+)"),
        ];
        HtmlTableParser {
            tables: vec![2],
            meta: Some(MetaCapture {
                table: 1,
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
            ..HtmlTableParser::default()
        }
    }

    #[test]
    fn captures_fields_from_metadata_table() {
        let meta = meta_parser().page_meta(REPORT);

        assert_eq!(meta.get("district").map(String::as_str), Some("SAGAR"));
        assert_eq!(meta.get("block").map(String::as_str), Some("RAHATGARH"));
        assert_eq!(meta.get("label").map(String::as_str), Some("NORTH RIDGE"));
        assert!(!meta.contains_key("missing"));
        assert_eq!(meta_parser().parse(REPORT, "http://x").unwrap(), vec![vec!["1", "Well"]]);
    }

    #[test]
    fn no_metadata_without_capture_or_table() {
        assert!(HtmlTableParser::default().page_meta(REPORT).is_empty());

        let mut parser = meta_parser();
        if let Some(meta) = parser.meta.as_mut() {
            meta.table = 9;
        }
        assert!(parser.page_meta(REPORT).is_empty());
    }

    #[test]
    fn multiple_tables_concatenate_in_listed_order() {
        let parser = HtmlTableParser {
            tables: vec![1, 0],
            ..HtmlTableParser::default()
        };
        let rows = parser.parse(PAGE, "http://x").unwrap();
        assert_eq!(rows.first().unwrap()[0], "SNo.");
        assert_eq!(rows.last().unwrap(), &vec!["nav".to_string()]);
    }
}
