// src/extract/mod.rs

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ParseFailure;
use crate::fetch::Outcome;
use crate::types::{ExtractedRow, FailureRecord, StatusCode, UNKNOWN};

pub mod html;
pub mod links;

pub use html::HtmlTableParser;
pub use links::LinkParser;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex should compile"));

/// Named values read from a page, e.g. `district`.
pub type PageMeta = BTreeMap<String, String>;

/// Turns fetched content into rows. Must be deterministic for identical content.
pub trait Parser: Send + Sync {
    fn parse(&self, content: &str, source: &str) -> Result<Vec<ExtractedRow>, ParseFailure>;

    /// Values captured from the page itself. They fill row prefixes and stand
    /// in for a label or period the address does not carry.
    fn page_meta(&self, _content: &str) -> PageMeta {
        PageMeta::new()
    }
}

/// Per-job parser, chosen with `mode`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ParserSpec {
    Tables(HtmlTableParser),
    Links(LinkParser),
}

impl Default for ParserSpec {
    fn default() -> Self {
        ParserSpec::Tables(HtmlTableParser::default())
    }
}

impl ParserSpec {
    /// Compile every configured pattern once, to reject bad job files early.
    pub fn validate(&self) -> Result<(), regex::Error> {
        match self {
            ParserSpec::Tables(p) => p.meta.as_ref().map_or(Ok(()), |m| m.compile().map(|_| ())),
            ParserSpec::Links(_) => Ok(()),
        }
    }
}

impl Parser for ParserSpec {
    fn parse(&self, content: &str, source: &str) -> Result<Vec<ExtractedRow>, ParseFailure> {
        match self {
            ParserSpec::Tables(p) => p.parse(content, source),
            ParserSpec::Links(p) => p.parse(content, source),
        }
    }

    fn page_meta(&self, content: &str) -> PageMeta {
        match self {
            ParserSpec::Tables(p) => p.page_meta(content),
            ParserSpec::Links(p) => p.page_meta(content),
        }
    }
}

/// How failure labels are derived and which cells are prefixed to every data row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Query parameters tried in order for a target's label.
    pub label_params: Vec<String>,
    /// Query parameters tried in order for a target's period.
    pub period_params: Vec<String>,
    /// Cells prepended to each row. `{label}`, `{period}` and any captured
    /// page field such as `{district}` are substituted; unknown names become empty.
    pub prefix: Vec<String>,
}

/// Label and period of a target, read from its query string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetMeta {
    pub label: String,
    pub period: String,
}

impl TargetMeta {
    pub fn from_address(address: &str, config: &ExtractConfig) -> Self {
        let url = Url::parse(address.trim()).ok();
        let lookup = |keys: &[String]| -> Option<String> {
            let url = url.as_ref()?;
            keys.iter().find_map(|key| {
                url.query_pairs()
                    .find(|(k, v)| k == key.as_str() && !v.trim().is_empty())
                    .map(|(_, v)| v.trim().to_string())
            })
        };
        Self {
            label: lookup(&config.label_params)
                .map(|l| l.to_uppercase())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            period: lookup(&config.period_params).unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    /// Fill a missing label or period from the page's own `label`/`period` fields.
    pub fn or_page(mut self, page: &PageMeta) -> Self {
        let found = |key: &str| page.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        if self.label == UNKNOWN {
            if let Some(label) = found("label") {
                self.label = label.to_uppercase();
            }
        }
        if self.period == UNKNOWN {
            if let Some(period) = found("period") {
                self.period = period.to_string();
            }
        }
        self
    }
}

/// Data rows in target order plus one failure per target that produced none.
#[derive(Debug, Default)]
pub struct Extraction {
    pub rows: Vec<ExtractedRow>,
    pub failures: Vec<FailureRecord>,
}

pub fn aggregate(outcomes: Vec<Outcome>, parser: &dyn Parser, config: &ExtractConfig) -> Extraction {
    let mut out = Extraction::default();

    for outcome in outcomes {
        let address_meta = TargetMeta::from_address(&outcome.target.address, config);
        let record = |meta: &TargetMeta, status: StatusCode| FailureRecord {
            row: Some(outcome.target.origin_row),
            label: meta.label.clone(),
            period: meta.period.clone(),
            status,
        };

        let content = match outcome.result {
            Ok(content) => content,
            Err(status) => {
                out.failures.push(record(&address_meta, status));
                continue;
            }
        };
        let page = parser.page_meta(&content);
        let meta = address_meta.or_page(&page);
        let failure = |status: StatusCode| record(&meta, status);

        match parser.parse(&content, &outcome.target.address) {
            Ok(rows) if !rows.is_empty() => {
                debug!(address = %outcome.target.address, rows = rows.len(), "parsed");
                let prefix = render_prefix(&config.prefix, &meta, &page);
                out.rows.extend(rows.into_iter().map(|row| {
                    let mut cells = prefix.clone();
                    cells.extend(row);
                    cells
                }));
            }
            Ok(_) => {
                warn!(label = %meta.label, period = %meta.period, "no data");
                out.failures.push(failure(StatusCode::NoData));
            }
            Err(e) => {
                warn!(label = %meta.label, period = %meta.period, reason = %e, "parse failed");
                out.failures.push(failure(e.status()));
            }
        }
    }

    info!(
        rows = out.rows.len(),
        failures = out.failures.len(),
        "aggregated"
    );
    out
}

fn render_prefix(prefix: &[String], meta: &TargetMeta, page: &PageMeta) -> Vec<String> {
    let value = |name: &str| -> String {
        match name {
            "label" => meta.label.clone(),
            "period" => meta.period.clone(),
            other => page.get(other).cloned().unwrap_or_default(),
        }
    };
    prefix
        .iter()
        .map(|p| {
            PLACEHOLDER
                .replace_all(p, |caps: &Captures<'_>| value(&caps[1]))
                .into_owned()
        })
        .collect()
}

/// Pad every row with empty cells up to the widest row. Returns that width.
pub fn pad_rows(rows: &mut [ExtractedRow]) -> usize {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in rows.iter_mut() {
        row.resize(width, String::new());
    }
    width
}
