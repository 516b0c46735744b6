// src/extract/links.rs

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::trace;
use url::Url;

use super::Parser;
use crate::error::ParseFailure;
use crate::types::ExtractedRow;

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("link selector should parse"));

/// One row per hyperlink on the page, in document order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkParser {
    /// Resolve relative hrefs against the page address.
    pub absolute: bool,
}

impl Parser for LinkParser {
    fn parse(&self, content: &str, source: &str) -> Result<Vec<ExtractedRow>, ParseFailure> {
        let doc = Html::parse_document(content);
        let base = if self.absolute {
            Url::parse(source).ok()
        } else {
            None
        };

        let links: Vec<ExtractedRow> = doc
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(|href| {
                let link = base
                    .as_ref()
                    .and_then(|b| b.join(href).ok())
                    .map_or_else(|| href.to_string(), |u| u.to_string());
                vec![link]
            })
            .collect();
        trace!(%source, links = links.len(), "links read");

        if links.is_empty() {
            return Err(ParseFailure::NoLinks);
        }
        Ok(links)
    }
}
