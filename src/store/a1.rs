// src/store/a1.rs
//! A1-notation helpers: column letters, `Tab!C3:F10` ranges, block sizing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::StoreError;

static ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]*)(\d*)$").expect("A1 endpoint regex should compile"));

/// 1 -> "A", 26 -> "Z", 27 -> "AA".
pub fn column_letter(mut n: u32) -> String {
    let mut out = Vec::new();
    while n > 0 {
        let m = (n - 1) % 26;
        out.push(b'A' + m as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Inverse of [`column_letter`]; case-insensitive.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// Prefix `cells` with a tab name, quoting it when it contains characters A1 cannot take bare.
pub fn qualify(tab: &str, cells: &str) -> String {
    let bare = tab
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if bare {
        format!("{}!{}", tab, cells)
    } else {
        format!("'{}'!{}", tab.replace('\'', "''"), cells)
    }
}

/// A parsed `Tab!A1:B2` range. Open ends (`A2:E`, `1:1`) are `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct A1Range {
    pub tab: String,
    pub start_col: u32,
    pub start_row: u32,
    pub end_col: Option<u32>,
    pub end_row: Option<u32>,
}

impl A1Range {
    pub fn parse(range: &str) -> Result<Self, StoreError> {
        let bad = || StoreError::Range(range.to_string());
        let idx = range.rfind('!').ok_or_else(bad)?;
        let (tab, cells) = (&range[..idx], &range[idx + 1..]);
        let tab = unquote(tab);
        if tab.is_empty() || cells.is_empty() {
            return Err(bad());
        }

        let (start, end) = match cells.split_once(':') {
            Some((s, e)) => (s, Some(e)),
            None => (cells, None),
        };
        let (sc, sr) = endpoint(start).ok_or_else(bad)?;
        let (end_col, end_row) = match end {
            Some(e) => endpoint(e).ok_or_else(bad)?,
            None => (sc, sr),
        };

        Ok(Self {
            tab,
            start_col: sc.unwrap_or(1),
            start_row: sr.unwrap_or(1),
            end_col,
            end_row,
        })
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row
            && col >= self.start_col
            && self.end_row.map_or(true, |r| row <= r)
            && self.end_col.map_or(true, |c| col <= c)
    }

    /// Range covering a `width` x `height` block anchored at this range's top-left cell.
    pub fn block(&self, width: usize, height: usize) -> String {
        let end_col = self.start_col + width.max(1) as u32 - 1;
        let end_row = self.start_row + height.max(1) as u32 - 1;
        qualify(
            &self.tab,
            &format!(
                "{}{}:{}{}",
                column_letter(self.start_col),
                self.start_row,
                column_letter(end_col),
                end_row
            ),
        )
    }
}

fn unquote(tab: &str) -> String {
    match tab.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => tab.to_string(),
    }
}

fn endpoint(text: &str) -> Option<(Option<u32>, Option<u32>)> {
    let caps = ENDPOINT.captures(text)?;
    let col = column_index(&caps[1]);
    let row = match &caps[2] {
        "" => None,
        digits => Some(digits.parse::<u32>().ok().filter(|r| *r > 0)?),
    };
    if col.is_none() && row.is_none() {
        return None;
    }
    Some((col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(703), "AAA");
        assert_eq!(column_index("aa"), Some(27));
        assert_eq!(column_index("C"), Some(3));
        assert_eq!(column_index("C3"), None);
        for n in [1, 5, 26, 52, 300] {
            assert_eq!(column_index(&column_letter(n)), Some(n));
        }
    }

    #[test]
    fn parses_open_and_closed_ranges() {
        let r = A1Range::parse("SCRAPE_STATUS!A2:E").unwrap();
        assert_eq!((r.start_col, r.start_row), (1, 2));
        assert_eq!((r.end_col, r.end_row), (Some(5), None));

        let r = A1Range::parse("run!1:1").unwrap();
        assert_eq!((r.start_col, r.start_row, r.end_col, r.end_row), (1, 1, None, Some(1)));

        let r = A1Range::parse("Sheet5!C3").unwrap();
        assert_eq!((r.end_col, r.end_row), (Some(3), Some(3)));

        let r = A1Range::parse("'My Tab'!B3:B").unwrap();
        assert_eq!(r.tab, "My Tab");
        assert!(r.contains(40, 2));
        assert!(!r.contains(2, 2));
        assert!(!r.contains(4, 3));

        assert!(A1Range::parse("no-tab").is_err());
        assert!(A1Range::parse("Tab!").is_err());
        assert!(A1Range::parse("Tab!A0").is_err());
    }

    #[test]
    fn block_is_sized_to_batch() {
        let r = A1Range::parse("Sheet5!C3").unwrap();
        assert_eq!(r.block(5, 10), "Sheet5!C3:G12");
        let r = A1Range::parse("R6.09!A3").unwrap();
        assert_eq!(r.block(1, 1), "R6.09!A3:A3");
        assert_eq!(qualify("My Tab", "A1"), "'My Tab'!A1");
    }
}
