// src/store/sheets.rs

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::LedgerStore;
use crate::error::StoreError;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// Google Sheets v4 REST backend. The access token is an opaque capability
/// obtained by the caller.
pub struct SheetsStore {
    client: Client,
    token: String,
    base: Url,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

impl SheetsStore {
    pub fn new(token: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_base_url(token, SHEETS_API)
    }

    pub fn with_base_url(token: impl Into<String>, base: &str) -> Result<Self, StoreError> {
        let base = Url::parse(base).map_err(|e| StoreError::Request(e.to_string()))?;
        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            client,
            token: token.into(),
            base,
        })
    }

    /// `<base>/<sheet_id>[/values]/<segment>`, each segment percent-encoded.
    fn endpoint(&self, sheet_id: &str, values: bool, segment: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StoreError::Request(format!("cannot-be-a-base url {}", self.base)))?;
            path.pop_if_empty();
            match (values, segment) {
                (true, Some(seg)) => {
                    path.push(sheet_id).push("values").push(seg);
                }
                (false, Some(seg)) => {
                    path.push(&format!("{}{}", sheet_id, seg));
                }
                (_, None) => {
                    path.push(sheet_id);
                }
            }
        }
        Ok(url)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, StoreError> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

fn cell_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LedgerStore for SheetsStore {
    async fn get_range(&self, sheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.endpoint(sheet_id, true, Some(range))?;
        debug!(%range, "sheets get");
        let body: ValueRange = self
            .send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_range(
        &self,
        sheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), StoreError> {
        let mut url = self.endpoint(sheet_id, true, Some(range))?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        debug!(%range, rows = values.len(), "sheets update");
        self.send(self.client.put(url).json(&json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        })))
        .await?;
        Ok(())
    }

    async fn append_rows(
        &self,
        sheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), StoreError> {
        let mut url = self.endpoint(sheet_id, true, Some(&format!("{}:append", range)))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        debug!(%range, rows = rows.len(), "sheets append");
        self.send(self.client.post(url).json(&json!({
            "majorDimension": "ROWS",
            "values": rows,
        })))
        .await?;
        Ok(())
    }

    async fn clear_range(&self, sheet_id: &str, range: &str) -> Result<(), StoreError> {
        let url = self.endpoint(sheet_id, true, Some(&format!("{}:clear", range)))?;
        debug!(%range, "sheets clear");
        self.send(self.client.post(url).json(&json!({}))).await?;
        Ok(())
    }

    async fn list_tabs(&self, sheet_id: &str) -> Result<Vec<String>, StoreError> {
        let mut url = self.endpoint(sheet_id, false, None)?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let body: Spreadsheet = self
            .send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(body.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn create_tab(&self, sheet_id: &str, name: &str) -> Result<(), StoreError> {
        let url = self.endpoint(sheet_id, false, Some(":batchUpdate"))?;
        debug!(tab = %name, "sheets add tab");
        self.send(self.client.post(url).json(&json!({
            "requests": [{ "addSheet": { "properties": { "title": name } } }]
        })))
        .await?;
        Ok(())
    }
}
