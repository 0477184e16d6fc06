//! Google Sheets v4 REST client.
//!
//! Four calls, matching `SheetsBackend`:
//! values get → batchUpdateByDataFilter → spreadsheets batchUpdate →
//! spreadsheet properties.

use std::time::Duration;

use handsfree_core::{
    BackendError, BatchUpdateSpreadsheetRequest, BatchUpdateValuesByDataFilterRequest, SheetGrid,
    SheetProperties, SheetsBackend,
};
use serde::Deserialize;

// ── Constants ───────────────────────────────────────────────────────

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
pub(crate) const USER_AGENT: &str = concat!("handsfree/", env!("CARGO_PKG_VERSION"));

const API_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http(timeout: Duration) -> Result<reqwest::blocking::Client, BackendError> {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Network(format!("failed to create HTTP client: {}", e)))
}

// ── Response shapes ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Option<Vec<Vec<serde_json::Value>>>,
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Deserialize)]
struct Sheet {
    properties: RawSheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSheetProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
}

// ── SheetsClient ────────────────────────────────────────────────────

/// Sheets API client (blocking), bound to one access token.
#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::blocking::Client,
    api_base: String,
    token: String,
}

impl SheetsClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_base_url(access_token, SHEETS_API_BASE)
    }

    /// Client against a different API root (tests, proxies).
    pub fn with_base_url(
        access_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            http: build_http(API_TIMEOUT)?,
            api_base: api_base.into(),
            token: access_token.into(),
        })
    }

    /// `{api_base}/v4/spreadsheets/{segments...}` with each segment
    /// percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<url::Url, BackendError> {
        let mut url = url::Url::parse(&self.api_base)
            .map_err(|e| BackendError::Parse(format!("invalid API base {:?}: {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Parse(format!("invalid API base {:?}", self.api_base)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: url::Url) -> Result<reqwest::blocking::Response, BackendError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        check_status(response)
    }

    fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: url::Url,
        body: &T,
    ) -> Result<reqwest::blocking::Response, BackendError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        check_status(response)
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, BackendError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }
    if status == 401 {
        return Err(BackendError::NotAuthenticated);
    }
    let body: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);
    Err(BackendError::Http(status, extract_google_error(&body, status)))
}

fn extract_google_error(body: &serde_json::Value, status: u16) -> String {
    body["error"]["message"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

/// A1 range covering a whole tab. Quotes are doubled inside the title.
fn whole_sheet_range(sheet_title: &str) -> String {
    format!("'{}'", sheet_title.replace('\'', "''"))
}

fn cell_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetsBackend for SheetsClient {
    fn fetch_values(&self, spreadsheet_id: &str, sheet_title: &str) -> Result<SheetGrid, BackendError> {
        let range = whole_sheet_range(sheet_title);
        let mut url = self.url(&[spreadsheet_id, "values", &range])?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");

        log::debug!("Fetching values of {:?} in {}", sheet_title, spreadsheet_id);
        let body: ValueRange = self
            .get(url)?
            .json()
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        Ok(body
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_text).collect())
            .collect())
    }

    fn batch_update_values(
        &self,
        spreadsheet_id: &str,
        request: &BatchUpdateValuesByDataFilterRequest,
    ) -> Result<(), BackendError> {
        let url = self.url(&[spreadsheet_id, "values:batchUpdateByDataFilter"])?;
        self.post_json(url, request)?;
        Ok(())
    }

    fn batch_update_spreadsheet(
        &self,
        spreadsheet_id: &str,
        request: &BatchUpdateSpreadsheetRequest,
    ) -> Result<(), BackendError> {
        let url = self.url(&[&format!("{}:batchUpdate", spreadsheet_id)])?;
        self.post_json(url, request)?;
        Ok(())
    }

    fn sheet_properties(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>, BackendError> {
        let mut url = self.url(&[spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");

        let body: Spreadsheet = self
            .get(url)?
            .json()
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        Ok(body
            .sheets
            .into_iter()
            .map(|s| SheetProperties { sheet_id: s.properties.sheet_id, title: s.properties.title })
            .collect())
    }
}
