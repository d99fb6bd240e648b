//! Google Sheets ledger.
//!
//! Reads `'{worksheet}'!A:G` and appends through the `values:append` endpoint,
//! which inserts the row server-side. No client-side read-merge-write.

use crate::auth::TokenProvider;
use crate::ledger::{Ledger, LedgerError};
use async_trait::async_trait;
use cognisight_core::types::{LEDGER_HEADERS, LEDGER_MAX_COLUMNS};
use cognisight_core::LedgerRow;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Column positions of the three ledger fields within a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    email: usize,
    image_link: usize,
    result: usize,
}

const POSITIONAL: Columns = Columns {
    email: 0,
    image_link: 1,
    result: 2,
};

/// Locate the ledger columns by header name. `None` when the first row is
/// not a header row.
fn header_columns(header: &[String]) -> Option<Columns> {
    let find = |name: &str| header.iter().position(|h| h.trim() == name);
    let email = find(LEDGER_HEADERS[0])?;
    Some(Columns {
        email,
        image_link: find(LEDGER_HEADERS[1]).unwrap_or(POSITIONAL.image_link),
        result: find(LEDGER_HEADERS[2]).unwrap_or(POSITIONAL.result),
    })
}

/// Lay out a row's cells under `columns`, padding skipped columns with blanks.
fn place_cells(columns: Columns, row: &LedgerRow) -> Vec<String> {
    let width = columns.email.max(columns.image_link).max(columns.result) + 1;
    let mut cells = vec![String::new(); width];
    cells[columns.email] = row.email.clone();
    cells[columns.image_link] = row.image_link.clone();
    cells[columns.result] = row.result.clone();
    cells
}

/// A1 notation for a range on a named sheet: `'Name'!A:G`, with any quote
/// in the name doubled.
fn a1_range(worksheet: &str, range: &str) -> String {
    format!("'{}'!{range}", worksheet.replace('\'', "''"))
}

/// Turn raw sheet values into ledger rows: cap at 7 columns, drop rows whose
/// cells are all blank, and map fields by header when one is present.
fn rows_from_values(values: Vec<Vec<String>>) -> Vec<LedgerRow> {
    let mut values = values.into_iter().map(|mut row| {
        row.truncate(LEDGER_MAX_COLUMNS);
        row
    });

    let Some(first) = values.next() else {
        return Vec::new();
    };

    let (columns, leading) = match header_columns(&first) {
        Some(columns) => (columns, None),
        None => (POSITIONAL, Some(first)),
    };

    let cell = |row: &[String], idx: usize| row.get(idx).cloned().unwrap_or_default();

    leading
        .into_iter()
        .chain(values)
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .map(|row| {
            LedgerRow::new(
                cell(&row, columns.email),
                cell(&row, columns.image_link),
                cell(&row, columns.result),
            )
        })
        .collect()
}

pub struct SheetsLedger {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    spreadsheet_id: String,
    worksheet: String,
    base_url: String,
    /// Header-mapped column positions, resolved on first append.
    columns: Mutex<Option<Columns>>,
}

impl SheetsLedger {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            columns: Mutex::new(None),
        }
    }

    /// Point at a different API host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}` with the quoted
    /// worksheet name percent-encoded as a path segment.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, LedgerError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| LedgerError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        let segment = format!("{}{suffix}", a1_range(&self.worksheet, range));
        url.path_segments_mut()
            .map_err(|_| LedgerError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", &self.spreadsheet_id, "values", &segment]);
        Ok(url)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, LedgerError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .get(self.values_url(range, "")?)
            .bearer_auth(token)
            .send()
            .await?;
        if !resp.status().is_success() {
            let (status, body) = crate::http::failure(resp).await;
            return Err(LedgerError::Rejected { status, body });
        }
        let range: ValueRange = resp.json().await?;
        Ok(range.values)
    }

    async fn append_values(&self, cells: Vec<String>) -> Result<(), LedgerError> {
        let token = self.tokens.access_token().await?;
        let body = serde_json::json!({
            "majorDimension": "ROWS",
            "values": [cells],
        });
        let resp = self
            .client
            .post(self.values_url("A:G", ":append")?)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let (status, body) = crate::http::failure(resp).await;
            return Err(LedgerError::Rejected { status, body });
        }
        Ok(())
    }

    /// Where the ledger fields sit in this worksheet. A header row is looked
    /// up once and remembered; without one, fields are positional and the
    /// lookup is repeated on the next append.
    async fn columns(&self) -> Result<Columns, LedgerError> {
        let mut cached = self.columns.lock().await;
        if let Some(columns) = *cached {
            return Ok(columns);
        }
        let head = self.get_values("A1:G1").await?;
        match head.first().and_then(|h| header_columns(&h[..h.len().min(LEDGER_MAX_COLUMNS)])) {
            Some(columns) => {
                tracing::debug!(worksheet = %self.worksheet, ?columns, "ledger header resolved");
                *cached = Some(columns);
                Ok(columns)
            }
            None => Ok(POSITIONAL),
        }
    }
}

#[async_trait]
impl Ledger for SheetsLedger {
    fn backend_tag(&self) -> &'static str {
        "sheets"
    }

    async fn read_rows(&self) -> Result<Vec<LedgerRow>, LedgerError> {
        let values = self.get_values("A:G").await?;
        Ok(rows_from_values(values))
    }

    async fn append(&self, row: &LedgerRow) -> Result<(), LedgerError> {
        let columns = self.columns().await?;
        self.append_values(place_cells(columns, row)).await?;
        tracing::debug!(worksheet = %self.worksheet, "ledger row appended");
        Ok(())
    }

    async fn ensure_header(&self) -> Result<(), LedgerError> {
        // Any content in A:G means the sheet is in use; a header appended
        // below existing rows would read back as data.
        let existing = self.get_values("A:G").await?;
        if existing.iter().any(|row| row.iter().any(|c| !c.trim().is_empty())) {
            return Ok(());
        }
        tracing::info!(worksheet = %self.worksheet, "empty worksheet; writing ledger header");
        self.append_values(LEDGER_HEADERS.iter().map(|h| h.to_string()).collect())
            .await
    }
}
