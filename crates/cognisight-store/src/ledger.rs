//! Append-only record of submissions.
//!
//! Every backend appends atomically: a new row is added server-side (or under
//! a lock) rather than by rewriting the whole sheet, so concurrent submissions
//! cannot overwrite each other.

use crate::auth::AuthError;
use async_trait::async_trait;
use cognisight_core::LedgerRow;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("sheets rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid ledger url: {0}")]
    InvalidUrl(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend_tag(&self) -> &'static str;

    /// All non-blank rows, oldest first.
    async fn read_rows(&self) -> Result<Vec<LedgerRow>, LedgerError>;

    /// Append one row. Never rewrites existing rows.
    async fn append(&self, row: &LedgerRow) -> Result<(), LedgerError>;

    /// Prepare an empty ledger (e.g. write column headers). Idempotent.
    async fn ensure_header(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// The append contract in pure form: `existing ++ [row]`.
pub fn merge_rows(mut existing: Vec<LedgerRow>, row: LedgerRow) -> Vec<LedgerRow> {
    existing.push(row);
    existing
}

/// Mutex-guarded in-process ledger.
#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<LedgerRow>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<LedgerRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn read_rows(&self) -> Result<Vec<LedgerRow>, LedgerError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| !r.is_blank())
            .cloned()
            .collect())
    }

    async fn append(&self, row: &LedgerRow) -> Result<(), LedgerError> {
        // Read-merge-write is safe here only because it happens under the lock.
        let mut rows = self.rows.lock().await;
        let merged = merge_rows(std::mem::take(&mut *rows), row.clone());
        *rows = merged;
        Ok(())
    }
}
