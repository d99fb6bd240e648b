//! Local SQLite ledger for deployments without a spreadsheet.

use crate::ledger::{Ledger, LedgerError};
use async_trait::async_trait;
use cognisight_core::LedgerRow;
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS submissions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    email       TEXT NOT NULL,
    image_link  TEXT NOT NULL,
    result      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);";

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        let ledger = Self { conn };
        ledger.migrate().await?;
        tracing::info!(path = %path.display(), "sqlite ledger opened");
        Ok(ledger)
    }

    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().await?;
        let ledger = Self { conn };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<(), LedgerError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    fn backend_tag(&self) -> &'static str {
        "sqlite"
    }

    async fn read_rows(&self) -> Result<Vec<LedgerRow>, LedgerError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT email, image_link, result FROM submissions ORDER BY id")?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok(LedgerRow::new(
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows.into_iter().filter(|r| !r.is_blank()).collect())
    }

    async fn append(&self, row: &LedgerRow) -> Result<(), LedgerError> {
        let row = row.clone();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO submissions (email, image_link, result, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![row.email, row.image_link, row.result, created_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
