//! Wires the configured photo store and ledger, sharing one OAuth credential.

use crate::config::{Config, ImageStoreKind, LedgerKind};
use cognisight_store::{
    AuthError, AuthorizedUser, DriveImageStore, ImageStore, Ledger, LedgerError, LocalDirImageStore,
    MemoryImageStore, MemoryLedger, OAuthTokenCache, SheetsLedger, SqliteLedger, TokenProvider,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("credential setup failed: {0}")]
    Auth(#[from] AuthError),
    #[error("ledger setup failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("spreadsheet id is not configured")]
    MissingSpreadsheet,
}

pub struct Backends {
    tokens: Option<Arc<OAuthTokenCache>>,
    pub images: Arc<dyn ImageStore>,
    pub ledger: Arc<dyn Ledger>,
}

impl Backends {
    /// Build both backends. Google credentials are initialized once, up
    /// front, and only when a Google backend is selected.
    pub async fn build(config: &Config) -> Result<Self, BackendError> {
        let client = cognisight_store::http::client(config.request_timeout());

        let tokens = if config.needs_google_auth() {
            let creds = AuthorizedUser::from_file(&config.credentials_path)?;
            let cache = OAuthTokenCache::new(creds, client.clone()).init().await?;
            Some(Arc::new(cache))
        } else {
            None
        };
        let provider = || -> Result<Arc<dyn TokenProvider>, BackendError> {
            tokens
                .clone()
                .map(|t| t as Arc<dyn TokenProvider>)
                .ok_or(BackendError::Auth(AuthError::CredentialsNotFound(
                    config.credentials_path.display().to_string(),
                )))
        };

        let images: Arc<dyn ImageStore> = match config.image_store {
            ImageStoreKind::Drive => Arc::new(DriveImageStore::new(
                client.clone(),
                provider()?,
                config.drive_folder_id.clone(),
            )),
            ImageStoreKind::Local => Arc::new(LocalDirImageStore::new(config.local_image_dir.clone())),
            ImageStoreKind::Memory => Arc::new(MemoryImageStore::new()),
        };

        let ledger: Arc<dyn Ledger> = match config.ledger {
            LedgerKind::Sheets => {
                let spreadsheet_id = config
                    .spreadsheet_id
                    .clone()
                    .ok_or(BackendError::MissingSpreadsheet)?;
                Arc::new(SheetsLedger::new(
                    client.clone(),
                    provider()?,
                    spreadsheet_id,
                    config.worksheet.clone(),
                ))
            }
            LedgerKind::Sqlite => Arc::new(SqliteLedger::open(&config.db_path).await?),
            LedgerKind::Memory => Arc::new(MemoryLedger::new()),
        };

        ledger.ensure_header().await?;
        let rows = ledger.read_rows().await?;
        tracing::info!(
            images = images.backend_tag(),
            ledger = ledger.backend_tag(),
            rows = rows.len(),
            "storage backends ready"
        );

        Ok(Self {
            tokens,
            images,
            ledger,
        })
    }

    /// Release the OAuth credential, if one was minted.
    pub async fn shutdown(&self) {
        if let Some(tokens) = &self.tokens {
            tokens.shutdown().await;
        }
    }
}
