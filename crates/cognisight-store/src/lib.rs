//! cognisight-store — Where photos and results end up.
//!
//! Photos go to an [`ImageStore`] (Google Drive in production), result rows
//! to a [`Ledger`] (Google Sheets in production). Both Google backends share
//! one cached OAuth credential via [`TokenProvider`].

pub mod auth;
pub mod drive;
pub mod http;
pub mod ledger;
pub mod local;
pub mod sheets;
pub mod sqlite;

#[cfg(test)]
mod test_support;

pub use auth::{AuthError, AuthorizedUser, OAuthTokenCache, StaticToken, TokenProvider};
pub use drive::{DriveImageStore, ImageStore, UploadError};
pub use ledger::{merge_rows, Ledger, LedgerError, MemoryLedger};
pub use local::{LocalDirImageStore, MemoryImageStore};
pub use sheets::SheetsLedger;
pub use sqlite::SqliteLedger;
