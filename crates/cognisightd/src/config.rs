use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Google Drive folder that receives submitted photos.
const DEFAULT_DRIVE_FOLDER_ID: &str = "1oUYXeaqAcmoZ3Y1I_VMsw5_I3gWlwbu-";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("{0} must be set when using the {1} backend")]
    Missing(&'static str, &'static str),
}

/// Where submitted photos are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStoreKind {
    Drive,
    Local,
    Memory,
}

impl FromStr for ImageStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drive" => Ok(Self::Drive),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Where result rows are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Sheets,
    Sqlite,
    Memory,
}

impl FromStr for LedgerKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sheets" => Ok(Self::Sheets),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Optional TOML file layer. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_addr: Option<String>,
    model_path: Option<PathBuf>,
    image_store: Option<ImageStoreKind>,
    ledger: Option<LedgerKind>,
    credentials_path: Option<PathBuf>,
    drive_folder_id: Option<String>,
    spreadsheet_id: Option<String>,
    worksheet: Option<String>,
    local_image_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    server_timeout_secs: Option<u64>,
    max_upload_bytes: Option<usize>,
    admin_token: Option<String>,
}

/// Daemon configuration: defaults, then the TOML file named by
/// `COGNISIGHT_CONFIG` (if any), then `COGNISIGHT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address (default: 0.0.0.0:8501).
    pub bind_addr: String,
    /// ONNX export of the classifier.
    pub model_path: PathBuf,
    pub image_store: ImageStoreKind,
    pub ledger: LedgerKind,
    /// `authorized_user` OAuth credentials for Drive and Sheets.
    pub credentials_path: PathBuf,
    pub drive_folder_id: String,
    pub spreadsheet_id: Option<String>,
    /// Worksheet (tab) name inside the spreadsheet.
    pub worksheet: String,
    pub local_image_dir: PathBuf,
    pub db_path: PathBuf,
    /// Timeout for each outbound Google API call.
    pub request_timeout_secs: u64,
    /// Timeout for a whole inbound HTTP request.
    pub server_timeout_secs: u64,
    /// Largest accepted photo upload.
    pub max_upload_bytes: usize,
    /// Bearer token for `GET /api/ledger`. The route is not served without one.
    pub admin_token: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = match lookup("COGNISIGHT_CONFIG") {
            Some(path) => read_file(Path::new(&path))?,
            None => FileConfig::default(),
        };

        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("cognisight");

        let env = Env { lookup: &lookup };

        Ok(Self {
            bind_addr: env
                .string("COGNISIGHT_BIND_ADDR")
                .or(file.bind_addr)
                .unwrap_or_else(|| "0.0.0.0:8501".to_string()),
            model_path: env
                .path("COGNISIGHT_MODEL_PATH")
                .or(file.model_path)
                .unwrap_or_else(|| PathBuf::from(cognisight_core::DEFAULT_MODEL_FILE)),
            image_store: env
                .parsed("COGNISIGHT_IMAGE_STORE")?
                .or(file.image_store)
                .unwrap_or(ImageStoreKind::Drive),
            ledger: env
                .parsed("COGNISIGHT_LEDGER")?
                .or(file.ledger)
                .unwrap_or(LedgerKind::Sheets),
            credentials_path: env
                .path("COGNISIGHT_CREDENTIALS_PATH")
                .or(file.credentials_path)
                .unwrap_or_else(|| PathBuf::from("client_secrets.json")),
            drive_folder_id: env
                .string("COGNISIGHT_DRIVE_FOLDER_ID")
                .or(file.drive_folder_id)
                .unwrap_or_else(|| DEFAULT_DRIVE_FOLDER_ID.to_string()),
            spreadsheet_id: env
                .string("COGNISIGHT_SPREADSHEET_ID")
                .or(file.spreadsheet_id),
            worksheet: env
                .string("COGNISIGHT_WORKSHEET")
                .or(file.worksheet)
                .unwrap_or_else(|| "Image".to_string()),
            local_image_dir: env
                .path("COGNISIGHT_LOCAL_IMAGE_DIR")
                .or(file.local_image_dir)
                .unwrap_or_else(|| data_dir.join("photos")),
            db_path: env
                .path("COGNISIGHT_DB_PATH")
                .or(file.db_path)
                .unwrap_or_else(|| data_dir.join("ledger.db")),
            request_timeout_secs: env
                .parsed("COGNISIGHT_REQUEST_TIMEOUT_SECS")?
                .or(file.request_timeout_secs)
                .unwrap_or(30),
            server_timeout_secs: env
                .parsed("COGNISIGHT_SERVER_TIMEOUT_SECS")?
                .or(file.server_timeout_secs)
                .unwrap_or(120),
            max_upload_bytes: env
                .parsed("COGNISIGHT_MAX_UPLOAD_BYTES")?
                .or(file.max_upload_bytes)
                .unwrap_or(10 * 1024 * 1024),
            admin_token: env
                .string("COGNISIGHT_ADMIN_TOKEN")
                .or(file.admin_token)
                .filter(|t| !t.trim().is_empty()),
        })
    }

    /// Reject combinations that cannot start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger == LedgerKind::Sheets && self.spreadsheet_id.is_none() {
            return Err(ConfigError::Missing("COGNISIGHT_SPREADSHEET_ID", "sheets"));
        }
        if self.drive_folder_id.trim().is_empty() && self.image_store == ImageStoreKind::Drive {
            return Err(ConfigError::Missing("COGNISIGHT_DRIVE_FOLDER_ID", "drive"));
        }
        Ok(())
    }

    /// True when any backend talks to Google and needs the OAuth credential.
    pub fn needs_google_auth(&self) -> bool {
        self.image_store == ImageStoreKind::Drive || self.ledger == LedgerKind::Sheets
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Typed accessors over the variable lookup. Empty values count as unset.
struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.string(key).map(PathBuf::from)
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            None => Ok(None),
            Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        }
    }
}
