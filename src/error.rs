//! Error types for the geebam library
//!
//! Library errors use `thiserror`; the binary layers `anyhow` context on top.
//! Variants follow the batch manager's failure taxonomy: authentication and
//! missing delete targets are fatal, per-file transfer/ingestion problems are
//! recorded and the batch moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the geebam library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the geebam library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Regular expression error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Login against the platform was rejected
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Remote asset does not exist
    #[error("Asset not found: {path}")]
    AssetNotFound { path: String },

    /// A metadata source was configured but holds no row for this asset
    #[error("missing metadata for {name}")]
    MissingMetadata { name: String },

    /// Upload URL or file transfer to the storage intermediary failed
    #[error("Transfer of {path} failed: {reason}")]
    Transfer { path: PathBuf, reason: String },

    /// Ingestion task could not be created or started
    #[error("Ingestion of {asset} failed: {reason}")]
    Ingestion { asset: String, reason: String },

    /// Any other error reported by the remote platform
    #[error("Remote service error: {message}")]
    RemoteService { message: String },

    /// Destination collection already holds every local asset
    #[error("Collection {collection} already contains all assets provided for upload")]
    NothingToUpload { collection: String },

    /// Source directory has no files with the expected extension
    #[error("No *.{extension} files found in {path}")]
    NoLocalAssets { path: PathBuf, extension: String },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Invalid combination of command-line arguments
    #[error("Invalid arguments: {message}")]
    InvalidArgument { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic error with context
    #[error("Operation failed: {message}")]
    Generic { message: String },
}

impl Error {
    /// Creates a new authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new asset not found error
    pub fn asset_not_found(path: impl Into<String>) -> Self {
        Self::AssetNotFound { path: path.into() }
    }

    /// Creates a new missing metadata error
    pub fn missing_metadata(name: impl Into<String>) -> Self {
        Self::MissingMetadata { name: name.into() }
    }

    /// Creates a new transfer error
    pub fn transfer(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new ingestion error
    pub fn ingestion(asset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Ingestion {
            asset: asset.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new remote service error
    pub fn remote_service(message: impl Into<String>) -> Self {
        Self::RemoteService {
            message: message.into(),
        }
    }

    /// Creates a new nothing-to-upload error
    pub fn nothing_to_upload(collection: impl Into<String>) -> Self {
        Self::NothingToUpload {
            collection: collection.into(),
        }
    }

    /// Creates a new error for a source directory without matching files
    pub fn no_local_assets(path: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self::NoLocalAssets {
            path: path.into(),
            extension: extension.into(),
        }
    }

    /// Creates a new file not found error
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a new invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Errors that end the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. }
                | Self::AssetNotFound { .. }
                | Self::InvalidArgument { .. }
                | Self::Config { .. }
        )
    }
}

/// Conversion from anyhow::Error for compatibility
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Generic {
            message: err.to_string(),
        }
    }
}
