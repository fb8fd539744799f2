//! Data models and configuration for the geebam library
//!
//! This module contains the configuration layers (defaults, YAML/JSON file,
//! environment) and the remote asset-tree and task types shared by the
//! upload pipeline and the remover.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key-value properties attached to an ingested image
pub type Properties = BTreeMap<String, String>;

/// Default REST root of the asset platform
pub const DEFAULT_API_URL: &str = "https://earthengine.googleapis.com/api";

/// Configuration for the geebam application
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Remote asset API settings
    pub api: ApiSettings,
    /// Login flow used to obtain an upload session
    pub login: LoginSettings,
    /// Retry policy for per-file uploads
    pub retry: RetrySettings,
    /// Running-task ceiling and polling cadence
    pub throttle: ThrottleSettings,
    /// Local discovery and reporting
    pub upload: UploadSettings,
    /// Enable verbose logging
    #[serde(skip)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Request timeout; the transport default applies when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoginSettings {
    /// Page serving the login form
    pub accounts_url: String,
    /// Endpoint the login form is submitted to
    pub login_url: String,
    /// Endpoint handing out one-time upload URLs
    pub upload_url_endpoint: String,
    /// Text expected somewhere in the post-login page; empty disables the check
    pub success_markers: Vec<String>,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            accounts_url: "https://accounts.google.com".to_string(),
            login_url: "https://accounts.google.com/ServiceLoginAuth".to_string(),
            upload_url_endpoint: "https://ee-api.appspot.com/assets/upload/geturl".to_string(),
            success_markers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            multiplier: 2,
            max_delay_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThrottleSettings {
    /// Check task status every `period` processed files
    pub period: usize,
    /// Ceiling on remote tasks in the RUNNING state
    pub max_running_tasks: usize,
    /// Sleep between rechecks while above the ceiling
    pub wait_secs: u64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            period: 4,
            max_running_tasks: 20,
            wait_secs: 10,
        }
    }
}

impl ThrottleSettings {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadSettings {
    /// Extension (without dot) of files picked up from the source directory
    pub extension: String,
    /// Where the failure CSV is written
    pub failure_report: PathBuf,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            extension: "tif".to_string(),
            failure_report: PathBuf::from("failed_upload.csv"),
        }
    }
}

impl Config {
    /// Creates a configuration from defaults and environment variables
    ///
    /// # Optional Environment Variables
    ///
    /// - `EE_ACCESS_TOKEN`: bearer token for the asset API
    /// - `EE_API_URL`: override for the asset API root
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML (`.yaml`, `.yml`) or JSON (`.json`) file
    ///
    /// Environment variables still override values found in the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::file_not_found(path));
        }

        let content = tokio::fs::read_to_string(path).await?;
        let mut config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => {
                return Err(Error::config(format!(
                    "Unsupported config format: {} (use .yaml, .yml or .json)",
                    path.display()
                )));
            }
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = env::var("EE_ACCESS_TOKEN")
            && !token.trim().is_empty()
        {
            self.api.access_token = Some(token);
        }
        if let Ok(url) = env::var("EE_API_URL")
            && !url.trim().is_empty()
        {
            self.api.base_url = url;
        }
    }

    /// Sets the verbose flag
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(Error::config("API base URL cannot be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier == 0 {
            return Err(Error::config("retry.multiplier must be at least 1"));
        }
        if self.throttle.period == 0 {
            return Err(Error::config("throttle.period must be at least 1"));
        }
        if self.upload.extension.trim().is_empty() {
            return Err(Error::config("upload.extension cannot be empty"));
        }
        Ok(())
    }
}

/// Kind of node in the remote asset tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetKind {
    Image,
    Folder,
    /// Image collection, or any other container type the platform reports
    Collection,
}

impl AssetKind {
    /// Type string used by the remote API
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "Image",
            AssetKind::Folder => "Folder",
            AssetKind::Collection => "ImageCollection",
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, AssetKind::Image)
    }
}

impl From<String> for AssetKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Image" | "IMAGE" => AssetKind::Image,
            "Folder" | "FOLDER" => AssetKind::Folder,
            _ => AssetKind::Collection,
        }
    }
}

impl From<AssetKind> for String {
    fn from(kind: AssetKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A node of the remote asset tree as returned by listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
}

impl AssetNode {
    pub fn new(id: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Last path segment of the asset id
    pub fn name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

/// Detailed asset information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Last modification, microseconds since the epoch
    #[serde(default)]
    pub version: Option<i64>,
}

impl AssetInfo {
    pub fn node(&self) -> AssetNode {
        AssetNode::new(self.id.clone(), self.kind)
    }

    /// Stored size in bytes when the platform reports one
    pub fn size_bytes(&self) -> Option<u64> {
        self.properties
            .get("system:asset_size")
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
    }
}

/// Access control list of an asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetAcl {
    pub owners: Vec<String>,
    pub readers: Vec<String>,
    pub writers: Vec<String>,
}

/// State of a remote task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Unsubmitted,
    Ready,
    Running,
    Completed,
    Failed,
    CancelRequested,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Terminal states that mean the ingestion did not produce an asset
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// A remote task as reported by the task list or status endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TaskInfo {
    pub fn new(id: impl Into<String>, state: TaskState) -> Self {
        Self {
            id: id.into(),
            state,
            description: None,
            error_message: None,
        }
    }
}

/// How a file body is sent to the storage intermediary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadMode {
    /// Raw file as a single form part
    #[default]
    Simple,
    /// Streamed multipart/form-data body with async completion, for large files
    Multipart,
}

/// A local raster and the asset name derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub path: PathBuf,
    pub name: String,
}

impl LocalAsset {
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let name = crate::paths::asset_name_from_path(&path)?;
        Some(Self { path, name })
    }
}

/// One row of the failure report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub filename: String,
    pub task_id: String,
    pub error_msg: String,
}

impl FailureRecord {
    /// Task id written when the file never reached the ingestion stage
    pub const NO_TASK: &'static str = "0";

    pub fn new(
        filename: impl Into<String>,
        task_id: Option<&str>,
        error_msg: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            task_id: task_id.unwrap_or(Self::NO_TASK).to_string(),
            error_msg: error_msg.into(),
        }
    }
}

/// Ingestion request body submitted under a new task id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    pub id: String,
    pub tilesets: Vec<Tileset>,
    pub bands: Vec<BandSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_data: Option<MissingData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tileset {
    pub sources: Vec<TilesetSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilesetSource {
    pub primary_path: String,
    pub additional_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSpec {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingData {
    pub value: i64,
}

impl IngestionRequest {
    /// Builds a single-source image request for an uploaded storage object
    pub fn new(asset_id: impl Into<String>, gsid: impl Into<String>) -> Self {
        Self {
            id: asset_id.into(),
            tilesets: vec![Tileset {
                sources: vec![TilesetSource {
                    primary_path: gsid.into(),
                    additional_paths: Vec::new(),
                }],
            }],
            bands: Vec::new(),
            properties: None,
            missing_data: None,
        }
    }

    pub fn with_properties(mut self, properties: Option<Properties>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_nodata(mut self, nodata: Option<i64>) -> Self {
        self.missing_data = nodata.map(|value| MissingData { value });
        self
    }

    pub fn with_bands(mut self, bands: &[String]) -> Self {
        self.bands = bands.iter().map(|id| BandSpec { id: id.clone() }).collect();
        self
    }
}
