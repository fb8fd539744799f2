//! Google Earth Engine Batch Asset Manager Library
//!
//! A library for managing assets on the Earth Engine platform in bulk:
//! uploading directories of rasters into image collections, deleting asset
//! trees, cancelling running tasks and reporting asset sizes.
//!
//! ## Features
//!
//! - Resumable uploads: files already present in the destination are skipped
//! - Per-file retry with exponential backoff; failures go to a CSV report
//! - Submission throttled against the number of running remote tasks
//! - Optional per-file properties from a metadata CSV
//! - Recursive removal of folders and collections, children first
//!
//! ## Usage
//!
//! ```rust,no_run
//! use geebam::{AssetManager, Config, Result, UploadOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let manager = AssetManager::new(config)?;
//!
//!     let options = UploadOptions {
//!         user: "pinkiepie@gmail.com".to_string(),
//!         source_dir: "./tiles".into(),
//!         collection: Some("rainbow".to_string()),
//!         ..Default::default()
//!     };
//!     let summary = manager.upload(&options, "password").await?;
//!     println!("{} tasks started", summary.submitted);
//!
//!     manager.delete("rainbow").await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod info;
pub mod inventory;
pub mod metadata;
pub mod models;
pub mod output;
pub mod paths;
pub mod remote;
pub mod remover;
pub mod report;
pub mod retry;
pub mod session;
pub mod tasks;
pub mod throttle;
pub mod uploader;
pub mod worker;

#[cfg(test)]
mod fakes;

pub use error::{Error, Result};
pub use models::Config;
pub use uploader::{UploadOptions, UploadSummary};

use remote::{AssetApi, EarthEngineClient};
use session::{AuthSession, Authenticator};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Entry point tying the platform client, login flow and configuration together
pub struct AssetManager {
    api: Arc<dyn AssetApi>,
    config: Config,
}

impl AssetManager {
    /// Creates a manager talking to the configured platform endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let api = EarthEngineClient::new(&config.api)?;
        Ok(Self::with_api(Arc::new(api), config))
    }

    /// Creates a manager over any implementation of the platform API
    pub fn with_api(api: Arc<dyn AssetApi>, config: Config) -> Self {
        Self { api, config }
    }

    /// Uploads a directory, logging in with the configured form login
    ///
    /// # Errors
    ///
    /// See [`uploader::UploadOrchestrator::run`]
    pub async fn upload(&self, options: &UploadOptions, password: &str) -> Result<UploadSummary> {
        let auth = AuthSession::new(self.config.login.clone())
            .with_timeout(self.config.api.timeout_secs.map(Duration::from_secs));
        self.upload_with(&auth, options, password).await
    }

    /// Uploads a directory using the given authenticator
    pub async fn upload_with(
        &self,
        authenticator: &dyn Authenticator,
        options: &UploadOptions,
        password: &str,
    ) -> Result<UploadSummary> {
        uploader::UploadOrchestrator::new(authenticator, self.api.as_ref(), &self.config)
            .run(options, password)
            .await
    }

    /// Deletes an asset and everything below it
    ///
    /// Paths without a root namespace are placed under the home root.
    pub async fn delete(&self, path: &str) -> Result<usize> {
        remover::AssetRemover::new(self.api.as_ref())
            .with_verbose(self.config.verbose)
            .delete(path, true)
            .await
    }

    /// Cancels every running task, returning how many were cancelled
    pub async fn cancel_running_tasks(&self) -> Result<usize> {
        tasks::cancel_running_tasks(self.api.as_ref()).await
    }

    /// Prints the asset report, also writing `NAME.csv` when a name is given
    ///
    /// Returns the total size in MB.
    pub async fn report(&self, filename: Option<&Path>) -> Result<f64> {
        let mut writer = info::ReportWriter::new(filename)?;
        info::AssetReporter::new(self.api.as_ref())
            .write_report(&mut writer)
            .await?;
        writer.finish()
    }
}
