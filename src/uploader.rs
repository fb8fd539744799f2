//! Batch upload of a local directory into a remote image collection
//!
//! A run authenticates once, resolves and creates the destination
//! collection, skips files that already exist remotely and then submits the
//! remaining files one at a time. Per-file failures are written to the
//! failure report and never stop the batch.

use crate::error::{Error, Result};
use crate::inventory::RemoteInventory;
use crate::metadata::{MetadataTable, load_metadata_from_csv};
use crate::models::{AssetKind, Config, FailureRecord, LocalAsset};
use crate::output::{AssetFormatter, FORMATTER, OutputFormatter};
use crate::paths::{self, AssetPathResolver};
use crate::remote::AssetApi;
use crate::report::FailureReport;
use crate::retry::RetryPolicy;
use crate::session::Authenticator;
use crate::throttle::{TaskRegistry, ThrottleController};
use crate::worker::{IngestionOptions, UploadWorker};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// What to upload and where
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Account used for the storage login
    pub user: String,
    pub source_dir: PathBuf,
    /// Absolute destination, used verbatim
    pub destination: Option<String>,
    /// Collection name, absolute (`users/...`) or relative to the home root
    pub collection: Option<String>,
    /// Metadata CSV; when set every file needs a row
    pub metadata_path: Option<PathBuf>,
    pub ingestion: IngestionOptions,
}

impl UploadOptions {
    /// Collection name, falling back to the source directory's name when no
    /// destination was given at all
    pub fn effective_collection(&self) -> Option<String> {
        if self.destination.is_some() || self.collection.is_some() {
            return self.collection.clone();
        }
        let dir = self
            .source_dir
            .canonicalize()
            .unwrap_or_else(|_| self.source_dir.clone());
        dir.file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Absolute id of the destination collection
    pub destination: String,
    /// Files with the expected extension found locally
    pub local_assets: usize,
    /// Files not yet present remotely
    pub pending: usize,
    /// Ingestion tasks started
    pub submitted: usize,
    /// Rows written to the failure report
    pub failures: usize,
    pub report_path: PathBuf,
}

/// Files directly under `dir` with the given extension, sorted by path
pub fn discover_local_assets(dir: &Path, extension: &str) -> Result<Vec<LocalAsset>> {
    if !dir.is_dir() {
        return Err(Error::file_not_found(dir));
    }

    let mut assets: Vec<LocalAsset> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .filter_map(|e| LocalAsset::from_path(e.into_path()))
        .collect();
    assets.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(assets)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct UploadOrchestrator<'a> {
    authenticator: &'a dyn Authenticator,
    api: &'a dyn AssetApi,
    config: &'a Config,
}

impl<'a> UploadOrchestrator<'a> {
    pub fn new(
        authenticator: &'a dyn Authenticator,
        api: &'a dyn AssetApi,
        config: &'a Config,
    ) -> Self {
        Self {
            authenticator,
            api,
            config,
        }
    }

    /// Runs one batch upload
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when both a destination and a collection are given
    /// - `Authentication` when the storage login is rejected
    /// - `NoLocalAssets` when the source directory holds no matching file
    /// - `NothingToUpload` when the collection already holds every file
    ///
    /// Per-file failures are not errors; they end up in the report.
    pub async fn run(&self, options: &UploadOptions, password: &str) -> Result<UploadSummary> {
        let collection = options.effective_collection();
        if options.destination.is_some() && collection.is_some() {
            return Err(Error::invalid_argument(
                "destination path and collection name are mutually exclusive",
            ));
        }
        let metadata = match &options.metadata_path {
            Some(path) => Some(load_metadata_from_csv(path)?),
            None => None,
        };

        let storage = self.authenticator.authenticate(&options.user, password).await?;
        info!("Authenticated as {}", options.user);

        let destination = AssetPathResolver::new(self.api)
            .resolve(options.destination.as_deref(), collection.as_deref())
            .await?;
        self.ensure_collection(&destination).await?;

        let local = discover_local_assets(&options.source_dir, &self.config.upload.extension)?;
        if local.is_empty() {
            return Err(Error::no_local_assets(
                &options.source_dir,
                &self.config.upload.extension,
            ));
        }
        let local_names: BTreeSet<String> = local.iter().map(|a| a.name.clone()).collect();
        let pending_names = RemoteInventory::new(self.api)
            .diff(&local_names, &destination)
            .await?;
        if pending_names.is_empty() {
            return Err(Error::nothing_to_upload(&destination));
        }
        let pending: Vec<&LocalAsset> = local
            .iter()
            .filter(|a| pending_names.contains(&a.name))
            .collect();
        info!(
            "{} of {} local assets to upload into {}",
            pending.len(),
            local.len(),
            destination
        );

        let mut report = FailureReport::create(&self.config.upload.failure_report)?;
        let worker = UploadWorker::new(
            self.api,
            storage.as_ref(),
            RetryPolicy::from(&self.config.retry),
            options.ingestion.clone(),
        );
        let throttle = ThrottleController::new(self.api, self.config.throttle.clone());
        let mut registry = TaskRegistry::new();
        let mut submitted = 0;

        for (index, asset) in pending.iter().enumerate() {
            let started = self
                .upload_one(
                    asset,
                    index,
                    pending.len(),
                    &destination,
                    metadata.as_ref(),
                    &worker,
                    &mut registry,
                    &mut report,
                )
                .await?;
            if started {
                submitted += 1;
            }
            throttle
                .maybe_throttle(index, &mut registry, &mut report)
                .await?;
        }

        throttle.sweep_failures(&mut registry, &mut report).await?;
        let report_path = report.path().to_path_buf();
        let failures = report.finish()?;

        Ok(UploadSummary {
            destination,
            local_assets: local.len(),
            pending: pending.len(),
            submitted,
            failures,
            report_path,
        })
    }

    /// Creates the destination as an image collection unless it exists
    async fn ensure_collection(&self, destination: &str) -> Result<()> {
        if self.api.asset_info(destination).await?.is_some() {
            info!("Collection {} already exists", destination);
            return Ok(());
        }
        self.api
            .create_asset(destination, AssetKind::Collection)
            .await?;
        if self.config.verbose {
            info!("Created collection {}", destination);
        } else {
            FORMATTER.print_success(&FORMATTER.format_collection_created(destination));
        }
        Ok(())
    }

    /// Uploads one file; returns whether an ingestion task was started
    ///
    /// Only report write failures are returned as errors.
    #[allow(clippy::too_many_arguments)]
    async fn upload_one(
        &self,
        asset: &LocalAsset,
        index: usize,
        total: usize,
        destination: &str,
        metadata: Option<&MetadataTable>,
        worker: &UploadWorker<'_>,
        registry: &mut TaskRegistry,
        report: &mut FailureReport,
    ) -> Result<bool> {
        let filename = display_name(&asset.path);
        let properties = match metadata {
            Some(table) => match table.get(&asset.name) {
                Some(properties) => Some(properties),
                None => {
                    let e = Error::missing_metadata(&asset.name);
                    warn!("{}: {}, not ingested", filename, e);
                    if !self.config.verbose {
                        FORMATTER.print_skip(&FORMATTER.format_skip_missing_metadata(&asset.path));
                    }
                    report.record(&FailureRecord::new(filename, None, e.to_string()))?;
                    return Ok(false);
                }
            },
            None => None,
        };

        if self.config.verbose {
            info!("[{}/{}] Uploading {}", index + 1, total, asset.path.display());
        } else {
            FORMATTER.print_progress(&FORMATTER.format_upload_progress(index + 1, total, &asset.path));
        }

        let asset_id = paths::join(destination, &asset.name);
        match worker.submit_with_retry(&asset.path, &asset_id, properties).await {
            Ok(task_id) => {
                if self.config.verbose {
                    info!("Started ingestion of {} as task {}", asset_id, task_id);
                } else {
                    FORMATTER.print_success(&FORMATTER.format_upload_success(&asset.path, &task_id));
                }
                registry.insert(task_id, filename);
                Ok(true)
            }
            Err(e) => {
                warn!("Giving up on {}: {}", asset.path.display(), e);
                if !self.config.verbose {
                    FORMATTER.print_error(&FORMATTER.format_upload_failure(&asset.path, &e.to_string()));
                }
                report.record(&FailureRecord::new(filename, None, e.to_string()))?;
                Ok(false)
            }
        }
    }
}
