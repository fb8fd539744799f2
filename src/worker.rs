//! Single-file upload: storage transfer followed by an ingestion task

use crate::error::{Error, Result};
use crate::models::{IngestionRequest, Properties, UploadMode};
use crate::remote::AssetApi;
use crate::retry::RetryPolicy;
use crate::session::StorageGateway;
use std::path::Path;
use tracing::debug;

/// Per-run options applied to every ingestion request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionOptions {
    pub mode: UploadMode,
    /// Value burned into the raster as missing data
    pub nodata: Option<i64>,
    /// Band names; empty lets the platform name them
    pub bands: Vec<String>,
}

/// Uploads one local file and starts its ingestion
pub struct UploadWorker<'a> {
    api: &'a dyn AssetApi,
    storage: &'a dyn StorageGateway,
    retry: RetryPolicy,
    options: IngestionOptions,
}

impl<'a> UploadWorker<'a> {
    pub fn new(
        api: &'a dyn AssetApi,
        storage: &'a dyn StorageGateway,
        retry: RetryPolicy,
        options: IngestionOptions,
    ) -> Self {
        Self {
            api,
            storage,
            retry,
            options,
        }
    }

    /// Ingestion request for an uploaded storage object
    pub fn build_request(
        &self,
        remote_name: &str,
        gsid: &str,
        properties: Option<&Properties>,
    ) -> IngestionRequest {
        IngestionRequest::new(remote_name, gsid)
            .with_properties(properties.cloned())
            .with_nodata(self.options.nodata)
            .with_bands(&self.options.bands)
    }

    /// One attempt: fresh upload URL, transfer, ingestion under a new task id
    ///
    /// Returns the task id without waiting for the ingestion to finish.
    pub async fn submit(
        &self,
        local_path: &Path,
        remote_name: &str,
        properties: Option<&Properties>,
    ) -> Result<String> {
        let upload_url = self.storage.upload_url().await.map_err(|e| match e {
            Error::Transfer { .. } => e,
            other => Error::transfer(local_path, other.to_string()),
        })?;
        debug!("Upload URL for {}: {}", local_path.display(), upload_url);

        let gsid = self
            .storage
            .transfer(&upload_url, local_path, self.options.mode)
            .await
            .map_err(|e| match e {
                Error::Transfer { .. } => e,
                other => Error::transfer(local_path, other.to_string()),
            })?;
        debug!("Stored {} as {}", local_path.display(), gsid);

        let request = self.build_request(remote_name, &gsid, properties);
        let task_id = self
            .api
            .new_task_id()
            .await
            .map_err(|e| Error::ingestion(remote_name, e.to_string()))?;
        self.api
            .start_ingestion(&task_id, &request)
            .await
            .map_err(|e| Error::ingestion(remote_name, e.to_string()))?;

        Ok(task_id)
    }

    /// `submit` under the retry policy; the last error is returned when attempts run out
    pub async fn submit_with_retry(
        &self,
        local_path: &Path,
        remote_name: &str,
        properties: Option<&Properties>,
    ) -> Result<String> {
        let label = format!("Upload of {}", local_path.display());
        self.retry
            .run(&label, move |_| {
                self.submit(local_path, remote_name, properties)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeEarthEngine, FakeStorage};
    use std::path::PathBuf;

    fn worker<'a>(
        api: &'a FakeEarthEngine,
        storage: &'a FakeStorage,
        attempts: u32,
        options: IngestionOptions,
    ) -> UploadWorker<'a> {
        UploadWorker::new(api, storage, RetryPolicy::immediate(attempts), options)
    }

    #[tokio::test]
    async fn test_submit_starts_ingestion() {
        let api = FakeEarthEngine::with_root("users/me");
        let storage = FakeStorage::default();
        let options = IngestionOptions {
            mode: UploadMode::Multipart,
            nodata: Some(-9999),
            bands: vec!["elevation".to_string()],
        };
        let worker = worker(&api, &storage, 3, options);

        let mut properties = Properties::new();
        properties.insert("id_no".to_string(), "a".to_string());

        let task_id = worker
            .submit(&PathBuf::from("/data/a.tif"), "users/me/col/a", Some(&properties))
            .await
            .unwrap();
        assert_eq!(task_id, "TASK1");

        let state = api.state();
        let (submitted_task, request) = &state.ingestions[0];
        assert_eq!(submitted_task, "TASK1");
        assert_eq!(request.id, "users/me/col/a");
        assert_eq!(request.tilesets[0].sources[0].primary_path, "gs://fake-bucket/a.tif");
        assert_eq!(request.properties.as_ref().unwrap()["id_no"], "a");
        assert_eq!(request.missing_data.as_ref().unwrap().value, -9999);
        assert_eq!(request.bands[0].id, "elevation");

        let transfers = storage.transfers.lock().unwrap();
        assert_eq!(transfers[0], ("a.tif".to_string(), UploadMode::Multipart));
    }

    #[tokio::test]
    async fn test_retry_makes_k_plus_one_attempts() {
        let api = FakeEarthEngine::with_root("users/me");
        let storage = FakeStorage::default();
        storage.fail_times("a.tif", 2);
        let worker = worker(&api, &storage, 5, IngestionOptions::default());

        let task_id = worker
            .submit_with_retry(&PathBuf::from("a.tif"), "users/me/col/a", None)
            .await
            .unwrap();

        assert_eq!(task_id, "TASK1");
        assert_eq!(storage.attempts_for("a.tif"), 3);
        // A fresh upload URL for every attempt
        assert_eq!(storage.urls_issued(), 3);
        assert_eq!(api.state().ingestions.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_raises() {
        let api = FakeEarthEngine::with_root("users/me");
        let storage = FakeStorage::default();
        storage.fail_times("b.tif", 10);
        let worker = worker(&api, &storage, 3, IngestionOptions::default());

        let result = worker
            .submit_with_retry(&PathBuf::from("b.tif"), "users/me/col/b", None)
            .await;

        assert!(matches!(result, Err(Error::Transfer { .. })));
        assert_eq!(storage.attempts_for("b.tif"), 3);
        assert!(api.state().ingestions.is_empty());
    }

    #[tokio::test]
    async fn test_ingestion_failure_is_retried_whole() {
        let api = FakeEarthEngine::with_root("users/me");
        api.state()
            .ingestion_failures
            .insert("users/me/col/c".to_string(), 1);
        let storage = FakeStorage::default();
        let worker = worker(&api, &storage, 3, IngestionOptions::default());

        let task_id = worker
            .submit_with_retry(&PathBuf::from("c.tif"), "users/me/col/c", None)
            .await
            .unwrap();

        // First task id was burned by the failed ingestion
        assert_eq!(task_id, "TASK2");
        assert_eq!(storage.attempts_for("c.tif"), 2);
    }

    #[tokio::test]
    async fn test_ingestion_error_category() {
        let api = FakeEarthEngine::with_root("users/me");
        api.state()
            .ingestion_failures
            .insert("users/me/col/d".to_string(), 5);
        let storage = FakeStorage::default();
        let worker = worker(&api, &storage, 2, IngestionOptions::default());

        let result = worker
            .submit_with_retry(&PathBuf::from("d.tif"), "users/me/col/d", None)
            .await;
        assert!(matches!(result, Err(Error::Ingestion { .. })));
    }
}
