//! Remote asset platform client
//!
//! `AssetApi` is the seam every component talks through: the asset tree
//! (roots, listings, info, create, delete, ACL) and the task queue (list,
//! cancel, new id, ingestion, status). `EarthEngineClient` binds it to the
//! platform's REST endpoints; tests substitute an in-memory implementation.

use crate::error::{Error, Result};
use crate::models::{
    ApiSettings, AssetAcl, AssetInfo, AssetKind, AssetNode, IngestionRequest, TaskInfo,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Largest number of task ids sent in one status query
const STATUS_BATCH: usize = 64;

/// Operations consumed from the remote asset platform
#[async_trait]
pub trait AssetApi: Send + Sync {
    /// Top-level roots the caller can write to; the first one is the user's home
    async fn asset_roots(&self) -> Result<Vec<AssetNode>>;

    /// Direct children of a folder or collection
    async fn list_children(&self, parent: &str) -> Result<Vec<AssetNode>>;

    /// Asset details, or `None` when the asset does not exist
    async fn asset_info(&self, id: &str) -> Result<Option<AssetInfo>>;

    async fn create_asset(&self, id: &str, kind: AssetKind) -> Result<()>;

    async fn delete_asset(&self, id: &str) -> Result<()>;

    async fn asset_acl(&self, id: &str) -> Result<AssetAcl>;

    /// All tasks visible to the caller
    async fn task_list(&self) -> Result<Vec<TaskInfo>>;

    async fn cancel_task(&self, task_id: &str) -> Result<()>;

    /// Reserves a fresh task identifier
    async fn new_task_id(&self) -> Result<String>;

    /// Starts ingestion of an uploaded file under a previously reserved id
    async fn start_ingestion(&self, task_id: &str, request: &IngestionRequest) -> Result<()>;

    /// Current status of the given tasks
    async fn task_status(&self, task_ids: &[String]) -> Result<Vec<TaskInfo>>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TaskListData {
    #[serde(default)]
    tasks: Vec<TaskInfo>,
}

/// REST client for the asset platform
#[derive(Clone, Debug)]
pub struct EarthEngineClient {
    base_url: String,
    access_token: Option<String>,
    http_client: Client,
}

impl EarthEngineClient {
    /// Creates a new client from API settings
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self::with_client(settings, builder.build()?))
    }

    /// Creates a new client with a custom HTTP client
    pub fn with_client(settings: &ApiSettings, http_client: Client) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            access_token: settings.access_token.clone(),
            http_client,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        debug!("GET {} {:?}", endpoint, query);
        let request = self.http_client.get(self.url(endpoint)).query(query);
        let response = self.authorize(request).send().await?;
        self.unwrap_envelope(endpoint, response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<Option<T>> {
        debug!("POST {}", endpoint);
        let request = self.http_client.post(self.url(endpoint)).form(form);
        let response = self.authorize(request).send().await?;
        self.unwrap_envelope(endpoint, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<Option<T>> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::remote_service(format!(
                "{} request failed with status {}: {}",
                endpoint, status, error_text
            )));
        }

        let envelope: Envelope<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(Error::remote_service(match error.code {
                Some(code) => format!("{} ({}): {}", endpoint, code, error.message),
                None => format!("{}: {}", endpoint, error.message),
            }));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl AssetApi for EarthEngineClient {
    async fn asset_roots(&self) -> Result<Vec<AssetNode>> {
        Ok(self.get("buckets", &[]).await?.unwrap_or_default())
    }

    async fn list_children(&self, parent: &str) -> Result<Vec<AssetNode>> {
        Ok(self.get("list", &[("id", parent)]).await?.unwrap_or_default())
    }

    async fn asset_info(&self, id: &str) -> Result<Option<AssetInfo>> {
        self.get("info", &[("id", id)]).await
    }

    async fn create_asset(&self, id: &str, kind: AssetKind) -> Result<()> {
        let value = json!({ "type": kind.as_str() }).to_string();
        self.post::<serde_json::Value>("create", &[("id", id.to_string()), ("value", value)])
            .await?;
        Ok(())
    }

    async fn delete_asset(&self, id: &str) -> Result<()> {
        self.post::<serde_json::Value>("delete", &[("id", id.to_string())])
            .await?;
        Ok(())
    }

    async fn asset_acl(&self, id: &str) -> Result<AssetAcl> {
        Ok(self.get("getacl", &[("id", id)]).await?.unwrap_or_default())
    }

    async fn task_list(&self) -> Result<Vec<TaskInfo>> {
        let data: Option<TaskListData> = self.get("tasklist", &[]).await?;
        Ok(data.map(|d| d.tasks).unwrap_or_default())
    }

    async fn cancel_task(&self, task_id: &str) -> Result<()> {
        self.post::<serde_json::Value>(
            "updatetask",
            &[("id", task_id.to_string()), ("action", "CANCEL".to_string())],
        )
        .await?;
        Ok(())
    }

    async fn new_task_id(&self) -> Result<String> {
        let ids: Vec<String> = self
            .post("newtaskid", &[("count", "1".to_string())])
            .await?
            .unwrap_or_default();
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::remote_service("newtaskid returned no identifier"))
    }

    async fn start_ingestion(&self, task_id: &str, request: &IngestionRequest) -> Result<()> {
        let body = serde_json::to_string(request)?;
        self.post::<serde_json::Value>(
            "ingestion",
            &[("id", task_id.to_string()), ("request", body)],
        )
        .await?;
        Ok(())
    }

    async fn task_status(&self, task_ids: &[String]) -> Result<Vec<TaskInfo>> {
        let mut statuses = Vec::with_capacity(task_ids.len());
        for chunk in task_ids.chunks(STATUS_BATCH) {
            let query = chunk.join(",");
            let batch: Vec<TaskInfo> = self
                .get("taskstatus", &[("q", query.as_str())])
                .await?
                .unwrap_or_default();
            statuses.extend(batch);
        }
        Ok(statuses)
    }
}
