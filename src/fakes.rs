//! In-memory stand-ins for the remote platform and the upload session

use crate::error::{Error, Result};
use crate::models::{
    AssetAcl, AssetInfo, AssetKind, AssetNode, IngestionRequest, TaskInfo, TaskState,
    UploadMode,
};
use crate::remote::AssetApi;
use crate::session::{Authenticator, StorageGateway};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
pub(crate) struct FakeState {
    pub roots: Vec<AssetNode>,
    pub assets: BTreeMap<String, AssetKind>,
    pub sizes: HashMap<String, u64>,
    pub acls: HashMap<String, AssetAcl>,
    pub tasks: Vec<TaskInfo>,
    /// Scripted RUNNING counts, one per task list call; the last value repeats
    pub running_counts: VecDeque<usize>,
    pub task_list_calls: usize,
    /// Task list calls that fail before the scripted counts apply
    pub task_list_failures: u32,
    /// Scripted answers for status queries
    pub statuses: HashMap<String, TaskInfo>,
    pub status_queries: Vec<Vec<String>>,
    pub fail_task_status: bool,
    pub next_task: u64,
    pub ingestions: Vec<(String, IngestionRequest)>,
    /// Remaining forced failures per asset id
    pub ingestion_failures: HashMap<String, u32>,
    pub cancelled: Vec<String>,
    pub events: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeEarthEngine {
    state: Mutex<FakeState>,
}

impl FakeEarthEngine {
    pub fn with_root(root: &str) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state();
            state.roots.push(AssetNode::new(root, AssetKind::Folder));
            state.assets.insert(root.to_string(), AssetKind::Folder);
        }
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_asset(&self, id: &str, kind: AssetKind) {
        self.state().assets.insert(id.to_string(), kind);
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state().assets.contains_key(id)
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    fn children_of(state: &FakeState, parent: &str) -> Vec<AssetNode> {
        let prefix = format!("{}/", parent);
        state
            .assets
            .iter()
            .filter(|(id, _)| id.starts_with(&prefix) && !id[prefix.len()..].contains('/'))
            .map(|(id, kind)| AssetNode::new(id.clone(), *kind))
            .collect()
    }
}

#[async_trait]
impl AssetApi for FakeEarthEngine {
    async fn asset_roots(&self) -> Result<Vec<AssetNode>> {
        Ok(self.state().roots.clone())
    }

    async fn list_children(&self, parent: &str) -> Result<Vec<AssetNode>> {
        let state = self.state();
        if !state.assets.contains_key(parent) {
            return Err(Error::remote_service(format!("{} does not exist", parent)));
        }
        Ok(Self::children_of(&state, parent))
    }

    async fn asset_info(&self, id: &str) -> Result<Option<AssetInfo>> {
        let state = self.state();
        Ok(state.assets.get(id).map(|kind| {
            let mut properties = serde_json::Map::new();
            if let Some(size) = state.sizes.get(id) {
                properties.insert("system:asset_size".to_string(), (*size).into());
            }
            AssetInfo {
                id: id.to_string(),
                kind: *kind,
                properties,
                version: Some(1_500_000_000_000_000),
            }
        }))
    }

    async fn create_asset(&self, id: &str, kind: AssetKind) -> Result<()> {
        let mut state = self.state();
        state.assets.insert(id.to_string(), kind);
        state.events.push(format!("create:{}", id));
        Ok(())
    }

    async fn delete_asset(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        if !Self::children_of(&state, id).is_empty() {
            return Err(Error::remote_service(format!("{} is not empty", id)));
        }
        if state.assets.remove(id).is_none() {
            return Err(Error::remote_service(format!("{} does not exist", id)));
        }
        state.events.push(format!("delete:{}", id));
        Ok(())
    }

    async fn asset_acl(&self, id: &str) -> Result<AssetAcl> {
        Ok(self.state().acls.get(id).cloned().unwrap_or_default())
    }

    async fn task_list(&self) -> Result<Vec<TaskInfo>> {
        let mut state = self.state();
        state.task_list_calls += 1;
        if state.task_list_failures > 0 {
            state.task_list_failures -= 1;
            return Err(Error::remote_service("task list unavailable"));
        }
        let running = if state.running_counts.len() > 1 {
            state.running_counts.pop_front()
        } else {
            state.running_counts.front().copied()
        };
        let mut tasks = state.tasks.clone();
        if let Some(count) = running {
            tasks.extend(
                (0..count).map(|i| TaskInfo::new(format!("RUNNING{}", i), TaskState::Running)),
            );
        }
        Ok(tasks)
    }

    async fn cancel_task(&self, task_id: &str) -> Result<()> {
        self.state().cancelled.push(task_id.to_string());
        Ok(())
    }

    async fn new_task_id(&self) -> Result<String> {
        let mut state = self.state();
        state.next_task += 1;
        Ok(format!("TASK{}", state.next_task))
    }

    async fn start_ingestion(&self, task_id: &str, request: &IngestionRequest) -> Result<()> {
        let mut state = self.state();
        if let Some(remaining) = state.ingestion_failures.get_mut(&request.id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::remote_service("ingestion backend unavailable"));
        }
        state
            .ingestions
            .push((task_id.to_string(), request.clone()));
        state.events.push(format!("ingest:{}", request.id));
        state
            .statuses
            .entry(task_id.to_string())
            .or_insert_with(|| TaskInfo::new(task_id, TaskState::Completed));
        Ok(())
    }

    async fn task_status(&self, task_ids: &[String]) -> Result<Vec<TaskInfo>> {
        let mut state = self.state();
        state.status_queries.push(task_ids.to_vec());
        if state.fail_task_status {
            return Err(Error::remote_service("task status unavailable"));
        }
        Ok(task_ids
            .iter()
            .map(|id| {
                state
                    .statuses
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| TaskInfo::new(id.clone(), TaskState::Unknown))
            })
            .collect())
    }
}

/// Storage intermediary that can be told to fail a number of times per file
#[derive(Default)]
pub(crate) struct FakeStorage {
    failures: Mutex<HashMap<String, u32>>,
    pub transfers: Mutex<Vec<(String, UploadMode)>>,
    urls_issued: AtomicUsize,
}

impl FakeStorage {
    pub fn fail_times(&self, file_name: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), times);
    }

    pub fn attempts_for(&self, file_name: &str) -> usize {
        self.transfers
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == file_name)
            .count()
    }

    pub fn urls_issued(&self) -> usize {
        self.urls_issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageGateway for FakeStorage {
    async fn upload_url(&self) -> Result<String> {
        let n = self.urls_issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://upload.example/{}", n))
    }

    async fn transfer(&self, _upload_url: &str, file: &Path, mode: UploadMode) -> Result<String> {
        let name = file
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        self.transfers.lock().unwrap().push((name.clone(), mode));

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::transfer(file, "connection reset by peer"));
        }
        Ok(format!("gs://fake-bucket/{}", name))
    }
}

/// Accepts a single password and hands out a shared fake storage session
pub(crate) struct FakeAuthenticator {
    pub password: String,
    pub storage: Arc<FakeStorage>,
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(
        &self,
        _username: &str,
        password: &str,
    ) -> Result<Arc<dyn StorageGateway>> {
        if password != self.password {
            return Err(Error::authentication("login form was served again"));
        }
        let storage: Arc<dyn StorageGateway> = self.storage.clone();
        Ok(storage)
    }
}
