//! Submission throttling against the remote running-task ceiling
//!
//! Every `period` processed files the controller sweeps the statuses of the
//! tasks submitted so far, writing terminal failures to the report, and then
//! blocks while more than `max_running_tasks` remote tasks are running.

use crate::error::Result;
use crate::models::{FailureRecord, ThrottleSettings};
use crate::remote::AssetApi;
use crate::report::FailureReport;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Submitted task ids mapped to the local file name they ingest
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, String>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task_id: impl Into<String>, filename: impl Into<String>) {
        self.tasks.insert(task_id.into(), filename.into());
    }

    pub fn remove(&mut self, task_id: &str) -> Option<String> {
        self.tasks.remove(task_id)
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    pub fn filename(&self, task_id: &str) -> Option<&str> {
        self.tasks.get(task_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub struct ThrottleController<'a> {
    api: &'a dyn AssetApi,
    settings: ThrottleSettings,
}

impl<'a> ThrottleController<'a> {
    pub fn new(api: &'a dyn AssetApi, settings: ThrottleSettings) -> Self {
        Self { api, settings }
    }

    /// True when the file at `index` (0-based) closes a period
    pub fn is_checkpoint(&self, index: usize) -> bool {
        let period = self.settings.period.max(1);
        (index + 1) % period == 0
    }

    /// Sweeps failures and waits for capacity at each period boundary
    ///
    /// Returns the number of failures recorded by the sweep. The capacity
    /// check runs even when the status poll fails; only report write
    /// errors are returned.
    pub async fn maybe_throttle(
        &self,
        index: usize,
        registry: &mut TaskRegistry,
        report: &mut FailureReport,
    ) -> Result<usize> {
        if !self.is_checkpoint(index) {
            return Ok(0);
        }
        let failures = self.sweep_failures(registry, report).await?;
        self.wait_for_capacity().await;
        Ok(failures)
    }

    /// Polls registered tasks; failed ones are reported, finished ones dropped
    ///
    /// A failed status poll is logged and leaves the registry untouched.
    pub async fn sweep_failures(
        &self,
        registry: &mut TaskRegistry,
        report: &mut FailureReport,
    ) -> Result<usize> {
        if registry.is_empty() {
            return Ok(0);
        }
        let statuses = match self.api.task_status(&registry.task_ids()).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!("Task status check failed, will retry next period: {}", e);
                return Ok(0);
            }
        };
        let mut failures = 0;

        for status in statuses {
            if !status.state.is_terminal() {
                continue;
            }
            let Some(filename) = registry.filename(&status.id).map(str::to_string) else {
                continue;
            };
            if status.state.is_failure() {
                let message = status
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("task ended in state {:?}", status.state));
                warn!("Ingestion of {} failed ({}): {}", filename, status.id, message);
                report.record(&FailureRecord::new(filename, Some(&status.id), message))?;
                failures += 1;
            } else {
                debug!("Ingestion of {} finished ({})", filename, status.id);
            }
            // Dropped only once its row is on disk
            registry.remove(&status.id);
        }
        Ok(failures)
    }

    /// Number of remote tasks currently in the RUNNING state
    pub async fn running_tasks(&self) -> Result<usize> {
        let tasks = self.api.task_list().await?;
        Ok(tasks.iter().filter(|task| task.state.is_running()).count())
    }

    /// Sleeps until the running count drops to the ceiling
    ///
    /// An unreadable task list counts as over the ceiling. Returns how many
    /// wait intervals were slept.
    pub async fn wait_for_capacity(&self) -> u32 {
        let mut intervals = 0;
        loop {
            match self.running_tasks().await {
                Ok(running) if running <= self.settings.max_running_tasks => return intervals,
                Ok(running) => info!(
                    "{} tasks running (limit {}), waiting {}s",
                    running, self.settings.max_running_tasks, self.settings.wait_secs
                ),
                Err(e) => warn!(
                    "Could not read the task list, waiting {}s: {}",
                    self.settings.wait_secs, e
                ),
            }
            tokio::time::sleep(self.settings.wait()).await;
            intervals += 1;
        }
    }
}
