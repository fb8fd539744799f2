//! Remote task housekeeping

use crate::error::Result;
use crate::remote::AssetApi;
use tracing::{info, warn};

/// Cancels every task currently in the RUNNING state
///
/// Returns how many cancellations were accepted. A task that refuses to be
/// cancelled is logged and skipped.
pub async fn cancel_running_tasks(api: &dyn AssetApi) -> Result<usize> {
    let running: Vec<_> = api
        .task_list()
        .await?
        .into_iter()
        .filter(|task| task.state.is_running())
        .collect();
    info!("{} running tasks to cancel", running.len());

    let mut cancelled = 0;
    for task in running {
        match api.cancel_task(&task.id).await {
            Ok(()) => {
                info!("Cancelled task {}", task.id);
                cancelled += 1;
            }
            Err(e) => warn!("Could not cancel task {}: {}", task.id, e),
        }
    }
    Ok(cancelled)
}
