//! Remote collection contents versus local candidates

use crate::error::Result;
use crate::remote::AssetApi;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Names present locally but not remotely
pub fn set_difference(local: &BTreeSet<String>, remote: &BTreeSet<String>) -> BTreeSet<String> {
    local.difference(remote).cloned().collect()
}

pub struct RemoteInventory<'a> {
    api: &'a dyn AssetApi,
}

impl<'a> RemoteInventory<'a> {
    pub fn new(api: &'a dyn AssetApi) -> Self {
        Self { api }
    }

    /// Last path segment of every child of `collection`
    ///
    /// Returns `None` when the collection does not exist.
    pub async fn remote_names(&self, collection: &str) -> Result<Option<BTreeSet<String>>> {
        if self.api.asset_info(collection).await?.is_none() {
            return Ok(None);
        }
        let children = self.api.list_children(collection).await?;
        Ok(Some(
            children.iter().map(|child| child.name().to_string()).collect(),
        ))
    }

    /// Local names that still need uploading into `collection`
    pub async fn diff(&self, local: &BTreeSet<String>, collection: &str) -> Result<BTreeSet<String>> {
        match self.remote_names(collection).await? {
            None => {
                debug!("{} does not exist yet, all {} assets pending", collection, local.len());
                Ok(local.clone())
            }
            Some(remote) if remote.is_empty() => Ok(local.clone()),
            Some(remote) => {
                let pending = set_difference(local, &remote);
                info!(
                    "{} already holds {} assets, {} of {} local assets left to upload",
                    collection,
                    remote.len(),
                    pending.len(),
                    local.len()
                );
                Ok(pending)
            }
        }
    }
}
