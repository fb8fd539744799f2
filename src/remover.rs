//! Recursive removal of a remote asset tree

use crate::error::{Error, Result};
use crate::models::{AssetKind, AssetNode};
use crate::output::{AssetFormatter, FORMATTER};
use crate::paths::{self, AssetPathResolver};
use crate::remote::AssetApi;
use globset::GlobBuilder;
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

type DeleteFuture<'s> = Pin<Box<dyn Future<Output = Result<usize>> + Send + 's>>;

/// Deletes images, folders and collections, children before parents
///
/// The node kind comes from a single info fetch for the root and from the
/// children listing below it, so no node is looked up twice.
pub struct AssetRemover<'a> {
    api: &'a dyn AssetApi,
    verbose: bool,
}

impl<'a> AssetRemover<'a> {
    pub fn new(api: &'a dyn AssetApi) -> Self {
        Self {
            api,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Deletes `path` and everything below it, returning the number of
    /// assets removed
    ///
    /// With `implicit_root` a path that names no root namespace is placed
    /// under the caller's home root.
    ///
    /// A last segment containing `*`, `?` or `[` is a pattern: every child
    /// of the parent whose id matches it is deleted.
    ///
    /// # Errors
    ///
    /// `AssetNotFound` when the resolved path does not exist or the pattern
    /// matches nothing.
    pub async fn delete(&self, path: &str, implicit_root: bool) -> Result<usize> {
        let target = if implicit_root {
            AssetPathResolver::new(self.api)
                .with_implicit_root(path)
                .await?
        } else {
            paths::normalize(path).to_string()
        };

        if is_pattern(&target) {
            return self.delete_matching(&target).await;
        }

        let info = self
            .api
            .asset_info(&target)
            .await?
            .ok_or_else(|| Error::asset_not_found(&target))?;
        let removed = self.delete_node(info.node()).await?;
        info!("Removed {} assets under {}", removed, target);
        Ok(removed)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let Some((parent, _)) = pattern.rsplit_once('/') else {
            return Err(Error::asset_not_found(pattern));
        };
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| Error::invalid_argument(format!("bad pattern {}: {}", pattern, e)))?
            .compile_matcher();

        let matches: Vec<AssetNode> = self
            .api
            .list_children(parent)
            .await?
            .into_iter()
            .filter(|child| matcher.is_match(&child.id))
            .collect();
        if matches.is_empty() {
            warn!("Nothing to remove for {}", pattern);
            return Err(Error::asset_not_found(pattern));
        }

        let mut removed = 0;
        for node in matches {
            let id = node.id.clone();
            removed += self.delete_node(node).await?;
            info!("Removed {}", id);
        }
        Ok(removed)
    }

    fn delete_node(&self, node: AssetNode) -> DeleteFuture<'_> {
        Box::pin(async move {
            match node.kind {
                AssetKind::Image => {
                    self.delete_one(&node.id).await?;
                    Ok(1)
                }
                AssetKind::Folder => {
                    let children = self.api.list_children(&node.id).await?;
                    let mut removed = 0;
                    for child in children {
                        info!("Deleting {} from folder {}", child.id, node.id);
                        removed += self.delete_node(child).await?;
                    }
                    self.delete_one(&node.id).await?;
                    Ok(removed + 1)
                }
                AssetKind::Collection => {
                    // Collection members are images
                    let children = self.api.list_children(&node.id).await?;
                    let mut removed = 0;
                    for child in children {
                        self.delete_one(&child.id).await?;
                        removed += 1;
                    }
                    self.delete_one(&node.id).await?;
                    Ok(removed + 1)
                }
            }
        })
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        self.api.delete_asset(id).await?;
        if self.verbose {
            info!("Deleted {}", id);
        } else {
            println!("{}", FORMATTER.format_deleted(id));
        }
        Ok(())
    }
}

/// True when the last path segment holds a wildcard
fn is_pattern(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or(path);
    last.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeEarthEngine;

    fn remover(api: &FakeEarthEngine) -> AssetRemover<'_> {
        AssetRemover::new(api).with_verbose(true)
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let api = FakeEarthEngine::with_root("users/me");
        let result = remover(&api).delete("users/me/nope", true).await;
        assert!(matches!(result, Err(Error::AssetNotFound { .. })));
    }

    #[tokio::test]
    async fn test_deleting_twice_fails_the_second_time() {
        let api = FakeEarthEngine::with_root("users/me");
        api.add_asset("users/me/img", AssetKind::Image);

        assert_eq!(remover(&api).delete("users/me/img", true).await.unwrap(), 1);
        let again = remover(&api).delete("users/me/img", true).await;
        assert!(matches!(again, Err(Error::AssetNotFound { .. })));
    }

    #[tokio::test]
    async fn test_nested_empty_folders() {
        let api = FakeEarthEngine::with_root("users/me");
        api.add_asset("users/me/top", AssetKind::Folder);
        api.add_asset("users/me/top/a", AssetKind::Folder);
        api.add_asset("users/me/top/a/deep", AssetKind::Folder);
        api.add_asset("users/me/top/b", AssetKind::Folder);

        let removed = remover(&api).delete("top", true).await.unwrap();

        assert_eq!(removed, 4);
        assert!(!api.exists("users/me/top"));
        assert_eq!(
            api.events(),
            vec![
                "delete:users/me/top/a/deep",
                "delete:users/me/top/a",
                "delete:users/me/top/b",
                "delete:users/me/top",
            ]
        );
    }

    #[tokio::test]
    async fn test_collection_members_before_collection() {
        let api = FakeEarthEngine::with_root("users/me");
        api.add_asset("users/me/data", AssetKind::Folder);
        api.add_asset("users/me/data/col", AssetKind::Collection);
        api.add_asset("users/me/data/col/x", AssetKind::Image);
        api.add_asset("users/me/data/col/y", AssetKind::Image);
        api.add_asset("users/me/data/img", AssetKind::Image);

        let removed = remover(&api).delete("users/me/data", false).await.unwrap();

        assert_eq!(removed, 5);
        let events = api.events();
        let position = |id: &str| events.iter().position(|e| e == &format!("delete:{}", id)).unwrap();
        assert!(position("users/me/data/col/x") < position("users/me/data/col"));
        assert!(position("users/me/data/col/y") < position("users/me/data/col"));
        assert_eq!(events.last().unwrap(), "delete:users/me/data");
    }

    #[tokio::test]
    async fn test_empty_collection_is_still_deleted() {
        let api = FakeEarthEngine::with_root("users/me");
        api.add_asset("users/me/empty", AssetKind::Collection);

        assert_eq!(remover(&api).delete("empty", true).await.unwrap(), 1);
        assert!(!api.exists("users/me/empty"));
    }

    #[test]
    fn test_only_last_segment_makes_a_pattern() {
        assert!(is_pattern("users/me/scene_*"));
        assert!(is_pattern("users/me/tile_[0-9]"));
        assert!(!is_pattern("users/me*/scene"));
        assert!(!is_pattern("users/me/scene"));
    }

    #[tokio::test]
    async fn test_wildcard_deletes_matching_siblings() {
        let api = FakeEarthEngine::with_root("users/me");
        api.add_asset("users/me/scene_1", AssetKind::Image);
        api.add_asset("users/me/scene_2", AssetKind::Collection);
        api.add_asset("users/me/scene_2/x", AssetKind::Image);
        api.add_asset("users/me/keep", AssetKind::Image);

        let removed = remover(&api).delete("scene_*", true).await.unwrap();

        assert_eq!(removed, 3);
        assert!(!api.exists("users/me/scene_1"));
        assert!(!api.exists("users/me/scene_2"));
        assert!(api.exists("users/me/keep"));
        // The pattern itself is never looked up as an asset
        assert!(!api.events().iter().any(|e| e.contains('*')));
    }

    #[tokio::test]
    async fn test_wildcard_matching_nothing_is_not_found() {
        let api = FakeEarthEngine::with_root("users/me");
        api.add_asset("users/me/keep", AssetKind::Image);

        let result = remover(&api).delete("users/me/scene_?", true).await;

        assert!(matches!(result, Err(Error::AssetNotFound { .. })));
        assert!(api.exists("users/me/keep"));
    }
}
