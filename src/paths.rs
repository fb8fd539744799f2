//! Remote asset path resolution
//!
//! Remote paths are slash-delimited ids such as `users/pinkiepie/rainbow`.
//! Names not anchored at a root namespace are resolved against the caller's
//! home root, fetched from the platform on demand.

use crate::error::{Error, Result};
use crate::remote::AssetApi;
use std::path::Path;

/// Leading segments that make an asset path absolute
pub const ROOT_NAMESPACES: &[&str] = &["users", "projects"];

/// Returns true when the path starts with a root namespace (`users/...`,
/// `/users/...`, `projects/...`)
pub fn is_root_anchored(path: &str) -> bool {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .is_some_and(|first| ROOT_NAMESPACES.contains(&first))
}

/// Returns true when any segment of the path is a root namespace
pub fn has_root_segment(path: &str) -> bool {
    path.split('/').any(|segment| ROOT_NAMESPACES.contains(&segment))
}

/// Strips leading and trailing slashes
pub fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Joins a parent asset id and a child name with a single slash
pub fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Asset name for a local file: the file name without its extension
pub fn asset_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// Pure resolution rule for an upload destination
///
/// An explicit destination is returned verbatim. A collection name anchored
/// at a root namespace is taken as absolute; anything else is placed under
/// `default_root`. Passing both or neither is an argument error.
pub fn resolve_destination(
    explicit_destination: Option<&str>,
    collection_name: Option<&str>,
    default_root: &str,
) -> Result<String> {
    match (explicit_destination, collection_name) {
        (Some(_), Some(_)) => Err(Error::invalid_argument(
            "destination path and collection name are mutually exclusive",
        )),
        (Some(destination), None) => Ok(destination.to_string()),
        (None, Some(collection)) if is_root_anchored(collection) => {
            Ok(normalize(collection).to_string())
        }
        (None, Some(collection)) => Ok(join(default_root, normalize(collection))),
        (None, None) => Err(Error::invalid_argument(
            "either a destination path or a collection name is required",
        )),
    }
}

/// Resolves user-supplied asset names to absolute remote paths
pub struct AssetPathResolver<'a> {
    api: &'a dyn AssetApi,
}

impl<'a> AssetPathResolver<'a> {
    pub fn new(api: &'a dyn AssetApi) -> Self {
        Self { api }
    }

    /// The caller's home root, i.e. the first entry of the roots listing
    pub async fn default_root(&self) -> Result<String> {
        self.api
            .asset_roots()
            .await?
            .into_iter()
            .next()
            .map(|root| root.id)
            .ok_or_else(|| Error::remote_service("no asset roots available for this account"))
    }

    /// Absolute destination for an upload
    ///
    /// The roots listing is only queried when the name is relative.
    pub async fn resolve(
        &self,
        explicit_destination: Option<&str>,
        collection_name: Option<&str>,
    ) -> Result<String> {
        let needs_root = explicit_destination.is_none()
            && collection_name.is_some_and(|name| !is_root_anchored(name));
        let root = if needs_root {
            self.default_root().await?
        } else {
            String::new()
        };
        resolve_destination(explicit_destination, collection_name, &root)
    }

    /// Prefixes the home root unless the path already names a root namespace
    pub async fn with_implicit_root(&self, path: &str) -> Result<String> {
        if has_root_segment(path) {
            return Ok(normalize(path).to_string());
        }
        Ok(join(&self.default_root().await?, normalize(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeEarthEngine;
    use std::path::PathBuf;

    #[test]
    fn test_explicit_destination_is_verbatim() {
        let resolved = resolve_destination(Some("users/shared/team/col"), None, "users/me").unwrap();
        assert_eq!(resolved, "users/shared/team/col");

        let resolved = resolve_destination(Some("/odd//path/"), None, "users/me").unwrap();
        assert_eq!(resolved, "/odd//path/");
    }

    #[test]
    fn test_both_inputs_rejected() {
        let result = resolve_destination(Some("users/me/a"), Some("b"), "users/me");
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));

        let result = resolve_destination(None, None, "users/me");
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_collection_name_resolution() {
        assert_eq!(
            resolve_destination(None, Some("users/other/col"), "users/me").unwrap(),
            "users/other/col"
        );
        assert_eq!(
            resolve_destination(None, Some("/users/other/col"), "users/me").unwrap(),
            "users/other/col"
        );
        assert_eq!(
            resolve_destination(None, Some("species/snails"), "users/me").unwrap(),
            "users/me/species/snails"
        );
        // "usersdata" is not the users namespace
        assert_eq!(
            resolve_destination(None, Some("usersdata"), "users/me").unwrap(),
            "users/me/usersdata"
        );
    }

    #[test]
    fn test_root_segment_detection() {
        assert!(is_root_anchored("users/me"));
        assert!(is_root_anchored("/projects/p/assets"));
        assert!(!is_root_anchored("my/users"));
        assert!(has_root_segment("my/users/x"));
        assert!(!has_root_segment("testfolder"));
    }

    #[test]
    fn test_asset_name_from_path() {
        assert_eq!(
            asset_name_from_path(&PathBuf::from("/data/my_file_1.tif")),
            Some("my_file_1".to_string())
        );
        assert_eq!(
            asset_name_from_path(&PathBuf::from("scene.v2.tif")),
            Some("scene.v2".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolver_uses_home_root_for_relative_names() {
        let api = FakeEarthEngine::with_root("users/pinkiepie");
        let resolver = AssetPathResolver::new(&api);

        assert_eq!(
            resolver.resolve(None, Some("rainbow")).await.unwrap(),
            "users/pinkiepie/rainbow"
        );
        assert_eq!(
            resolver.with_implicit_root("testfolder").await.unwrap(),
            "users/pinkiepie/testfolder"
        );
        assert_eq!(
            resolver.with_implicit_root("users/other/x").await.unwrap(),
            "users/other/x"
        );
    }

    #[tokio::test]
    async fn test_resolver_skips_roots_lookup_when_absolute() {
        let api = FakeEarthEngine::default();
        let resolver = AssetPathResolver::new(&api);

        // No roots configured: a lookup would fail
        assert_eq!(
            resolver.resolve(Some("users/me/col"), None).await.unwrap(),
            "users/me/col"
        );
        assert!(resolver.resolve(None, Some("col")).await.is_err());
    }
}
