//! Persistent disk cache for JSON schemas.
//!
//! The registry owns a cache root on the local filesystem. Every artifact is
//! addressed by a relative forward-slash cache path, which is the single
//! source of truth for both the on-disk location and the `file://` URI the
//! language server is handed. Remote schemas are downloaded once and served
//! from disk afterwards; generated artifacts (composite schemas, CRD
//! wrappers) are written through the same root.

mod download;
mod error;

pub use error::{RegistryError, Result};

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Directory name used under the OS user cache and config directories.
pub const APP_DIR_NAME: &str = "yaml-schema-router";

const COMPOSITE_DIR: &str = "composite";

#[derive(Serialize)]
struct SchemaRef {
    #[serde(rename = "$ref")]
    reference: String,
}

#[derive(Serialize)]
struct CompositeSchema {
    #[serde(rename = "anyOf")]
    any_of: Vec<SchemaRef>,
}

/// Disk cache for remote and generated JSON schemas.
pub struct Registry {
    base_dir: PathBuf,
    client: reqwest::Client,
}

impl Registry {
    /// Creates the registry rooted at `base_dir`, creating the directory if
    /// needed. The directory survives across runs; entries are never evicted.
    pub fn new(base_dir: PathBuf, download_timeout: Duration) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|source| RegistryError::CacheInit {
            path: base_dir.clone(),
            source,
        })?;

        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()?;

        Ok(Self { base_dir, client })
    }

    /// Opens the registry under the OS user cache directory
    /// (`<cache>/yaml-schema-router/schemas`).
    pub fn open_user_cache(download_timeout: Duration) -> Result<Self> {
        let user_cache = dirs::cache_dir().ok_or(RegistryError::NoUserCacheDir)?;
        Self::new(
            user_cache.join(APP_DIR_NAME).join("schemas"),
            download_timeout,
        )
    }

    /// Absolute path for a cache path. Pure; does not touch the filesystem.
    pub fn local_path(&self, cache_path: &str) -> PathBuf {
        self.base_dir.join(cache_path)
    }

    /// `file://` URI for a cache path, without downloading anything.
    pub fn local_file_uri(&self, cache_path: &str) -> String {
        format!("file://{}", self.local_path(cache_path).display())
    }

    /// Returns the `file://` URI for `cache_path`, downloading `remote_url`
    /// first if the artifact is not cached yet. Download and persistence
    /// failures propagate; there is no silent fallback.
    pub async fn get_schema_uri(&self, remote_url: &str, cache_path: &str) -> Result<String> {
        if self.local_path(cache_path).exists() {
            log::debug!("[registry] cache hit: {cache_path}");
            return Ok(self.local_file_uri(cache_path));
        }

        log::info!("[registry] cache miss: {cache_path}, downloading {remote_url}");

        let data = download::download(&self.client, remote_url).await?;
        self.save_local_schema(cache_path, &data)?;

        Ok(self.local_file_uri(cache_path))
    }

    /// Writes raw bytes to the cache, creating parent directories. Used for
    /// generated wrappers; overwrites are permitted.
    pub fn save_local_schema(&self, cache_path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.local_path(cache_path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|source| RegistryError::Persist {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(&full_path, data).map_err(|source| RegistryError::Persist {
            path: full_path,
            source,
        })
    }

    /// Aggregates several schema URIs into one stable `anyOf` document and
    /// returns its `file://` URI.
    ///
    /// Zero URIs yield the empty string; a single URI is returned unchanged
    /// (the server handles a direct `$ref` fine). The artifact name is
    /// content-addressed over the sorted, deduplicated URI list, so identical
    /// sets collapse to one file no matter the input order.
    pub fn generate_composite_schema(&self, schema_uris: &[String]) -> Result<String> {
        if schema_uris.is_empty() {
            return Ok(String::new());
        }
        if schema_uris.len() == 1 {
            return Ok(schema_uris[0].clone());
        }

        let unique: BTreeSet<&str> = schema_uris.iter().map(String::as_str).collect();

        let mut hasher = Sha256::new();
        for uri in &unique {
            hasher.update(uri.as_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());

        let cache_path = format!("{COMPOSITE_DIR}/composite_{}.json", &digest[..16]);

        if self.local_path(&cache_path).exists() {
            return Ok(self.local_file_uri(&cache_path));
        }

        let composite = CompositeSchema {
            any_of: unique
                .iter()
                .map(|uri| SchemaRef {
                    reference: (*uri).to_string(),
                })
                .collect(),
        };

        let data = serde_json::to_vec_pretty(&composite)?;
        self.save_local_schema(&cache_path, &data)?;

        Ok(self.local_file_uri(&cache_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_registry() -> (TempDir, Registry) {
        let dir = TempDir::new().expect("create temp dir");
        let registry = Registry::new(dir.path().join("schemas"), Duration::from_secs(2))
            .expect("create registry");
        (dir, registry)
    }

    fn uris(list: &[&str]) -> Vec<String> {
        list.iter().map(|uri| (*uri).to_string()).collect()
    }

    #[test]
    fn local_file_uri_is_derived_from_cache_path() {
        let (_dir, registry) = test_registry();
        let uri = registry.local_file_uri("kubernetes-builtin/v1/pod-v1.json");
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("/schemas/kubernetes-builtin/v1/pod-v1.json"));
    }

    #[test]
    fn save_creates_parent_directories() {
        let (_dir, registry) = test_registry();
        registry
            .save_local_schema("a/b/c.json", b"{}")
            .expect("save");
        assert_eq!(
            fs::read(registry.local_path("a/b/c.json")).expect("read back"),
            b"{}"
        );
    }

    #[tokio::test]
    async fn cached_schema_is_served_without_network() {
        let (_dir, registry) = test_registry();
        registry
            .save_local_schema("kubernetes-builtin/v1/pod-v1.json", b"{\"type\":\"object\"}")
            .expect("seed cache");

        // The URL points nowhere; a cache hit must not touch it.
        let uri = registry
            .get_schema_uri(
                "http://127.0.0.1:1/pod-v1.json",
                "kubernetes-builtin/v1/pod-v1.json",
            )
            .await
            .expect("cache hit");
        assert_eq!(uri, registry.local_file_uri("kubernetes-builtin/v1/pod-v1.json"));

        // And a second call returns the identical URI.
        let again = registry
            .get_schema_uri(
                "http://127.0.0.1:1/pod-v1.json",
                "kubernetes-builtin/v1/pod-v1.json",
            )
            .await
            .expect("second cache hit");
        assert_eq!(uri, again);
    }

    #[tokio::test]
    async fn missing_schema_propagates_download_failure() {
        let (_dir, registry) = test_registry();
        let err = registry
            .get_schema_uri("http://127.0.0.1:1/missing.json", "missing.json")
            .await
            .expect_err("download must fail");
        assert!(matches!(err, RegistryError::Download { .. }));
        assert!(!registry.local_path("missing.json").exists());
    }

    #[test]
    fn composite_of_nothing_is_empty() {
        let (_dir, registry) = test_registry();
        assert_eq!(
            registry.generate_composite_schema(&[]).expect("empty"),
            ""
        );
    }

    #[test]
    fn composite_of_one_bypasses_wrapping() {
        let (_dir, registry) = test_registry();
        let input = uris(&["file:///schemas/pod-v1.json"]);
        let uri = registry.generate_composite_schema(&input).expect("single");
        assert_eq!(uri, "file:///schemas/pod-v1.json");
        assert!(!registry.local_path(COMPOSITE_DIR).exists());
    }

    #[test]
    fn composite_is_order_and_duplicate_insensitive() {
        let (_dir, registry) = test_registry();
        let forward = uris(&["file:///a.json", "file:///b.json", "file:///c.json"]);
        let shuffled = uris(&[
            "file:///c.json",
            "file:///a.json",
            "file:///b.json",
            "file:///a.json",
        ]);

        let first = registry.generate_composite_schema(&forward).expect("first");
        let second = registry
            .generate_composite_schema(&shuffled)
            .expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn composite_artifact_has_sorted_any_of_shape() {
        let (_dir, registry) = test_registry();
        let input = uris(&["file:///b.json", "file:///a.json"]);
        let uri = registry.generate_composite_schema(&input).expect("composite");

        let path = uri.strip_prefix("file://").expect("file uri");
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .expect("file name");
        assert!(file_name.starts_with("composite_"));
        assert_eq!(file_name.len(), "composite_".len() + 16 + ".json".len());

        let parsed: serde_json::Value =
            serde_json::from_slice(&fs::read(path).expect("read composite")).expect("parse");
        assert_eq!(
            parsed,
            serde_json::json!({
                "anyOf": [
                    { "$ref": "file:///a.json" },
                    { "$ref": "file:///b.json" },
                ]
            })
        );
    }

    #[test]
    fn existing_composite_is_not_rewritten() {
        let (_dir, registry) = test_registry();
        let input = uris(&["file:///a.json", "file:///b.json"]);
        let uri = registry.generate_composite_schema(&input).expect("composite");

        let path = uri.strip_prefix("file://").expect("file uri").to_string();
        fs::write(&path, b"sentinel").expect("clobber artifact");

        let again = registry.generate_composite_schema(&input).expect("reuse");
        assert_eq!(uri, again);
        assert_eq!(fs::read(&path).expect("read back"), b"sentinel");
    }
}
