//! Detector for Custom Resource Definitions.
//!
//! CRD schemas in the catalog typically omit a full `metadata` specification,
//! so the detector wraps each base schema together with the standard
//! Kubernetes `ObjectMeta` contract and hands out the wrapper's URI.

use crate::config::{CrdSchemaConfig, K8sSchemaConfig, OBJECT_META_FILE_NAME};
use crate::typemeta::{extract_all_type_meta, is_custom_group};
use crate::{Detector, Result};
use crate::builtin::K8S_DETECTOR_NAME;
use async_trait::async_trait;
use router_registry::Registry;
use std::sync::Arc;

/// Detector name; doubles as the first segment of CRD cache paths.
pub const CRD_DETECTOR_NAME: &str = "kubernetes-crd";

/// Maps custom resources to generated `allOf` wrapper schemas.
pub struct CrdDetector {
    registry: Arc<Registry>,
    crd_config: CrdSchemaConfig,
    k8s_config: K8sSchemaConfig,
}

impl CrdDetector {
    pub fn new(
        registry: Arc<Registry>,
        crd_config: CrdSchemaConfig,
        k8s_config: K8sSchemaConfig,
    ) -> Self {
        Self {
            registry,
            crd_config,
            k8s_config,
        }
    }

    /// Materializes the wrapper's two dependencies: the base CRD schema and
    /// the shared `ObjectMeta` schema. Returns their local file URIs.
    async fn fetch_dependencies(&self, group: &str, file_name: &str) -> Result<(String, String)> {
        let base_url = format!("{}/{group}/{file_name}", self.crd_config.registry_url);
        let base_cache_path = format!("{CRD_DETECTOR_NAME}/{group}/{file_name}");
        let base_crd_uri = self
            .registry
            .get_schema_uri(&base_url, &base_cache_path)
            .await?;

        let version_dir = self.k8s_config.version_dir();
        let meta_url = format!(
            "{}/{version_dir}/{OBJECT_META_FILE_NAME}",
            self.k8s_config.registry_url
        );
        let meta_cache_path = format!("{K8S_DETECTOR_NAME}/{version_dir}/{OBJECT_META_FILE_NAME}");
        let object_meta_uri = self
            .registry
            .get_schema_uri(&meta_url, &meta_cache_path)
            .await?;

        Ok((base_crd_uri, object_meta_uri))
    }

    /// Writes the wrapper document and returns its file URI.
    fn write_wrapper(
        &self,
        base_crd_uri: &str,
        object_meta_uri: &str,
        wrapper_cache_path: &str,
    ) -> Result<String> {
        log::info!(
            "[{CRD_DETECTOR_NAME}] generating schema wrapper: {base_crd_uri} + {object_meta_uri} -> {wrapper_cache_path}"
        );

        let wrapper = serde_json::json!({
            "allOf": [
                { "$ref": base_crd_uri },
                { "properties": { "metadata": { "$ref": object_meta_uri } } },
            ]
        });

        let data = serde_json::to_vec_pretty(&wrapper)?;
        self.registry.save_local_schema(wrapper_cache_path, &data)?;

        Ok(self.registry.local_file_uri(wrapper_cache_path))
    }
}

#[async_trait]
impl Detector for CrdDetector {
    fn name(&self) -> &'static str {
        CRD_DETECTOR_NAME
    }

    async fn detect(&self, _uri: &str, content: &str) -> Result<Vec<String>> {
        let metas = extract_all_type_meta(content);
        let mut schema_uris = Vec::new();

        for meta in &metas {
            let Some((group, version)) = meta.api_version.split_once('/') else {
                continue; // core group, not a CRD
            };
            if !is_custom_group(group) {
                continue; // built-in, the kubernetes detector owns it
            }

            log::info!(
                "[{}] detected custom resource: {group}/{}",
                self.name(),
                meta.kind
            );

            let kind = meta.kind.to_lowercase();
            let file_name = format!("{kind}_{version}.json");
            let wrapper_cache_path =
                format!("{}/{group}/{kind}_{version}_wrapper.json", self.name());

            // Fast path: the wrapper is immutable once written.
            if self.registry.local_path(&wrapper_cache_path).exists() {
                log::debug!("[{}] wrapper cache hit for {wrapper_cache_path}", self.name());
                schema_uris.push(self.registry.local_file_uri(&wrapper_cache_path));
                continue;
            }

            let (base_crd_uri, object_meta_uri) =
                match self.fetch_dependencies(group, &file_name).await {
                    Ok(uris) => uris,
                    Err(err) => {
                        log::warn!(
                            "[{}] failed to fetch dependencies for {}: {err}",
                            self.name(),
                            meta.kind
                        );
                        continue;
                    }
                };

            match self.write_wrapper(&base_crd_uri, &object_meta_uri, &wrapper_cache_path) {
                Ok(uri) => schema_uris.push(uri),
                Err(err) => {
                    log::warn!(
                        "[{}] failed to generate wrapper for {}: {err}",
                        self.name(),
                        meta.kind
                    );
                }
            }
        }

        Ok(schema_uris)
    }
}
