//! Detector for standard Kubernetes manifests.

use crate::config::K8sSchemaConfig;
use crate::typemeta::{extract_all_type_meta, is_custom_group, TypeMeta};
use crate::{Detector, Result};
use async_trait::async_trait;
use router_registry::Registry;
use std::sync::Arc;

/// Detector name; doubles as the first segment of built-in cache paths.
pub const K8S_DETECTOR_NAME: &str = "kubernetes-builtin";

/// Maps built-in Kubernetes resources to their registry schemas.
pub struct K8sDetector {
    registry: Arc<Registry>,
    config: K8sSchemaConfig,
}

impl K8sDetector {
    pub fn new(registry: Arc<Registry>, config: K8sSchemaConfig) -> Self {
        Self { registry, config }
    }
}

/// `rbac.authorization.k8s.io` → `rbac`; dot-free groups pass through.
fn normalize_group(group: &str) -> &str {
    match group.strip_suffix(".k8s.io") {
        Some(stripped) => stripped.split('.').next().unwrap_or(stripped),
        None => group,
    }
}

/// Registry file name for a built-in resource, e.g. `deployment-apps-v1.json`
/// or `pod-v1.json` for the core group.
fn schema_file_name(meta: &TypeMeta) -> String {
    let kind = meta.kind.to_lowercase();
    let group = normalize_group(meta.group());
    let version = meta.version();

    if group.is_empty() {
        format!("{kind}-{version}.json")
    } else {
        format!("{kind}-{group}-{version}.json")
    }
}

#[async_trait]
impl Detector for K8sDetector {
    fn name(&self) -> &'static str {
        K8S_DETECTOR_NAME
    }

    async fn detect(&self, _uri: &str, content: &str) -> Result<Vec<String>> {
        let metas = extract_all_type_meta(content);
        let version_dir = self.config.version_dir();
        let mut schema_uris = Vec::new();

        for meta in &metas {
            // CustomResourceDefinition manifests describe types, not objects.
            if meta.kind == "CustomResourceDefinition" {
                log::debug!("[{}] ignoring CustomResourceDefinition", self.name());
                continue;
            }

            let group = meta.group();
            if is_custom_group(group) {
                log::debug!("[{}] ignoring custom resource (group: {group})", self.name());
                continue;
            }

            let file_name = schema_file_name(meta);
            let remote_url = format!("{}/{version_dir}/{file_name}", self.config.registry_url);
            let cache_path = format!("{}/{version_dir}/{file_name}", self.name());

            log::info!(
                "[{}] {}/{} mapped to {file_name}",
                self.name(),
                meta.api_version,
                meta.kind
            );

            match self.registry.get_schema_uri(&remote_url, &cache_path).await {
                Ok(uri) => schema_uris.push(uri),
                Err(err) => {
                    log::warn!(
                        "[{}] failed to fetch schema for {}/{}: {err}",
                        self.name(),
                        meta.api_version,
                        meta.kind
                    );
                }
            }
        }

        Ok(schema_uris)
    }
}
