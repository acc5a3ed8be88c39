//! Remote registry endpoints. These are configuration inputs rather than
//! compiled-in constants so tests (and future flags) can redirect them.

/// File name of the shared Kubernetes `ObjectMeta` schema used as a CRD
/// wrapping dependency.
pub const OBJECT_META_FILE_NAME: &str = "objectmeta-meta-v1.json";

/// Where built-in Kubernetes schemas are fetched from.
#[derive(Debug, Clone)]
pub struct K8sSchemaConfig {
    pub registry_url: String,
    /// Kubernetes release tag, e.g. `v1.33.0`.
    pub version: String,
    /// Registry flavour suffix, e.g. `-standalone-strict`.
    pub flavour: String,
}

impl K8sSchemaConfig {
    /// Directory segment shared by the remote registry and the local cache,
    /// e.g. `v1.33.0-standalone-strict`.
    pub fn version_dir(&self) -> String {
        format!("{}{}", self.version, self.flavour)
    }
}

impl Default for K8sSchemaConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://raw.githubusercontent.com/yannh/kubernetes-json-schema/master"
                .to_string(),
            version: "v1.33.0".to_string(),
            flavour: "-standalone-strict".to_string(),
        }
    }
}

/// Where CRD schemas are fetched from.
#[derive(Debug, Clone)]
pub struct CrdSchemaConfig {
    pub registry_url: String,
}

impl Default for CrdSchemaConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://raw.githubusercontent.com/datreeio/CRDs-catalog/main"
                .to_string(),
        }
    }
}
