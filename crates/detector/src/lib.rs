//! Schema detection for YAML documents.
//!
//! A [`Detector`] maps raw document content to the local schema URIs that
//! apply to it; the [`Chain`] runs every registered detector and concatenates
//! their answers. Detection is content-driven only: no file naming
//! conventions, no user annotations.

mod builtin;
mod chain;
mod config;
mod crd;
mod error;
mod typemeta;

pub use builtin::{K8sDetector, K8S_DETECTOR_NAME};
pub use chain::Chain;
pub use config::{CrdSchemaConfig, K8sSchemaConfig, OBJECT_META_FILE_NAME};
pub use crd::{CrdDetector, CRD_DETECTOR_NAME};
pub use error::{DetectorError, Result};
pub use typemeta::{extract_all_type_meta, TypeMeta};

use async_trait::async_trait;

/// The contract every schema detector implements.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Unique identifier, used in logs and cache paths.
    fn name(&self) -> &'static str;

    /// Inspects `content` and returns the local schema URIs that apply. An
    /// empty list means the detector does not claim the document.
    async fn detect(&self, uri: &str, content: &str) -> Result<Vec<String>>;
}
