//! Line-based extraction of Kubernetes type metadata.
//!
//! Deliberately not a YAML parser: documents arrive mid-edit and are
//! routinely unparseable, but the top-level `apiVersion:`/`kind:` lines are
//! still there to be read.

/// The `(apiVersion, kind)` pair identifying a Kubernetes object's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

impl TypeMeta {
    /// The API group; empty for the core group (`apiVersion: v1`).
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// The API version without the group prefix.
    pub fn version(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((_, version)) => version,
            None => &self.api_version,
        }
    }
}

/// True for groups that belong to a custom resource rather than a Kubernetes
/// built-in. Official groups are either dot-free (`apps`, `batch`) or end in
/// `k8s.io` (`rbac.authorization.k8s.io`).
pub(crate) fn is_custom_group(group: &str) -> bool {
    group.contains('.') && !group.ends_with("k8s.io")
}

/// Scans raw YAML for top-level `apiVersion:`/`kind:` pairs, one per
/// `---`-separated document. Indented keys are ignored; a segment missing
/// either field yields nothing.
pub fn extract_all_type_meta(content: &str) -> Vec<TypeMeta> {
    let mut metas = Vec::new();

    for segment in content.split("---") {
        let mut api_version = String::new();
        let mut kind = String::new();

        for line in segment.lines() {
            if let Some(rest) = line.strip_prefix("apiVersion:") {
                api_version = trim_scalar(rest);
            } else if let Some(rest) = line.strip_prefix("kind:") {
                kind = trim_scalar(rest);
            }

            if !api_version.is_empty() && !kind.is_empty() {
                break;
            }
        }

        if !api_version.is_empty() && !kind.is_empty() {
            metas.push(TypeMeta { api_version, kind });
        }
    }

    metas
}

fn trim_scalar(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}
