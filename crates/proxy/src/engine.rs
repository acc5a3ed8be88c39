//! Interception engine: the protocol touch points and the schema state.
//!
//! The engine owns the document → schema mapping and rewrites exactly three
//! message classes: the editor's `workspace/configuration` response, the
//! server's `initialize` response, and (indirectly, via the nudge) the
//! server's view of its configuration. Everything else passes through
//! untouched; any uncertainty while rewriting degrades to a byte-for-byte
//! passthrough.

use router_detector::Chain;
use router_registry::Registry;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Marker comment that hands schema control back to the user.
const INLINE_SCHEMA_ANNOTATION: &str = "yaml-language-server: $schema=";

/// Body of the synthetic notification that makes the server re-pull its
/// configuration. A bare payload is enough to trigger the pull.
pub const NUDGE_PAYLOAD: &[u8] =
    br#"{"jsonrpc":"2.0","method":"workspace/didChangeConfiguration"}"#;

/// Feature flags injected into the `yaml` configuration section when the
/// editor did not set them itself.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDefaults {
    pub hover: bool,
    pub completion: bool,
    pub validation: bool,
}

impl Default for FeatureDefaults {
    fn default() -> Self {
        Self {
            hover: true,
            completion: true,
            validation: true,
        }
    }
}

// Wire shapes of the intercepted notifications. Only the fields the engine
// reads are modeled; the forwarded bytes are always the originals.

#[derive(Deserialize)]
struct Notification<P> {
    params: P,
}

#[derive(Deserialize)]
struct DidOpenParams {
    #[serde(rename = "textDocument")]
    text_document: TextDocumentItem,
}

#[derive(Deserialize)]
struct TextDocumentItem {
    uri: String,
    text: String,
}

#[derive(Deserialize)]
struct DidChangeParams {
    #[serde(rename = "textDocument")]
    text_document: TextDocumentIdentifier,
    #[serde(rename = "contentChanges")]
    content_changes: Vec<ContentChange>,
}

#[derive(Deserialize)]
struct TextDocumentIdentifier {
    uri: String,
}

#[derive(Deserialize)]
struct ContentChange {
    text: String,
}

/// What the editor relay loop should do with a frame after interception.
pub struct EditorAction {
    /// Rewritten payload, when interception changed the bytes. `None` means
    /// forward the original frame.
    pub rewritten: Option<Vec<u8>>,
    /// Whether the mapping changed and the server should re-pull its
    /// configuration.
    pub nudge: bool,
}

impl EditorAction {
    fn forward() -> Self {
        Self {
            rewritten: None,
            nudge: false,
        }
    }

    fn nudge_only(nudge: bool) -> Self {
        Self {
            rewritten: None,
            nudge,
        }
    }
}

/// The router's interception engine, shared by both relay loops.
pub struct RouterEngine {
    registry: Arc<Registry>,
    chain: Chain,
    features: FeatureDefaults,
    /// Document URI → schema URI last published to the server.
    schema_state: RwLock<HashMap<String, String>>,
}

impl RouterEngine {
    pub fn new(registry: Arc<Registry>, chain: Chain, features: FeatureDefaults) -> Self {
        Self {
            registry,
            chain,
            features,
            schema_state: RwLock::new(HashMap::new()),
        }
    }

    /// Classifies one editor→server frame and runs the matching handler.
    pub async fn handle_editor_frame(&self, payload: &[u8]) -> EditorAction {
        let envelope: Value = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[editor] unparseable frame, forwarding as-is: {err}");
                return EditorAction::forward();
            }
        };

        if let Some(method) = envelope.get("method").and_then(Value::as_str) {
            match method {
                "textDocument/didOpen" => {
                    log::info!("[editor] intercepting {method}");
                    return EditorAction::nudge_only(self.handle_did_open(payload).await);
                }
                "textDocument/didChange" => {
                    log::info!("[editor] intercepting {method}");
                    return EditorAction::nudge_only(self.handle_did_change(payload).await);
                }
                "textDocument/didSave" => {
                    // Recognized but deliberately not acted on.
                    log::debug!("[editor] ignoring {method}");
                    return EditorAction::forward();
                }
                _ => return EditorAction::forward(),
            }
        }

        // A frame with an id and a result is the editor's response to a
        // server-originated request; the only one worth touching is the
        // `workspace/configuration` pull.
        let has_id = envelope.get("id").is_some_and(|id| !id.is_null());
        if has_id && envelope.get("result").is_some() {
            if let Some(rewritten) = self.intercept_workspace_configuration(envelope) {
                return EditorAction {
                    rewritten: Some(rewritten),
                    nudge: false,
                };
            }
        }

        EditorAction::forward()
    }

    /// Rewrites one server→editor frame, or returns `None` to pass it
    /// through unchanged. The only rewrite is the sync-capability coercion.
    pub fn handle_server_frame(&self, payload: &[u8]) -> Option<Vec<u8>> {
        self.force_full_sync(payload)
    }

    async fn handle_did_open(&self, payload: &[u8]) -> bool {
        let notification: Notification<DidOpenParams> = match serde_json::from_slice(payload) {
            Ok(notification) => notification,
            Err(err) => {
                log::warn!("[did-open] malformed notification: {err}");
                return false;
            }
        };

        let uri = notification.params.text_document.uri;
        let text = notification.params.text_document.text;

        log::info!("[did-open] processing {uri}");

        if has_schema_annotation(&text) {
            log::info!("[did-open] manual schema annotation in {uri}, standing aside");
            return false;
        }

        let schema_uris = self.chain.run(&uri, &text).await;
        if schema_uris.is_empty() {
            log::debug!("[did-open] no schema detected for {uri}");
            return false;
        }

        let final_uri = match self.registry.generate_composite_schema(&schema_uris) {
            Ok(final_uri) => final_uri,
            Err(err) => {
                log::warn!("[did-open] composite generation failed for {uri}: {err}");
                return false;
            }
        };

        log::info!("[did-open] mapping {uri} -> {final_uri}");

        let mut state = self.schema_state.write().expect("schema state lock poisoned");
        state.insert(uri, final_uri);
        // The caller emits the nudge after the lock is released.
        true
    }

    async fn handle_did_change(&self, payload: &[u8]) -> bool {
        let notification: Notification<DidChangeParams> = match serde_json::from_slice(payload) {
            Ok(notification) => notification,
            Err(err) => {
                log::warn!("[did-change] malformed notification: {err}");
                return false;
            }
        };

        let uri = notification.params.text_document.uri;
        // Sync is coerced to Full, so the first change carries the whole text.
        let Some(change) = notification.params.content_changes.first() else {
            return false;
        };
        let text = &change.text;

        if has_schema_annotation(text) {
            return self.remove_state(&uri, "manual schema annotation added");
        }

        if text.trim().is_empty() {
            return self.remove_state(&uri, "file content cleared");
        }

        let schema_uris = self.chain.run(&uri, text).await;
        if schema_uris.is_empty() {
            // Detection lost mid-edit (say, the apiVersion line is being
            // retyped). Keep the last mapping; eviction happens only through
            // the explicit cases above.
            return false;
        }

        let final_uri = match self.registry.generate_composite_schema(&schema_uris) {
            Ok(final_uri) => final_uri,
            Err(err) => {
                log::warn!("[did-change] composite generation failed for {uri}: {err}");
                return false;
            }
        };

        let mut state = self.schema_state.write().expect("schema state lock poisoned");
        if state.get(&uri).map(String::as_str) == Some(final_uri.as_str()) {
            return false;
        }

        log::info!("[did-change] schema changed for {uri}: {final_uri}");
        state.insert(uri, final_uri);
        true
    }

    fn remove_state(&self, uri: &str, reason: &str) -> bool {
        let mut state = self.schema_state.write().expect("schema state lock poisoned");
        if state.remove(uri).is_none() {
            return false;
        }
        drop(state);

        log::info!("[did-change] {reason} for {uri}, removing from router state");
        true
    }

    /// Injects feature defaults and the current schema mapping into the
    /// editor's `workspace/configuration` response. Returns `None` (forward
    /// the original) whenever the payload does not look like one.
    fn intercept_workspace_configuration(&self, mut envelope: Value) -> Option<Vec<u8>> {
        let items = envelope.get_mut("result")?.as_array_mut()?;
        if items.is_empty() {
            return None;
        }

        // Index 0 is the `yaml` section the server asked for; editors answer
        // null when they have nothing configured.
        if items[0].is_null() {
            items[0] = Value::Object(Map::new());
        }
        let section = items[0].as_object_mut()?;

        for (key, enabled) in [
            ("hover", self.features.hover),
            ("completion", self.features.completion),
            ("validation", self.features.validation),
        ] {
            section.entry(key).or_insert(Value::Bool(enabled));
        }

        let grouped = self.grouped_schemas();
        if grouped.is_empty() {
            log::debug!("[configuration] no schemas detected yet, injecting feature defaults only");
        } else {
            log::info!(
                "[configuration] injecting {} schema mapping(s)",
                grouped.len()
            );
            section.insert("schemas".to_string(), serde_json::to_value(&grouped).ok()?);
        }

        serde_json::to_vec(&envelope).ok()
    }

    /// Inverts the state map into the shape the server expects:
    /// schema URI → list of document URIs.
    fn grouped_schemas(&self) -> HashMap<String, Vec<String>> {
        let state = self.schema_state.read().expect("schema state lock poisoned");

        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for (uri, schema_uri) in state.iter() {
            grouped.entry(schema_uri.clone()).or_default().push(uri.clone());
        }
        grouped
    }

    /// Coerces the server's advertised `textDocumentSync` capability to `1`
    /// (Full): the change handlers rely on receiving the whole document text
    /// in every `didChange`.
    fn force_full_sync(&self, payload: &[u8]) -> Option<Vec<u8>> {
        // Fast path: skip the JSON work unless this can plausibly be an
        // initialize response.
        let text = std::str::from_utf8(payload).ok()?;
        if !text.contains("\"capabilities\"") || !text.contains("\"textDocumentSync\"") {
            return None;
        }

        let mut envelope: Value = serde_json::from_slice(payload).ok()?;
        let sync = envelope
            .get_mut("result")?
            .get_mut("capabilities")?
            .get_mut("textDocumentSync")?;

        *sync = Value::from(1);
        log::info!("[server] intercepted 'initialize', forced textDocumentSync to Full (1)");

        serde_json::to_vec(&envelope).ok()
    }

    #[cfg(test)]
    fn state_snapshot(&self) -> HashMap<String, String> {
        self.schema_state
            .read()
            .expect("schema state lock poisoned")
            .clone()
    }
}

fn has_schema_annotation(text: &str) -> bool {
    text.contains(INLINE_SCHEMA_ANNOTATION)
}
