use crate::Detector;

/// An ordered list of detectors run against every document.
pub struct Chain {
    detectors: Vec<Box<dyn Detector>>,
}

impl Chain {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Runs every detector in registration order and concatenates their
    /// results. A failing detector is logged and skipped; one failure does
    /// not mask what the others found.
    pub async fn run(&self, uri: &str, content: &str) -> Vec<String> {
        let mut schema_uris = Vec::new();

        for detector in &self.detectors {
            match detector.detect(uri, content).await {
                Ok(uris) => schema_uris.extend(uris),
                Err(err) => {
                    log::warn!("[{}] detection failed for {uri}: {err}", detector.name());
                }
            }
        }

        schema_uris
    }
}
