use std::path::{Path, PathBuf};

use anyhow::Context;
use image::DynamicImage;
use tracing::debug;

use super::{DetectionResult, Detector};

/// Detector that replays detections computed elsewhere.
///
/// The file holds a JSON array of result objects, each with parallel
/// `confidences`, `classes` and `boxes` lists.
pub struct SidecarDetector {
    path: PathBuf,
}

impl SidecarDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Detector for SidecarDetector {
    fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<DetectionResult>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read detections from {}", self.path.display()))?;
        let results: Vec<DetectionResult> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid detections file {}", self.path.display()))?;

        for (i, result) in results.iter().enumerate() {
            if result.confidences.len() != result.len() || result.classes.len() != result.len() {
                anyhow::bail!(
                    "Result {} in {} has mismatched list lengths",
                    i,
                    self.path.display()
                );
            }
        }

        debug!("Loaded {} result objects from {}", results.len(), self.path.display());
        Ok(results)
    }

    fn name(&self) -> &str {
        "sidecar"
    }
}
