pub mod annotate;
pub mod sidecar;
pub mod tally;
pub mod yolo;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::models::{BoundingBox, Detection, DetectionClass};

pub use annotate::{annotate, box_color, scale_color, BOX_COLORS};
pub use sidecar::SidecarDetector;
pub use tally::count;
pub use yolo::{YoloDetector, YoloParams};

/// Raw output of one detector result object.
///
/// The three lists are parallel: entry `i` of each describes the same box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub confidences: Vec<f32>,
    pub classes: Vec<f32>,
    /// `[x0, y0, x1, y1]` in source image pixels
    pub boxes: Vec<[f32; 4]>,
}

impl DetectionResult {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Convert to typed detections, keeping list order.
    /// Entries missing from any of the parallel lists are dropped.
    pub fn detections(&self) -> Vec<Detection> {
        self.boxes
            .iter()
            .zip(&self.classes)
            .zip(&self.confidences)
            .map(|((b, class), confidence)| Detection {
                class: DetectionClass::from_index(*class as i64),
                confidence: f64::from(*confidence),
                bbox: BoundingBox::new(b[0] as i32, b[1] as i32, b[2] as i32, b[3] as i32),
            })
            .collect()
    }
}

/// Anything that can find potholes and manholes in an image
pub trait Detector {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<DetectionResult>>;

    /// Human-readable name (used in log output)
    fn name(&self) -> &str;
}

/// Flatten every result object into one detection list, in result order
pub fn flatten(results: &[DetectionResult]) -> Vec<Detection> {
    results.iter().flat_map(DetectionResult::detections).collect()
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<DetectionResult>> {
        (**self).detect(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
