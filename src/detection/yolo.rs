use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::NdTensor;
use tracing::debug;

use super::{DetectionResult, Detector};

/// Inference parameters for a YOLO-style model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloParams {
    /// Square input edge the model was exported with
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

/// Runs an exported YOLOv8/v9 detection model through rten.
///
/// Export the trained weights to ONNX, then convert with `rten-convert`.
/// The model is loaded on the first detection and reused afterwards.
pub struct YoloDetector {
    model_path: PathBuf,
    params: YoloParams,
    model: Mutex<Option<Arc<Model>>>,
}

impl YoloDetector {
    pub fn new(model_path: impl Into<PathBuf>, params: YoloParams) -> Self {
        Self {
            model_path: model_path.into(),
            params,
            model: Mutex::new(None),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn model(&self) -> anyhow::Result<Arc<Model>> {
        let mut guard = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("Model lock poisoned"))?;
        if let Some(model) = guard.as_ref() {
            return Ok(model.clone());
        }

        if !self.model_path.exists() {
            anyhow::bail!("Model not found: {}", self.model_path.display());
        }
        debug!("Loading model {}", self.model_path.display());
        let model = Arc::new(
            Model::load_file(&self.model_path)
                .with_context(|| format!("Failed to load model {}", self.model_path.display()))?,
        );
        *guard = Some(model.clone());
        Ok(model)
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<DetectionResult>> {
        let model = self.model()?;
        let size = self.params.input_size;
        let (width, height) = image.dimensions();
        let input = to_input_tensor(image, size);

        let output = model
            .run_one(input.view().into(), None)
            .context("Model inference failed")?;
        let output = NdTensor::<f32, 3>::try_from(output)
            .map_err(|e| anyhow::anyhow!("Unexpected model output: {:?}", e))?;

        let [_, attributes, anchors] = output.shape();
        let data = output.to_vec();
        let scale = (
            width as f32 / size as f32,
            height as f32 / size as f32,
        );
        let result = decode_predictions(&data, attributes, anchors, scale, &self.params)?;

        debug!("Model produced {} boxes after suppression", result.len());
        Ok(vec![result])
    }

    fn name(&self) -> &str {
        "yolo"
    }
}

/// Resize to a square input and lay out as `[1, 3, size, size]` in [0, 1]
fn to_input_tensor(image: &DynamicImage, size: u32) -> NdTensor<f32, 4> {
    // Plain stretch, no letterboxing
    let rgb = image::imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);
    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = (y * size + x) as usize;
        for channel in 0..3 {
            data[channel * plane + offset] = f32::from(pixel[channel]) / 255.0;
        }
    }

    NdTensor::from_data([1, 3, size as usize, size as usize], data)
}

/// Decode a `[1, 4 + classes, anchors]` prediction buffer.
///
/// Each anchor column holds `(cx, cy, w, h)` in model input pixels followed by
/// one score per class. Boxes are scaled by `scale` back to source pixels.
pub fn decode_predictions(
    data: &[f32],
    attributes: usize,
    anchors: usize,
    scale: (f32, f32),
    params: &YoloParams,
) -> anyhow::Result<DetectionResult> {
    if attributes < 5 {
        anyhow::bail!("Model output has {} attributes, expected at least 5", attributes);
    }
    if data.len() != attributes * anchors {
        anyhow::bail!(
            "Model output has {} values, expected {}",
            data.len(),
            attributes * anchors
        );
    }

    // Column-major: attribute rows, one column per anchor
    let at = |attr: usize, anchor: usize| data[attr * anchors + anchor];
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        // Best class wins; there is no separate objectness score
        let (class, score) = (4..attributes)
            .map(|attr| (attr - 4, at(attr, anchor)))
            .fold((0, f32::MIN), |best, c| if c.1 > best.1 { c } else { best });
        if score < params.confidence_threshold {
            continue;
        }

        // Center/size to corners, then back to source pixels
        let (cx, cy) = (at(0, anchor), at(1, anchor));
        let (w, h) = (at(2, anchor), at(3, anchor));
        candidates.push(Candidate {
            class,
            score,
            bbox: [
                (cx - w / 2.0) * scale.0,
                (cy - h / 2.0) * scale.1,
                (cx + w / 2.0) * scale.0,
                (cy + h / 2.0) * scale.1,
            ],
        });
    }

    let kept = non_max_suppression(candidates, params.iou_threshold);
    Ok(DetectionResult {
        confidences: kept.iter().map(|c| c.score).collect(),
        classes: kept.iter().map(|c| c.class as f32).collect(),
        boxes: kept.iter().map(|c| c.bbox).collect(),
    })
}

#[derive(Debug, Clone)]
struct Candidate {
    class: usize,
    score: f32,
    bbox: [f32; 4],
}

/// Greedy per-class suppression, highest score first
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    // Kept boxes are already in descending score order
    let mut kept: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class == candidate.class && iou(&k.bbox, &candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;
    let area = |r: &[f32; 4]| (r[2] - r[0]) * (r[3] - r[1]);
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}
