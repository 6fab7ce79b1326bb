use crate::models::{Detection, DetectionClass, DetectionCounts};

/// Tally detections per class
pub fn count(detections: &[Detection]) -> DetectionCounts {
    detections
        .iter()
        .fold(DetectionCounts::default(), |mut counts, d| {
            match d.class {
                DetectionClass::Manhole => counts.manholes += 1,
                DetectionClass::Pothole => counts.potholes += 1,
            }
            counts
        })
}
