use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::models::{Detection, DetectionClass};

/// Base box colour per class, indexed by `DetectionClass::index`
pub const BOX_COLORS: [[u8; 3]; 2] = [[0, 255, 0], [255, 0, 255]];

/// Scale every channel by `confidence`, rounding down.
/// 0 gives black, 1 the unscaled colour.
pub fn scale_color(base: [u8; 3], confidence: f64) -> Rgb<u8> {
    let c = confidence.clamp(0.0, 1.0);
    Rgb(base.map(|channel| (f64::from(channel) * c).floor() as u8))
}

pub fn box_color(class: DetectionClass, confidence: f64) -> Rgb<u8> {
    scale_color(BOX_COLORS[class.index()], confidence)
}

/// Paint a filled box per detection on a copy of `image`.
///
/// Boxes are painted in list order, so a later box covers an earlier one
/// where they overlap. Boxes are clipped to the image; boxes entirely off
/// the image are skipped.
pub fn annotate(image: &DynamicImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();

    for detection in detections {
        // Clip before building the rect: imageproc's right/bottom edges
        // overflow for boxes wider than i32::MAX
        let Some(bbox) = detection.bbox.clipped(width, height) else {
            continue;
        };
        let rect = Rect::at(bbox.x0, bbox.y0).of_size(bbox.width(), bbox.height());
        draw_filled_rect_mut(&mut canvas, rect, box_color(detection.class, detection.confidence));
    }

    canvas
}
