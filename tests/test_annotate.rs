//! Integration tests for box painting and per-class counts.

mod common;

use image::Rgb;
use pitscan::detection::{self, BOX_COLORS};
use pitscan::{BoundingBox, Detection, DetectionClass, DetectionCounts};
use rstest::rstest;

use common::*;

fn detection(class: DetectionClass, confidence: f64, bbox: BoundingBox) -> Detection {
    Detection {
        class,
        confidence,
        bbox,
    }
}

#[rstest]
#[case(0.0)]
#[case(0.25)]
#[case(0.5)]
#[case(0.73)]
#[case(1.0)]
fn test_fill_color_scales_with_confidence(#[case] confidence: f64) {
    let image = test_image(20, 20);
    let detections = [
        detection(DetectionClass::Manhole, confidence, BoundingBox::new(0, 0, 9, 9)),
        detection(DetectionClass::Pothole, confidence, BoundingBox::new(10, 10, 19, 19)),
    ];

    let annotated = detection::annotate(&image, &detections);

    let expected = |base: [u8; 3]| Rgb(base.map(|c| (f64::from(c) * confidence).floor() as u8));
    assert_eq!(*annotated.get_pixel(5, 5), expected(BOX_COLORS[0]));
    assert_eq!(*annotated.get_pixel(15, 15), expected(BOX_COLORS[1]));
}

#[test]
fn test_extremes() {
    let image = test_image(10, 10);
    let black = detection(DetectionClass::Pothole, 0.0, BoundingBox::new(0, 0, 4, 4));
    let full = detection(DetectionClass::Pothole, 1.0, BoundingBox::new(5, 5, 9, 9));

    let annotated = detection::annotate(&image, &[black, full]);

    assert_eq!(*annotated.get_pixel(2, 2), Rgb([0, 0, 0]));
    assert_eq!(*annotated.get_pixel(7, 7), Rgb([255, 0, 255]));
}

#[test]
fn test_box_corners_are_inclusive_and_outside_untouched() {
    let image = test_image(10, 10);
    let d = detection(DetectionClass::Manhole, 1.0, BoundingBox::new(2, 3, 5, 6));

    let annotated = detection::annotate(&image, &[d]);

    assert_eq!(*annotated.get_pixel(2, 3), Rgb([0, 255, 0]));
    assert_eq!(*annotated.get_pixel(5, 6), Rgb([0, 255, 0]));
    assert_eq!(*annotated.get_pixel(6, 6), Rgb([128, 128, 128]));
    assert_eq!(*annotated.get_pixel(1, 3), Rgb([128, 128, 128]));
}

#[test]
fn test_later_boxes_win() {
    let image = test_image(10, 10);
    let first = detection(DetectionClass::Manhole, 1.0, BoundingBox::new(0, 0, 6, 6));
    let second = detection(DetectionClass::Pothole, 1.0, BoundingBox::new(4, 4, 9, 9));

    let annotated = detection::annotate(&image, &[first, second]);

    assert_eq!(*annotated.get_pixel(1, 1), Rgb([0, 255, 0]));
    assert_eq!(*annotated.get_pixel(5, 5), Rgb([255, 0, 255]));
}

#[test]
fn test_boxes_past_the_edge_are_clipped() {
    let image = test_image(10, 10);
    let d = detection(DetectionClass::Pothole, 1.0, BoundingBox::new(8, -3, 30, 2));

    let annotated = detection::annotate(&image, &[d]);

    assert_eq!(annotated.dimensions(), (10, 10));
    assert_eq!(*annotated.get_pixel(9, 0), Rgb([255, 0, 255]));
    assert_eq!(*annotated.get_pixel(9, 3), Rgb([128, 128, 128]));
}

#[test]
fn test_source_image_is_not_modified() {
    let image = test_image(10, 10);
    let d = detection(DetectionClass::Pothole, 1.0, BoundingBox::new(0, 0, 9, 9));

    let _ = detection::annotate(&image, &[d]);

    assert_eq!(image.to_rgb8().get_pixel(3, 3), &Rgb([128, 128, 128]));
}

#[test]
fn test_count_per_class() {
    let b = BoundingBox::new(0, 0, 1, 1);
    let detections = [
        detection(DetectionClass::Manhole, 0.9, b),
        detection(DetectionClass::Manhole, 0.8, b),
        detection(DetectionClass::Pothole, 0.7, b),
    ];

    assert_eq!(
        detection::count(&detections),
        DetectionCounts {
            potholes: 1,
            manholes: 2
        }
    );
}

#[test]
fn test_unknown_classes_count_as_potholes() {
    let results = vec![pitscan::DetectionResult {
        confidences: vec![0.5, 0.5, 0.5],
        classes: vec![0.0, 2.0, 7.0],
        boxes: vec![[0.0; 4]; 3],
    }];

    let counts = detection::count(&detection::flatten(&results));

    assert_eq!(counts.manholes, 1);
    assert_eq!(counts.potholes, 2);
}

#[test]
fn test_saturated_detector_box_fills_its_rows() {
    // Coordinates far past i32 range saturate on conversion
    let results = vec![pitscan::DetectionResult {
        confidences: vec![1.0],
        classes: vec![1.0],
        boxes: vec![[-1e10, 0.0, 1e10, 5.0]],
    }];
    let detections = detection::flatten(&results);
    assert_eq!(detections[0].bbox.x0, i32::MIN);
    assert_eq!(detections[0].bbox.x1, i32::MAX);
    assert_eq!(detections[0].bbox.width(), u32::MAX);

    let annotated = detection::annotate(&test_image(10, 10), &detections);

    assert_eq!(*annotated.get_pixel(0, 0), Rgb([255, 0, 255]));
    assert_eq!(*annotated.get_pixel(9, 5), Rgb([255, 0, 255]));
    assert_eq!(*annotated.get_pixel(9, 6), Rgb([128, 128, 128]));
}

#[test]
fn test_box_wider_than_i32_is_clipped() {
    let image = test_image(10, 10);
    let d = detection(
        DetectionClass::Manhole,
        1.0,
        BoundingBox::new(-2_000_000_000, 0, 2_000_000_000, 5),
    );

    let annotated = detection::annotate(&image, &[d]);

    assert_eq!(*annotated.get_pixel(0, 3), Rgb([0, 255, 0]));
    assert_eq!(*annotated.get_pixel(9, 5), Rgb([0, 255, 0]));
    assert_eq!(*annotated.get_pixel(4, 8), Rgb([128, 128, 128]));
}

#[test]
fn test_boxes_off_the_canvas_are_skipped() {
    let image = test_image(10, 10);
    let detections = [
        detection(DetectionClass::Pothole, 1.0, BoundingBox::new(-20, -20, -1, -1)),
        detection(DetectionClass::Pothole, 1.0, BoundingBox::new(10, 0, 40, 9)),
        detection(DetectionClass::Manhole, 1.0, BoundingBox::new(0, 12, 9, 30)),
    ];

    let annotated = detection::annotate(&image, &detections);

    assert!(annotated.pixels().all(|p| *p == Rgb([128, 128, 128])));
}

#[test]
fn test_clipped_keeps_boxes_inside() {
    let inside = BoundingBox::new(7, 8, 2, 3);

    assert_eq!(inside.clipped(10, 10), Some(BoundingBox::new(2, 3, 7, 8)));
    assert_eq!(BoundingBox::new(-5, 4, 15, 4).clipped(10, 10), Some(BoundingBox::new(0, 4, 9, 4)));
    assert_eq!(inside.clipped(0, 10), None);
}
