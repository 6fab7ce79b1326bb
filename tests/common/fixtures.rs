use std::cell::Cell;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use pitscan::detection::{DetectionResult, Detector};
use pitscan::Settings;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

fn dms(parts: [u32; 3]) -> Value {
    Value::Rational(parts.iter().map(|p| Rational { num: *p, denom: 1 }).collect())
}

fn field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

/// The four GPS fields for a degrees/minutes/seconds position
pub fn gps_fields(lat: [u32; 3], lat_ref: &str, lon: [u32; 3], lon_ref: &str) -> Vec<Field> {
    vec![
        field(Tag::GPSLatitudeRef, ascii(lat_ref)),
        field(Tag::GPSLatitude, dms(lat)),
        field(Tag::GPSLongitudeRef, ascii(lon_ref)),
        field(Tag::GPSLongitude, dms(lon)),
    ]
}

/// Encode fields as a TIFF-structured EXIF block, with an image description
/// in the primary IFD next to them
pub fn exif_block(fields: &[Field]) -> Vec<u8> {
    let description = field(Tag::ImageDescription, ascii("road survey"));
    let mut writer = Writer::new();
    writer.push_field(&description);
    for f in fields {
        writer.push_field(f);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).expect("Failed to encode EXIF block");
    buf.into_inner()
}

/// Solid grey test image
pub fn test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |_, _| Rgb([128u8, 128, 128])))
}

/// PNG without any metadata
pub fn plain_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    test_image(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode PNG");
    buf.into_inner()
}

/// JPEG carrying `exif` in an APP1 segment right after SOI
pub fn jpeg_with_exif(width: u32, height: u32, exif: &[u8]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    test_image(width, height)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .expect("Failed to encode JPEG");
    let jpeg = buf.into_inner();

    let payload_len = 2 + 6 + exif.len();
    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 2);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(exif);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// JPEG taken at 45°30'00" N, 73°30'00" W
pub fn geotagged_jpeg(width: u32, height: u32) -> Vec<u8> {
    jpeg_with_exif(
        width,
        height,
        &exif_block(&gps_fields([45, 30, 0], "N", [73, 30, 0], "W")),
    )
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write test file");
    path
}

/// Settings rooted in a scratch directory
pub fn test_settings(root: &Path) -> Settings {
    Settings {
        storage_dir: root.join("data"),
        output_dir: Some(root.join("out")),
        ..Settings::default()
    }
}

/// Detector returning canned results and counting its calls
pub struct FixedDetector {
    results: Vec<DetectionResult>,
    calls: Cell<usize>,
}

impl FixedDetector {
    pub fn new(results: Vec<DetectionResult>) -> Self {
        Self {
            results,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Detector for FixedDetector {
    fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<DetectionResult>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.results.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

impl Detector for &FixedDetector {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<DetectionResult>> {
        (**self).detect(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Two potholes and one manhole
pub fn road_results() -> Vec<DetectionResult> {
    vec![DetectionResult {
        confidences: vec![1.0, 0.5, 1.0],
        classes: vec![1.0, 1.0, 0.0],
        boxes: vec![
            [2.0, 2.0, 9.0, 9.0],
            [20.0, 20.0, 29.0, 29.0],
            [40.0, 5.0, 49.0, 14.0],
        ],
    }]
}

/// Layer counting `WARN` events
#[derive(Clone, Default)]
pub struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` under a subscriber that counts warnings, returning its output and
/// the number of warnings it logged
pub fn count_warnings<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let output = tracing::subscriber::with_default(subscriber, f);
    (output, counter.count())
}
