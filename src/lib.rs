pub mod app;
pub mod config;
pub mod core;
pub mod detection;
pub mod metadata;
pub mod models;

pub use app::{Actions, App, MapViewer, ProcessReport, ProcessRequest};
pub use config::Settings;
pub use crate::core::{CoordinateStore, StoreError};
pub use detection::{DetectionResult, Detector, SidecarDetector, YoloDetector};
pub use metadata::{Extraction, MetadataMap, MetadataWarning, TagValue};
pub use models::{BoundingBox, CoordinateRecord, Detection, DetectionClass, DetectionCounts, GpsFix};
