use std::path::{Path, PathBuf};

use anyhow::Context;
use image::DynamicImage;
use tracing::{info, warn};

use crate::config::Settings;
use crate::core::map::{self, MapFiles, MapStyle};
use crate::core::store::{self, CoordinateStore};
use crate::detection::{self, Detector};
use crate::metadata::{self, Extraction, MetadataWarning};
use crate::models::{CoordinateRecord, Detection, DetectionCounts, GpsFix};

/// Evaluation plots shipped with every model profile
pub const METRIC_PLOTS: [&str; 3] = ["confusion_matrix.png", "P_curve.png", "results.png"];

/// File name of the downloadable record blob
pub const DOWNLOAD_NAME: &str = "data.csv";

pub const NO_GPS_DATA: &str = "No GPS data in image!";
pub const NOTHING_SAVED: &str = "Nothing was saved!";

/// Which user actions to run on an image. Each runs independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actions {
    pub display: bool,
    pub predict: bool,
    pub save: bool,
    pub map: bool,
}

/// One uploaded image plus where to put its outputs
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub image: PathBuf,
    pub actions: Actions,
    /// Where to write the downloadable CSV blob, if anywhere
    pub download: Option<PathBuf>,
}

/// Everything one processing pass produced
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// User-facing messages, in the order they were produced
    pub messages: Vec<String>,
    pub dimensions: Option<(u32, u32)>,
    pub fix: Option<GpsFix>,
    pub counts: Option<DetectionCounts>,
    /// Record file written to the store
    pub saved: Option<PathBuf>,
    /// CSV blob offered for download
    pub download: Option<String>,
    pub map: Option<MapFiles>,
    /// Images written to the output directory
    pub images: Vec<PathBuf>,
}

impl ProcessReport {
    fn say(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// Runs user actions on uploaded images with an injected detector
pub struct App<D: Detector> {
    detector: D,
    store: CoordinateStore,
    settings: Settings,
    map_style: MapStyle,
}

impl<D: Detector> App<D> {
    /// Create the app. The record directory is created if needed.
    pub fn new(detector: D, settings: Settings) -> anyhow::Result<Self> {
        let store = CoordinateStore::open(&settings.storage_dir)
            .context("Failed to open the record store")?;
        Ok(Self {
            detector,
            store,
            settings,
            map_style: MapStyle::default(),
        })
    }

    pub fn with_map_style(mut self, style: MapStyle) -> Self {
        self.map_style = style;
        self
    }

    pub fn store(&self) -> &CoordinateStore {
        &self.store
    }

    pub fn process(&self, request: &ProcessRequest) -> anyhow::Result<ProcessReport> {
        let path = &request.image;
        let actions = request.actions;
        let identifier = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Image path has no file name: {}", path.display()))?
            .to_string();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_string();

        // Decode once; every action works on the same image and bytes
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let image = image::load_from_memory(&bytes)
            .with_context(|| format!("Failed to decode image {}", path.display()))?;

        let mut report = ProcessReport::default();
        // Metadata problems only produce messages, never an error
        let fix = self.locate(&bytes, &mut report);
        report.fix = fix;

        if actions.display {
            info!("Displaying {}", identifier);
            report.dimensions = Some((image.width(), image.height()));
            report.say(format!("{}: {}x{}", identifier, image.width(), image.height()));
            self.write_image(&image, &format!("{}_original", stem), &mut report)?;
        }

        // Shared between predict and save so the detector runs at most once
        let mut detections: Option<Vec<Detection>> = None;

        if actions.predict {
            let found = self.predict(&image)?;
            let counts = detection::count(&found);
            report.counts = Some(counts);
            report.say(format!("Potholes: {}", counts.potholes));
            report.say(format!("Manholes: {}", counts.manholes));

            let annotated = DynamicImage::ImageRgb8(detection::annotate(&image, &found));
            self.write_image(&image, &format!("{}_original", stem), &mut report)?;
            self.write_image(&annotated, &format!("{}_annotated", stem), &mut report)?;
            detections = Some(found);
        }

        if actions.save {
            match report.fix {
                None => {
                    report.say(NO_GPS_DATA);
                    report.say(NOTHING_SAVED);
                }
                Some(fix) => {
                    // Save without predict still needs a count
                    let found = match detections.take() {
                        Some(found) => found,
                        None => self.predict(&image)?,
                    };
                    let counts = detection::count(&found);
                    report.counts = Some(counts);
                    self.save(&identifier, &fix, counts, request.download.as_deref(), &mut report)?;
                }
            }
        }

        if actions.map {
            match report.fix {
                None => report.say(NO_GPS_DATA),
                Some(fix) => {
                    // Counts are only known if predict or save ran first
                    let record = CoordinateRecord {
                        latitude: fix.latitude,
                        longitude: fix.longitude,
                        count: report.counts.map(|c| c.potholes),
                    };
                    report.say(format!("LAT {} LON {}", fix.latitude, fix.longitude));
                    if let Some(dir) = &self.settings.output_dir {
                        report.map = Some(map::write_map(
                            &[record],
                            dir,
                            &format!("{}_map", stem),
                            &self.map_style,
                        )?);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Extract metadata and resolve a fix; every failure degrades to `None`
    fn locate(&self, bytes: &[u8], report: &mut ProcessReport) -> Option<GpsFix> {
        let metadata = match metadata::extract(bytes) {
            Extraction::Found(map) => map,
            Extraction::Warning(MetadataWarning::Missing) => {
                report.say("Warning: Image does NOT contain any EXIF metadata!");
                report.say(
                    "If you want to know where the photo was taken please supply an image \
                     that does contain GPS coordinates.",
                );
                return None;
            }
            Extraction::Warning(warning) => {
                report.say(format!("Error: {}", warning));
                return None;
            }
        };

        match metadata::resolve(&metadata) {
            Ok(fix) => fix,
            Err(err) => {
                warn!("Ignoring positioning data: {}", err);
                report.say(format!("Error: {}", err));
                None
            }
        }
    }

    fn predict(&self, image: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        info!("Running {} detector", self.detector.name());
        let results = self
            .detector
            .detect(image)
            .with_context(|| format!("{} detector failed", self.detector.name()))?;
        let found = detection::flatten(&results);
        info!("Detector found {} objects", found.len());
        Ok(found)
    }

    fn save(
        &self,
        identifier: &str,
        fix: &GpsFix,
        counts: DetectionCounts,
        download: Option<&Path>,
        report: &mut ProcessReport,
    ) -> anyhow::Result<()> {
        let record = CoordinateRecord::new(fix, counts.potholes);
        let blob = record.to_csv_string()?;
        report.say("The resulting CSV file contains:");
        report.say(blob.trim_end());

        // The blob is offered even when nothing goes to disk
        if self.settings.save_to_disk {
            let path = self.store.append(identifier, fix, counts.potholes)?;
            report.say(format!("Data saved to {}", path.display()));
            report.saved = Some(path);
        }

        if let Some(target) = download {
            std::fs::write(target, &blob)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            report.say(format!("Download written to {}", target.display()));
        }
        report.download = Some(blob);
        Ok(())
    }

    fn write_image(
        &self,
        image: &DynamicImage,
        name: &str,
        report: &mut ProcessReport,
    ) -> anyhow::Result<()> {
        let Some(dir) = &self.settings.output_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}.png", name));
        // display and predict both write the original
        if report.images.contains(&path) {
            return Ok(());
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        image
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        report.images.push(path);
        Ok(())
    }
}

/// Result of a map view over stored or uploaded records
#[derive(Debug, Clone, Default)]
pub struct ViewReport {
    pub messages: Vec<String>,
    pub records: Vec<CoordinateRecord>,
    pub map: Option<MapFiles>,
}

/// Shows previously saved or user-supplied coordinates on a map
pub struct MapViewer {
    store: CoordinateStore,
    output_dir: Option<PathBuf>,
    style: MapStyle,
}

impl MapViewer {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            store: CoordinateStore::open(&settings.storage_dir)
                .context("Failed to open the record store")?,
            output_dir: settings.output_dir.clone(),
            style: MapStyle::default(),
        })
    }

    /// Map every record in the store
    pub fn view_all(&self) -> anyhow::Result<ViewReport> {
        let files = self.store.list_record_files()?;
        let mut report = ViewReport::default();
        report.messages.push(format!("Found {} files!", files.len()));
        report.records = self.store.aggregate()?;
        self.render(&mut report, "all_records")?;
        Ok(report)
    }

    /// Map the rows of a CSV with `LAT`, `LON` and optional `CNT` columns
    pub fn view_csv(&self, csv_path: &Path) -> anyhow::Result<ViewReport> {
        let file = std::fs::File::open(csv_path)
            .with_context(|| format!("Failed to open {}", csv_path.display()))?;
        let mut report = ViewReport {
            records: store::read_records(file)
                .with_context(|| format!("Invalid CSV file {}", csv_path.display()))?,
            ..ViewReport::default()
        };
        let name = csv_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload")
            .to_string();
        self.render(&mut report, &format!("{}_map", name))?;
        Ok(report)
    }

    fn render(&self, report: &mut ViewReport, name: &str) -> anyhow::Result<()> {
        if report.records.is_empty() {
            report.messages.push("No coordinates to show".to_string());
            return Ok(());
        }
        for r in &report.records {
            report.messages.push(match r.count {
                Some(count) => format!("LAT {} LON {} CNT {}", r.latitude, r.longitude, count),
                None => format!("LAT {} LON {}", r.latitude, r.longitude),
            });
        }
        if let Some(dir) = &self.output_dir {
            report.map = Some(map::write_map(&report.records, dir, name, &self.style)?);
        }
        Ok(())
    }
}

/// Availability of a model profile's evaluation plots
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub model: String,
    pub found: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

/// Locate the evaluation plots of a model profile
pub fn metrics(settings: &Settings, model: Option<&str>) -> anyhow::Result<MetricsReport> {
    let (name, profile) = settings
        .model(model)
        .with_context(|| format!("Unknown model '{}'", model.unwrap_or(&settings.default_model)))?;

    let (found, missing): (Vec<PathBuf>, Vec<PathBuf>) = METRIC_PLOTS
        .iter()
        .map(|plot| profile.metrics_dir.join(plot))
        .partition(|path| path.is_file());

    Ok(MetricsReport {
        model: name.to_string(),
        found,
        missing,
    })
}
