use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::detection::YoloParams;

pub const DEFAULT_STORAGE_DIR: &str = "./data/";
pub const DEFAULT_MODEL: &str = "v8s";
const CONFIG_FILE: &str = "pitscan";
const ENV_PREFIX: &str = "PITSCAN";

/// Application settings.
///
/// Sources, lowest priority first: built-in defaults, `pitscan.toml` (or the
/// file given on the command line), `PITSCAN_*` environment variables.
/// Nested keys use a double underscore, e.g. `PITSCAN_DETECTOR__IOU_THRESHOLD`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub storage_dir: PathBuf,
    pub save_to_disk: bool,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    pub default_model: String,
    pub models: BTreeMap<String, ModelProfile>,
    pub detector: DetectorSettings,
}

/// A trained model and the directory holding its evaluation plots
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelProfile {
    pub weights: PathBuf,
    pub metrics_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct DetectorSettings {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Settings {
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(CONFIG_FILE).required(false),
        };

        let defaults = YoloParams::default();
        Config::builder()
            .set_default("storage_dir", DEFAULT_STORAGE_DIR)?
            .set_default("save_to_disk", true)?
            .set_default("default_model", DEFAULT_MODEL)?
            .set_default("models.v8s.weights", "bestv8s.rten")?
            .set_default("models.v8s.metrics_dir", "./metrics/v8s/")?
            .set_default("models.v9c.weights", "bestv9c.rten")?
            .set_default("models.v9c.metrics_dir", "./metrics/v9c/")?
            .set_default("detector.input_size", i64::from(defaults.input_size))?
            .set_default("detector.confidence_threshold", f64::from(defaults.confidence_threshold))?
            .set_default("detector.iou_threshold", f64::from(defaults.iou_threshold))?
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Look up a model profile, falling back to the default model
    pub fn model(&self, name: Option<&str>) -> Option<(&str, &ModelProfile)> {
        let name = name.unwrap_or(&self.default_model);
        self.models
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for Settings {
    fn default() -> Self {
        let profile = |name: &str| ModelProfile {
            weights: PathBuf::from(format!("best{}.rten", name)),
            metrics_dir: PathBuf::from(format!("./metrics/{}/", name)),
        };
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            save_to_disk: true,
            output_dir: None,
            default_model: DEFAULT_MODEL.to_string(),
            models: BTreeMap::from([
                ("v8s".to_string(), profile("v8s")),
                ("v9c".to_string(), profile("v9c")),
            ]),
            detector: DetectorSettings::from(YoloParams::default()),
        }
    }
}

impl From<YoloParams> for DetectorSettings {
    fn from(params: YoloParams) -> Self {
        Self {
            input_size: params.input_size,
            confidence_threshold: params.confidence_threshold,
            iou_threshold: params.iou_threshold,
        }
    }
}

impl From<DetectorSettings> for YoloParams {
    fn from(settings: DetectorSettings) -> Self {
        Self {
            input_size: settings.input_size,
            confidence_threshold: settings.confidence_threshold,
            iou_threshold: settings.iou_threshold,
        }
    }
}
