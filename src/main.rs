use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pitscan::app::{self, Actions, App, MapViewer, ProcessRequest};
use pitscan::detection::{Detector, SidecarDetector, YoloDetector};
use pitscan::Settings;

#[derive(Parser)]
#[command(name = "pitscan")]
#[command(about = "Detect potholes and manholes in road images and map where they were taken")]
struct Cli {
    /// Configuration file (defaults to ./pitscan.toml if present)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding the per-image record files
    #[arg(long, value_name = "DIR", global = true)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process an image
    Process {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Show the image
        #[arg(long)]
        display: bool,

        /// Run the detector and paint the detections
        #[arg(long)]
        predict: bool,

        /// Save the image's coordinates and pothole count
        #[arg(long)]
        save: bool,

        /// Show the image's position on a map
        #[arg(long)]
        map: bool,

        /// Model profile to use
        #[arg(long, value_name = "NAME")]
        model: Option<String>,

        /// Use precomputed detections from a JSON file instead of the model
        #[arg(long, value_name = "FILE")]
        detections: Option<PathBuf>,

        /// Write the saved record as a downloadable CSV (`--download` alone
        /// writes data.csv, `--download=FILE` picks the path)
        #[arg(
            long,
            value_name = "FILE",
            num_args = 0..=1,
            require_equals = true,
            default_missing_value = app::DOWNLOAD_NAME
        )]
        download: Option<PathBuf>,

        /// Directory for rendered images and maps
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Do not write the record file, only show it
        #[arg(long)]
        no_store: bool,
    },
    /// Show stored coordinates, or those of a CSV file, on a map
    View {
        /// CSV file with LAT, LON and optional CNT columns
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,

        /// Directory for the rendered map
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Show where the selected model's evaluation plots are
    Metrics {
        /// Model profile to use
        #[arg(long, value_name = "NAME")]
        model: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = args.storage_dir {
        settings.storage_dir = dir;
    }

    match args.command {
        Command::Process {
            image,
            display,
            predict,
            save,
            map,
            model,
            detections,
            download,
            out_dir,
            no_store,
        } => {
            if out_dir.is_some() {
                settings.output_dir = out_dir;
            }
            if no_store {
                settings.save_to_disk = false;
            }

            let detector: Box<dyn Detector> = match detections {
                Some(path) => Box::new(SidecarDetector::new(path)),
                None => {
                    let (name, profile) = settings
                        .model(model.as_deref())
                        .with_context(|| {
                            format!(
                                "Unknown model '{}'",
                                model.as_deref().unwrap_or(&settings.default_model)
                            )
                        })?;
                    info!("Using the {} model", name);
                    Box::new(YoloDetector::new(&profile.weights, settings.detector.into()))
                }
            };

            let actions = Actions {
                display,
                predict,
                save,
                map,
            };
            if actions == Actions::default() {
                println!("Nothing to do: pick at least one of --display, --predict, --save, --map");
                return Ok(());
            }

            let app = App::new(detector, settings)?;
            let report = app.process(&ProcessRequest {
                image,
                actions,
                download,
            })?;

            for message in &report.messages {
                println!("{}", message);
            }
            for path in &report.images {
                println!("Wrote {}", path.display());
            }
            if let Some(files) = &report.map {
                println!("Map: {} ({})", files.image.display(), files.geojson.display());
            }
        }
        Command::View { csv, out_dir } => {
            if out_dir.is_some() {
                settings.output_dir = out_dir;
            }
            let viewer = MapViewer::new(&settings)?;
            let report = match csv {
                Some(path) => viewer.view_csv(&path)?,
                None => viewer.view_all()?,
            };

            for message in &report.messages {
                println!("{}", message);
            }
            if let Some(files) = &report.map {
                println!("Map: {} ({})", files.image.display(), files.geojson.display());
            }
        }
        Command::Metrics { model } => {
            let report = app::metrics(&settings, model.as_deref())?;
            println!("Using the {} model", report.model);
            for path in &report.found {
                println!("  {}", path.display());
            }
            for path in &report.missing {
                println!("  missing: {}", path.display());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_of(args: &[&str]) -> (PathBuf, Option<PathBuf>) {
        let cli = Cli::try_parse_from(args).expect("arguments should parse");
        match cli.command {
            Command::Process {
                image, download, ..
            } => (image, download),
            _ => panic!("expected the process subcommand"),
        }
    }

    #[test]
    fn bare_download_does_not_swallow_the_image() {
        let (image, download) =
            download_of(&["pitscan", "process", "--save", "--download", "photo.jpg"]);

        assert_eq!(image, PathBuf::from("photo.jpg"));
        assert_eq!(download, Some(PathBuf::from(app::DOWNLOAD_NAME)));
    }

    #[test]
    fn download_path_needs_equals() {
        let (image, download) =
            download_of(&["pitscan", "process", "photo.jpg", "--save", "--download=out.csv"]);

        assert_eq!(image, PathBuf::from("photo.jpg"));
        assert_eq!(download, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn download_is_off_by_default() {
        let (_, download) = download_of(&["pitscan", "process", "photo.jpg", "--save"]);

        assert_eq!(download, None);
    }
}
