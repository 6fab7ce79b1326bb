use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::models::CoordinateRecord;

const BACKGROUND: Rgb<u8> = Rgb([236, 239, 241]);
const GRID: Rgb<u8> = Rgb([200, 205, 210]);
const POINT: Rgb<u8> = Rgb([220, 38, 38]);

#[derive(Error, Debug)]
pub enum MapError {
    #[error("no coordinates to render")]
    Empty,
    #[error("failed to write map image {path}: {source}")]
    Image {
        source: image::ImageError,
        path: PathBuf,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Output locations of a rendered map
#[derive(Debug, Clone, PartialEq)]
pub struct MapFiles {
    pub image: PathBuf,
    pub geojson: PathBuf,
}

/// Map rendering settings
#[derive(Debug, Clone)]
pub struct MapStyle {
    pub width: u32,
    pub height: u32,
    /// Fraction of the coordinate span added around the points
    pub margin: f64,
    pub point_radius: i32,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            margin: 0.1,
            point_radius: 6,
        }
    }
}

/// Lat/lon window shown on the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// Window around all records, widened by `margin` of the span on every side.
    /// A single point gets a fixed window of about 0.01 degrees.
    pub fn around(records: &[CoordinateRecord], margin: f64) -> Option<Self> {
        let first = records.first()?;
        let mut b = Bounds {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lon: first.longitude,
            max_lon: first.longitude,
        };
        for r in records {
            b.min_lat = b.min_lat.min(r.latitude);
            b.max_lat = b.max_lat.max(r.latitude);
            b.min_lon = b.min_lon.min(r.longitude);
            b.max_lon = b.max_lon.max(r.longitude);
        }

        let lat_pad = ((b.max_lat - b.min_lat) * margin).max(0.005);
        let lon_pad = ((b.max_lon - b.min_lon) * margin).max(0.005);
        Some(Bounds {
            min_lat: b.min_lat - lat_pad,
            max_lat: b.max_lat + lat_pad,
            min_lon: b.min_lon - lon_pad,
            max_lon: b.max_lon + lon_pad,
        })
    }

    /// Pixel position of a coordinate on a `width` x `height` canvas (north up)
    pub fn project(&self, latitude: f64, longitude: f64, width: u32, height: u32) -> (i32, i32) {
        let fx = (longitude - self.min_lon) / (self.max_lon - self.min_lon);
        let fy = (self.max_lat - latitude) / (self.max_lat - self.min_lat);
        (
            (fx * f64::from(width - 1)).round() as i32,
            (fy * f64::from(height - 1)).round() as i32,
        )
    }
}

/// Draw every record as a dot on an equirectangular canvas
pub fn render(records: &[CoordinateRecord], style: &MapStyle) -> Result<RgbImage, MapError> {
    let bounds = Bounds::around(records, style.margin).ok_or(MapError::Empty)?;
    let mut canvas = RgbImage::from_pixel(style.width, style.height, BACKGROUND);

    for step in 1..10 {
        let x = (style.width * step / 10) as f32;
        let y = (style.height * step / 10) as f32;
        draw_line_segment_mut(&mut canvas, (x, 0.0), (x, style.height as f32), GRID);
        draw_line_segment_mut(&mut canvas, (0.0, y), (style.width as f32, y), GRID);
    }
    draw_hollow_rect_mut(
        &mut canvas,
        Rect::at(0, 0).of_size(style.width, style.height),
        GRID,
    );

    for record in records {
        let center = bounds.project(record.latitude, record.longitude, style.width, style.height);
        draw_filled_circle_mut(&mut canvas, center, style.point_radius, POINT);
    }

    Ok(canvas)
}

/// GeoJSON FeatureCollection with one Point per record
pub fn to_geojson(records: &[CoordinateRecord]) -> Value {
    let features: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [r.longitude, r.latitude],
                },
                "properties": { "count": r.count },
            })
        })
        .collect();

    json!({ "type": "FeatureCollection", "features": features })
}

/// Write `<name>.png` and `<name>.geojson` into `dir`
pub fn write_map(
    records: &[CoordinateRecord],
    dir: &Path,
    name: &str,
    style: &MapStyle,
) -> Result<MapFiles, MapError> {
    let canvas = render(records, style)?;

    std::fs::create_dir_all(dir).map_err(|e| MapError::Io {
        source: e,
        path: dir.to_path_buf(),
    })?;
    let image_path = dir.join(format!("{}.png", name));
    canvas.save(&image_path).map_err(|e| MapError::Image {
        source: e,
        path: image_path.clone(),
    })?;

    let geojson_path = dir.join(format!("{}.geojson", name));
    let geojson = serde_json::to_string_pretty(&to_geojson(records))
        .map_err(|e| MapError::Io {
            source: e.into(),
            path: geojson_path.clone(),
        })?;
    std::fs::write(&geojson_path, geojson).map_err(|e| MapError::Io {
        source: e,
        path: geojson_path.clone(),
    })?;

    info!("Rendered {} points to {}", records.len(), image_path.display());
    Ok(MapFiles {
        image: image_path,
        geojson: geojson_path,
    })
}
