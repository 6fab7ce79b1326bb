use std::collections::BTreeMap;

use thiserror::Error;

use super::{MetadataMap, TagValue};
use crate::models::GpsFix;

pub const LATITUDE: &str = "GPSLatitude";
pub const LATITUDE_REF: &str = "GPSLatitudeRef";
pub const LONGITUDE: &str = "GPSLongitude";
pub const LONGITUDE_REF: &str = "GPSLongitudeRef";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpsError {
    #[error("positioning data is missing '{0}'")]
    MissingField(&'static str),
    #[error("positioning field '{field}' is malformed: {reason}")]
    MalformedField { field: &'static str, reason: String },
}

/// Convert the positioning sub-map into signed decimal degrees.
///
/// Returns `Ok(None)` when the image has no positioning block at all. A block
/// that exists but lacks one of the four required fields is an error.
pub fn resolve(metadata: &MetadataMap) -> Result<Option<GpsFix>, GpsError> {
    let Some(gps) = metadata.positioning() else {
        return Ok(None);
    };

    let latitude = decimal_degrees(gps, LATITUDE)?;
    let latitude_ref = reference(gps, LATITUDE_REF)?;
    let longitude = decimal_degrees(gps, LONGITUDE)?;
    let longitude_ref = reference(gps, LONGITUDE_REF)?;

    Ok(Some(GpsFix {
        latitude: if latitude_ref == "S" { -latitude } else { latitude },
        longitude: if longitude_ref == "W" { -longitude } else { longitude },
    }))
}

/// degrees + minutes/60 + seconds/3600
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

fn decimal_degrees(
    gps: &BTreeMap<String, TagValue>,
    field: &'static str,
) -> Result<f64, GpsError> {
    let value = gps.get(field).ok_or(GpsError::MissingField(field))?;
    let parts = value.as_reals().ok_or_else(|| GpsError::MalformedField {
        field,
        reason: "expected rational components".to_string(),
    })?;

    let [degrees, minutes, seconds] = parts[..] else {
        return Err(GpsError::MalformedField {
            field,
            reason: format!("expected 3 components, found {}", parts.len()),
        });
    };

    let decimal = dms_to_decimal(degrees, minutes, seconds);
    if !decimal.is_finite() {
        return Err(GpsError::MalformedField {
            field,
            reason: "component has a zero denominator".to_string(),
        });
    }
    Ok(decimal)
}

fn reference<'a>(
    gps: &'a BTreeMap<String, TagValue>,
    field: &'static str,
) -> Result<&'a str, GpsError> {
    gps.get(field)
        .ok_or(GpsError::MissingField(field))?
        .as_text()
        .map(str::trim)
        .ok_or_else(|| GpsError::MalformedField {
            field,
            reason: "expected a hemisphere letter".to_string(),
        })
}
