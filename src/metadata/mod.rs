pub mod gps;

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use exif::{Context, Field, In, Tag, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub use gps::{GpsError, resolve};

/// Key under which all GPS sub-tags are nested
pub const POSITIONING_TAG: &str = "GPSInfo";

/// Decoded value of a single EXIF tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Text(String),
    Integers(Vec<i64>),
    Reals(Vec<f64>),
    Bytes(Vec<u8>),
    /// Nested GPS block, keyed by GPS tag name
    Positioning(BTreeMap<String, TagValue>),
}

impl TagValue {
    /// Get value as text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Get value as a list of reals. Integer lists are widened.
    pub fn as_reals(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Reals(v) => Some(v.clone()),
            TagValue::Integers(v) => Some(v.iter().map(|i| *i as f64).collect()),
            _ => None,
        }
    }

    /// Get value as the nested positioning map
    pub fn as_positioning(&self) -> Option<&BTreeMap<String, TagValue>> {
        match self {
            TagValue::Positioning(v) => Some(v),
            _ => None,
        }
    }
}

/// Human-readable view of an image's EXIF data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMap {
    entries: BTreeMap<String, TagValue>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: TagValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.entries.get(name)
    }

    pub fn positioning(&self) -> Option<&BTreeMap<String, TagValue>> {
        self.get(POSITIONING_TAG).and_then(TagValue::as_positioning)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TagValue)> {
        self.entries.iter()
    }
}

/// Why no metadata could be produced for an image
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataWarning {
    #[error("image does not contain any EXIF metadata")]
    Missing,
    #[error("EXIF metadata could not be decoded: {0}")]
    Malformed(String),
}

/// Outcome of metadata extraction. Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found(MetadataMap),
    Warning(MetadataWarning),
}

impl Extraction {
    /// The decoded map, or an empty one if extraction produced a warning
    pub fn into_map(self) -> MetadataMap {
        match self {
            Extraction::Found(map) => map,
            Extraction::Warning(_) => MetadataMap::new(),
        }
    }

    pub fn warning(&self) -> Option<&MetadataWarning> {
        match self {
            Extraction::Found(_) => None,
            Extraction::Warning(w) => Some(w),
        }
    }
}

/// Decode the EXIF block embedded in an encoded image (JPEG, TIFF, PNG, WebP, HEIF)
pub fn extract(bytes: &[u8]) -> Extraction {
    let mut cursor = Cursor::new(bytes);
    let outcome = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => Extraction::Found(decode_fields(exif.fields())),
        Err(exif::Error::NotFound(_)) => Extraction::Warning(MetadataWarning::Missing),
        Err(err) => Extraction::Warning(MetadataWarning::Malformed(err.to_string())),
    };

    match &outcome {
        Extraction::Found(map) => debug!("Decoded {} EXIF tags", map.len()),
        Extraction::Warning(w) => warn!("{}", w),
    }
    outcome
}

/// Read an image file and decode its EXIF block
pub fn extract_path(path: &Path) -> Extraction {
    match std::fs::read(path) {
        Ok(bytes) => extract(&bytes),
        Err(err) => {
            let warning = MetadataWarning::Malformed(format!("{}: {}", path.display(), err));
            warn!("{}", warning);
            Extraction::Warning(warning)
        }
    }
}

fn decode_fields<'a>(fields: impl Iterator<Item = &'a Field>) -> MetadataMap {
    let mut map = MetadataMap::new();
    let mut positioning = BTreeMap::new();

    for field in fields.filter(|f| f.ifd_num == In::PRIMARY) {
        if is_ifd_pointer(field.tag) {
            continue;
        }
        let name = tag_name(field.tag);
        let value = decode_value(&field.value);
        if field.tag.context() == Context::Gps {
            positioning.insert(name, value);
        } else {
            map.insert(name, value);
        }
    }

    if !positioning.is_empty() {
        map.insert(POSITIONING_TAG, TagValue::Positioning(positioning));
    }
    map
}

fn is_ifd_pointer(tag: Tag) -> bool {
    tag == Tag::GPSInfoIFDPointer || tag == Tag::ExifIFDPointer || tag == Tag::InteropIFDPointer
}

/// Dictionary name for known tags, numeric id otherwise
fn tag_name(tag: Tag) -> String {
    if tag.description().is_some() {
        tag.to_string()
    } else {
        tag.number().to_string()
    }
}

fn decode_value(value: &Value) -> TagValue {
    match value {
        Value::Ascii(parts) => TagValue::Text(
            parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Value::Byte(v) => TagValue::Integers(v.iter().map(|x| i64::from(*x)).collect()),
        Value::Short(v) => TagValue::Integers(v.iter().map(|x| i64::from(*x)).collect()),
        Value::Long(v) => TagValue::Integers(v.iter().map(|x| i64::from(*x)).collect()),
        Value::SByte(v) => TagValue::Integers(v.iter().map(|x| i64::from(*x)).collect()),
        Value::SShort(v) => TagValue::Integers(v.iter().map(|x| i64::from(*x)).collect()),
        Value::SLong(v) => TagValue::Integers(v.iter().map(|x| i64::from(*x)).collect()),
        Value::Rational(v) => TagValue::Reals(v.iter().map(|r| r.to_f64()).collect()),
        Value::SRational(v) => TagValue::Reals(v.iter().map(|r| r.to_f64()).collect()),
        Value::Float(v) => TagValue::Reals(v.iter().map(|x| f64::from(*x)).collect()),
        Value::Double(v) => TagValue::Reals(v.clone()),
        Value::Undefined(v, _) => TagValue::Bytes(v.clone()),
        _ => TagValue::Bytes(Vec::new()),
    }
}
