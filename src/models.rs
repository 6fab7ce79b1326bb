use serde::{Deserialize, Serialize};

/// Object classes the road-damage model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionClass {
    Manhole,
    Pothole,
}

impl DetectionClass {
    /// Map a raw model class index. Index 0 is a manhole, anything else a pothole.
    pub fn from_index(index: i64) -> Self {
        if index == 0 {
            DetectionClass::Manhole
        } else {
            DetectionClass::Pothole
        }
    }

    pub fn index(self) -> usize {
        match self {
            DetectionClass::Manhole => 0,
            DetectionClass::Pothole => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DetectionClass::Manhole => "manhole",
            DetectionClass::Pothole => "pothole",
        }
    }
}

/// Pixel rectangle with inclusive corners, as reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BoundingBox {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Same rectangle with corners ordered so that `x0 <= x1` and `y0 <= y1`
    pub fn normalized(&self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }

    /// Inclusive width, saturating at `u32::MAX`
    pub fn width(&self) -> u32 {
        self.x1.abs_diff(self.x0).saturating_add(1)
    }

    pub fn height(&self) -> u32 {
        self.y1.abs_diff(self.y0).saturating_add(1)
    }

    /// Intersection with a `width` x `height` canvas, or `None` if the box
    /// lies entirely outside it
    pub fn clipped(&self, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let b = self.normalized();
        let max_x = i32::try_from(width - 1).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height - 1).unwrap_or(i32::MAX);
        if b.x1 < 0 || b.y1 < 0 || b.x0 > max_x || b.y0 > max_y {
            return None;
        }
        Some(Self {
            x0: b.x0.max(0),
            y0: b.y0.max(0),
            x1: b.x1.min(max_x),
            y1: b.y1.min(max_y),
        })
    }
}

/// One object found by the detector
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class: DetectionClass,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionCounts {
    pub potholes: u32,
    pub manholes: u32,
}

/// Signed decimal-degree position; south and west are negative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// One `LAT,LON,CNT` row of a record file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateRecord {
    #[serde(rename = "LAT")]
    pub latitude: f64,
    #[serde(rename = "LON")]
    pub longitude: f64,
    #[serde(rename = "CNT", default)]
    pub count: Option<u32>,
}

impl CoordinateRecord {
    pub fn new(fix: &GpsFix, count: u32) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            count: Some(count),
        }
    }

    /// This record as a CSV document with a header row
    pub fn to_csv_string(&self) -> Result<String, csv::Error> {
        crate::core::store::records_to_csv(std::slice::from_ref(self))
    }
}
