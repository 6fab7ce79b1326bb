use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{CoordinateRecord, GpsFix};

pub const RECORD_EXTENSION: &str = "csv";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid record data in {path}: {source}")]
    Csv { source: csv::Error, path: PathBuf },
    #[error("invalid image identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Directory of one-row `LAT,LON,CNT` record files, one file per image
#[derive(Debug, Clone)]
pub struct CoordinateStore {
    dir: PathBuf,
}

impl CoordinateStore {
    /// Open the store, creating its directory if it does not exist yet
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            source: e,
            path: dir.clone(),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for an image identifier
    pub fn record_path(&self, identifier: &str) -> Result<PathBuf, StoreError> {
        if identifier.is_empty() || identifier.contains(['/', '\\']) || identifier == ".." {
            return Err(StoreError::InvalidIdentifier(identifier.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", identifier, RECORD_EXTENSION)))
    }

    /// Write the record for `identifier`, replacing any earlier one
    pub fn append(&self, identifier: &str, fix: &GpsFix, count: u32) -> Result<PathBuf, StoreError> {
        let path = self.record_path(identifier)?;
        let record = CoordinateRecord::new(fix, count);

        let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_error(e, &path))?;
        writer.serialize(&record).map_err(|e| csv_error(e, &path))?;
        writer.flush().map_err(|e| StoreError::Io {
            source: e,
            path: path.clone(),
        })?;

        info!("Saved record to {}", path.display());
        Ok(path)
    }

    /// Record files in the store, sorted by file name
    pub fn list_record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let io_error = |e| StoreError::Io {
            source: e,
            path: self.dir.clone(),
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Concatenate the rows of every record file
    pub fn aggregate(&self) -> Result<Vec<CoordinateRecord>, StoreError> {
        let mut records = Vec::new();
        for path in self.list_record_files()? {
            let file = std::fs::File::open(&path).map_err(|e| StoreError::Io {
                source: e,
                path: path.clone(),
            })?;
            let rows = read_records(file).map_err(|e| csv_error(e, &path))?;
            debug!("Read {} rows from {}", rows.len(), path.display());
            records.extend(rows);
        }
        Ok(records)
    }
}

/// Parse CSV with `LAT`, `LON` and optional `CNT` columns
pub fn read_records<R: Read>(reader: R) -> Result<Vec<CoordinateRecord>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize()
        .collect()
}

/// Render records as a CSV document with a header row
pub fn records_to_csv(records: &[CoordinateRecord]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn csv_error(source: csv::Error, path: &Path) -> StoreError {
    StoreError::Csv {
        source,
        path: path.to_path_buf(),
    }
}
