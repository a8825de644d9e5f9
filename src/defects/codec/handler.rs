//! Defect format handler trait definition

use std::fmt;
use std::path::Path;

use crate::errors::{ObsError, ObsResult};
use crate::defects::DefectMap;

/// Persisted defect formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectFormat {
    /// Binary table in FITS-style blocks
    Table,
    /// Header comment plus aligned integer columns
    Text,
    /// Self-describing text table
    Ecsv,
}

impl DefectFormat {
    /// Format for a file extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Option<DefectFormat> {
        match ext.to_lowercase().as_str() {
            "fits" | "fit" => Some(DefectFormat::Table),
            "dat" | "txt" => Some(DefectFormat::Text),
            "ecsv" => Some(DefectFormat::Ecsv),
            _ => None,
        }
    }

    /// Format implied by a file name
    pub fn from_path(path: &Path) -> Option<DefectFormat> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(DefectFormat::from_extension)
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            DefectFormat::Table => &["fits", "fit"],
            DefectFormat::Text => &["dat", "txt"],
            DefectFormat::Ecsv => &["ecsv"],
        }
    }
}

impl fmt::Display for DefectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectFormat::Table => f.write_str("table"),
            DefectFormat::Text => f.write_str("text"),
            DefectFormat::Ecsv => f.write_str("ecsv"),
        }
    }
}

/// Strategy trait for reading and writing one defect format
pub trait DefectFormatHandler: Send + Sync {
    /// Serialize the maps of one or more detectors
    fn encode_many(&self, maps: &[DefectMap]) -> ObsResult<Vec<u8>>;

    /// Parse every detector in the data
    fn decode_all(&self, data: &[u8]) -> ObsResult<Vec<DefectMap>>;

    /// Get the name of this format
    fn name(&self) -> &'static str;

    /// Get the format tag
    fn format(&self) -> DefectFormat;

    /// Serialize a single detector
    fn encode(&self, map: &DefectMap) -> ObsResult<Vec<u8>> {
        self.encode_many(std::slice::from_ref(map))
    }

    /// Parse the map of the detector called `detector`
    fn decode(&self, data: &[u8], detector: &str) -> ObsResult<DefectMap> {
        let source = format!("<{} data>", self.name());
        select_detector(self.decode_all(data)?, detector, &source)
    }
}

/// Pick the one map named `detector`
///
/// Absent names are `NotFound`; names occurring more than once are
/// `DuplicateDetector`.
pub fn select_detector(maps: Vec<DefectMap>, detector: &str, source: &str) -> ObsResult<DefectMap> {
    let mut matching: Vec<DefectMap> = maps.into_iter()
        .filter(|map| map.header.detector_name == detector)
        .collect();

    match matching.len() {
        0 => Err(ObsError::NotFound(format!("detector {} is not in {}", detector, source))),
        1 => Ok(matching.remove(0)),
        _ => Err(ObsError::DuplicateDetector {
            name: detector.to_string(),
            path: source.to_string(),
        }),
    }
}

/// Fail unless exactly one map is given
pub(crate) fn single_map<'m>(maps: &'m [DefectMap], format: &str) -> ObsResult<&'m DefectMap> {
    match maps {
        [map] => Ok(map),
        _ => Err(ObsError::FormatError(format!(
            "The {} format holds exactly one detector, {} given", format, maps.len()))),
    }
}
