//! Defect lists and their calibration header

use std::fmt;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};

use crate::errors::{ObsError, ObsResult};
use crate::geom::BoundingBox;

/// Text form of calibration dates
pub const CALIB_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse a calibration date, accepting a bare date for midnight
pub fn parse_calib_date(value: &str) -> ObsResult<NaiveDateTime> {
    let value = value.trim();
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, CALIB_DATE_FORMAT) {
        return Ok(datetime);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ObsError::FormatError(format!("Invalid calibration date '{}'", value)))
}

pub fn format_calib_date(date: &NaiveDateTime) -> String {
    date.format(CALIB_DATE_FORMAT).to_string()
}

/// Identity of the detector and calibration a defect list belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectHeader {
    pub instrument: String,
    pub detector_name: String,
    pub detector_serial: String,
    pub calib_date: NaiveDateTime,
    pub filter: Option<String>,
    created_at: DateTime<Utc>,
}

impl DefectHeader {
    /// New header stamped with the current time
    pub fn new(instrument: &str, detector_name: &str, detector_serial: &str, calib_date: NaiveDateTime) -> Self {
        DefectHeader {
            instrument: instrument.to_string(),
            detector_name: detector_name.to_string(),
            detector_serial: detector_serial.to_string(),
            calib_date,
            filter: None,
            created_at: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn with_filter(mut self, filter: Option<&str>) -> Self {
        self.filter = filter.map(str::to_string);
        self
    }

    /// Replace the creation stamp; sub-second precision is dropped
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at.trunc_subsecs(0);
        self
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Composite calibration identifier
    pub fn calib_id(&self) -> String {
        format!(
            "detector={name} calibDate={date} ccd={name} ccdnum={name} filter={filter}",
            name = self.detector_name,
            date = format_calib_date(&self.calib_date),
            filter = self.filter.as_deref().unwrap_or("None"))
    }
}

/// Ordered list of defect boxes for one detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectMap {
    pub header: DefectHeader,
    pub boxes: Vec<BoundingBox>,
}

impl DefectMap {
    pub fn new(header: DefectHeader, boxes: Vec<BoundingBox>) -> Self {
        DefectMap { header, boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Number of defective pixels
    pub fn total_area(&self) -> u64 {
        self.boxes.iter().map(|b| b.area()).sum()
    }

    /// First pair of boxes that share a pixel, if any
    pub fn find_overlap(&self) -> Option<(usize, usize)> {
        for (i, a) in self.boxes.iter().enumerate() {
            for (j, b) in self.boxes.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    return Some((i, j));
                }
            }
        }
        None
    }
}

impl fmt::Display for DefectMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} defect(s) covering {} pixel(s) on detector {} ({})",
               self.len(), self.total_area(), self.header.detector_name, self.header.calib_id())
    }
}
