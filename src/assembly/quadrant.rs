//! Quadrant identities and data kinds
//!
//! Quadrant coordinates are written `(x, y)`, but channel file names embed
//! them as `C{y}{x}`. The reversal lives in `channel_tag` and nowhere else.

use std::fmt;

use crate::errors::{ObsError, ObsResult};
use crate::geom::Extent;
use crate::image::SampleKind;

/// Position of a channel in the 2x2 detector layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quadrant {
    x: u8,
    y: u8,
}

impl Quadrant {
    /// All quadrants in assembly order
    pub const ALL: [Quadrant; 4] = [
        Quadrant { x: 0, y: 0 },
        Quadrant { x: 0, y: 1 },
        Quadrant { x: 1, y: 0 },
        Quadrant { x: 1, y: 1 },
    ];

    /// The channel whose header and coordinates are copied to the mosaic
    pub const REFERENCE: Quadrant = Quadrant { x: 0, y: 0 };

    pub fn new(x: u8, y: u8) -> ObsResult<Self> {
        if x > 1 || y > 1 {
            return Err(ObsError::GenericError(format!(
                "Quadrant ({}, {}) is outside the 2x2 layout", x, y)));
        }
        Ok(Quadrant { x, y })
    }

    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn y(&self) -> u8 {
        self.y
    }

    /// Channel tag used in file names: `C{y}{x}`
    pub fn channel_tag(&self) -> String {
        format!("C{}{}", self.y, self.x)
    }

    /// Channels in the upper row are read out mirrored in y
    pub fn is_flipped(&self) -> bool {
        self.y == 1
    }

    /// Lower-left corner of this quadrant in a mosaic of `sub`-sized blocks
    pub fn canvas_offset(&self, sub: Extent) -> (u32, u32) {
        (u32::from(self.x) * sub.width, u32::from(self.y) * sub.height)
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Raw readouts versus processed calibration products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Unsigned integer samples straight from the readout
    Raw,
    /// Floating point samples from processing
    Calibration,
}

impl DataKind {
    /// Whether an image with this sample type is of this kind
    pub fn accepts(&self, sample: SampleKind) -> bool {
        match self {
            DataKind::Raw => sample.is_integer(),
            DataKind::Calibration => !sample.is_integer(),
        }
    }

    /// The kind an image with this sample type belongs to
    pub fn of_samples(sample: SampleKind) -> DataKind {
        if sample.is_integer() { DataKind::Raw } else { DataKind::Calibration }
    }

    /// Description used when logging loads
    pub fn sample_description(&self) -> &'static str {
        match self {
            DataKind::Raw => "raw unsigned integer",
            DataKind::Calibration => "float",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Raw => f.write_str("raw"),
            DataKind::Calibration => f.write_str("calibration"),
        }
    }
}
