//! Error types shared by mosaic assembly and the defect codec

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::assembly::{DataKind, Quadrant};

/// Errors raised while locating, assembling or persisting detector data
#[derive(Debug)]
pub enum ObsError {
    /// I/O error
    IoError(io::Error),
    /// A channel file or a named detector does not exist
    NotFound(String),
    /// More than one channel file matches a quadrant pattern
    AmbiguousMatch {
        pattern: String,
        matches: Vec<PathBuf>,
    },
    /// Raw data found where calibration data was requested, or vice versa
    WrongKind {
        path: PathBuf,
        expected: DataKind,
        found: DataKind,
    },
    /// Channel image is shorter than the requested crop height
    FrameTooSmall {
        quadrant: Quadrant,
        height: u32,
        sub_height: u32,
    },
    /// Quadrants crop to inconsistent sizes or layouts
    DimensionMismatch(String),
    /// Malformed persisted data
    FormatError(String),
    /// A detector name occurs more than once in one defect file
    DuplicateDetector {
        name: String,
        path: String,
    },
    /// Invalid configuration file or value
    ConfigError(String),
    /// Generic error with message
    GenericError(String),
}

impl ObsError {
    /// Name of the error kind, as printed by the command line tool
    pub fn kind(&self) -> &'static str {
        match self {
            ObsError::IoError(_) => "IoError",
            ObsError::NotFound(_) => "NotFoundError",
            ObsError::AmbiguousMatch { .. } => "AmbiguousMatchError",
            ObsError::WrongKind { .. } => "WrongKindError",
            ObsError::FrameTooSmall { .. } => "FrameTooSmallError",
            ObsError::DimensionMismatch(_) => "DimensionMismatchError",
            ObsError::FormatError(_) => "FormatError",
            ObsError::DuplicateDetector { .. } => "DuplicateDetectorError",
            ObsError::ConfigError(_) => "ConfigError",
            ObsError::GenericError(_) => "Error",
        }
    }
}

impl fmt::Display for ObsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObsError::IoError(e) => write!(f, "I/O error: {}", e),
            ObsError::NotFound(what) => write!(f, "Not found: {}", what),
            ObsError::AmbiguousMatch { pattern, matches } => {
                let names: Vec<String> = matches.iter()
                    .map(|p| p.display().to_string())
                    .collect();
                write!(f, "Found {} files matching {} instead of 1: [{}]",
                       matches.len(), pattern, names.join(", "))
            },
            ObsError::WrongKind { path, expected, found } => write!(
                f, "{} holds {} data but {} data was requested",
                path.display(), found, expected),
            ObsError::FrameTooSmall { quadrant, height, sub_height } => write!(
                f, "Channel {} is {} rows high, smaller than the {} rows requested",
                quadrant, height, sub_height),
            ObsError::DimensionMismatch(msg) => write!(f, "Dimension mismatch: {}", msg),
            ObsError::FormatError(msg) => write!(f, "Format error: {}", msg),
            ObsError::DuplicateDetector { name, path } => write!(
                f, "Detector {:?} occurs more than once in {}", name, path),
            ObsError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ObsError::GenericError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ObsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ObsError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ObsError {
    fn from(error: io::Error) -> Self {
        ObsError::IoError(error)
    }
}

impl From<String> for ObsError {
    fn from(msg: String) -> Self {
        ObsError::GenericError(msg)
    }
}

/// Result type for all crate operations
pub type ObsResult<T> = Result<T, ObsError>;
