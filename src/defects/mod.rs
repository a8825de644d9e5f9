//! Defect regions
//!
//! Bad-pixel masks become ordered lists of non-overlapping boxes, which are
//! persisted in one of several file formats.

pub mod codec;
mod defect_map;
mod extractor;
mod mask;

pub use self::codec::{DefectCodec, DefectFormat, DefectFormatFactory, DefectFormatHandler};
pub use self::defect_map::{format_calib_date, parse_calib_date, DefectHeader, DefectMap};
pub use self::extractor::{defects_from_image, DefectRegionExtractor};
pub use self::mask::{mask_plane_bit, BoolMask};
