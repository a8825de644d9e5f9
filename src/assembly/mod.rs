//! Detector mosaic assembly
//!
//! Locates the four channel files of a detector, crops each to a fixed
//! height and lays the crops out 2x2.

mod locator;
mod mosaic;
mod quadrant;
mod subframe;

pub use self::locator::{ChannelLocator, ChannelNaming};
pub use self::mosaic::MosaicAssembler;
pub use self::quadrant::{DataKind, Quadrant};
pub use self::subframe::{SubframeExtractor, DEFAULT_SUB_HEIGHT};
