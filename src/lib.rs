//! Detector mosaic assembly and defect region persistence
//!
//! Four channel images of a simulated detector are combined into one image,
//! and bad-pixel masks are turned into rectangle lists stored in table, text
//! or ECSV files.

pub mod errors;
pub mod geom;
pub mod image;
pub mod fits;
pub mod assembly;
pub mod defects;
pub mod config;
pub mod utils;
pub mod commands;
pub mod api;

pub use crate::api::ObsMosaic;

pub use assembly::{ChannelLocator, DataKind, MosaicAssembler, Quadrant, SubframeExtractor};
pub use config::ObsConfig;
pub use defects::{DefectCodec, DefectFormat, DefectHeader, DefectMap};
pub use errors::{ObsError, ObsResult};
pub use geom::BoundingBox;
pub use image::{Image, Metadata};
