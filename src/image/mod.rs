//! In-memory image model
//!
//! Typed pixel buffers, multi-plane images, ordered metadata and the
//! filter band lookup table.

mod band;
mod exposure;
mod metadata;
mod pixel_buffer;

pub use band::{Band, BandRegistry};
pub use exposure::{Image, Plane, PlaneKind, Wcs};
pub use metadata::{MetaValue, Metadata};
pub use pixel_buffer::{PixelBuffer, PixelData, SampleKind};
