//! Pixel geometry primitives
//!
//! Integer boxes, points and extents in detector coordinates
//! (origin at the bottom-left pixel).

mod bbox;
mod point;

pub use self::bbox::BoundingBox;
pub use self::point::{Extent, Point};
