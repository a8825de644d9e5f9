//! Integer bounding box shared by the mosaic and defect paths
//!
//! Boxes use pixel coordinates with the origin at the bottom-left corner of
//! the detector. A box is the half-open range `[x0, x0+width) x [y0, y0+height)`.

use std::fmt;

use crate::errors::{ObsError, ObsResult};
use super::point::{Extent, Point};

/// A non-empty rectangle of pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    /// X coordinate of the first column
    pub x0: i32,
    /// Y coordinate of the first row
    pub y0: i32,
    /// Number of columns (> 0)
    pub width: u32,
    /// Number of rows (> 0)
    pub height: u32,
}

impl BoundingBox {
    /// Create a new bounding box
    ///
    /// # Arguments
    /// * `x0` - Column of the lower-left corner
    /// * `y0` - Row of the lower-left corner
    /// * `width` - Number of columns, must be positive
    /// * `height` - Number of rows, must be positive
    ///
    /// # Returns
    /// The box, or a `FormatError` for an empty extent
    pub fn new(x0: i32, y0: i32, width: u32, height: u32) -> ObsResult<Self> {
        if width == 0 || height == 0 {
            return Err(ObsError::FormatError(format!(
                "Bounding box at ({}, {}) has empty extent {}x{}", x0, y0, width, height)));
        }
        if i64::from(x0) + i64::from(width) > i64::from(i32::MAX)
            || i64::from(y0) + i64::from(height) > i64::from(i32::MAX) {
            return Err(ObsError::FormatError(format!(
                "Bounding box at ({}, {}) with extent {}x{} overflows the coordinate range",
                x0, y0, width, height)));
        }
        Ok(BoundingBox { x0, y0, width, height })
    }

    /// Create a box from its origin and extent
    pub fn from_corner(origin: Point, extent: Extent) -> ObsResult<Self> {
        BoundingBox::new(origin.x, origin.y, extent.width, extent.height)
    }

    /// Lower-left corner
    pub fn origin(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    /// Width and height
    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// X coordinate immediately right of the box (exclusive)
    pub fn end_x(&self) -> i64 {
        i64::from(self.x0) + i64::from(self.width)
    }

    /// Y coordinate immediately above the box (exclusive)
    pub fn end_y(&self) -> i64 {
        i64::from(self.y0) + i64::from(self.height)
    }

    /// Number of pixels covered
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Check whether the pixel at (x, y) lies inside the box
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= i64::from(self.x0) && x < self.end_x()
            && y >= i64::from(self.y0) && y < self.end_y()
    }

    /// Check whether two boxes share at least one pixel
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.intersection(other).is_some()
    }

    /// The common part of two boxes, if any
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.end_x().min(other.end_x());
        let y1 = self.end_y().min(other.end_y());

        if x1 <= i64::from(x0) || y1 <= i64::from(y0) {
            return None;
        }

        Some(BoundingBox {
            x0,
            y0,
            width: (x1 - i64::from(x0)) as u32,
            height: (y1 - i64::from(y0)) as u32,
        })
    }

    /// Check whether this box lies fully inside a `width` x `height` frame at the origin
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x0 >= 0 && self.y0 >= 0
            && self.end_x() <= i64::from(width)
            && self.end_y() <= i64::from(height)
    }

    /// Parse a box from "x0,y0,width,height"
    pub fn from_string(bbox_str: &str) -> ObsResult<Self> {
        let parts: Vec<&str> = bbox_str.split(',').collect();
        if parts.len() != 4 {
            return Err(ObsError::FormatError(
                "Bounding box must have 4 comma-separated values".to_string()));
        }

        let parse_i32 = |s: &str, name: &str| s.trim().parse::<i32>()
            .map_err(|_| ObsError::FormatError(format!("Invalid {} value: {:?}", name, s)));
        let parse_u32 = |s: &str, name: &str| s.trim().parse::<u32>()
            .map_err(|_| ObsError::FormatError(format!("Invalid {} value: {:?}", name, s)));

        BoundingBox::new(
            parse_i32(parts[0], "x0")?,
            parse_i32(parts[1], "y0")?,
            parse_u32(parts[2], "width")?,
            parse_u32(parts[3], "height")?,
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {}x{}", self.x0, self.y0, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_extent() {
        assert!(BoundingBox::new(0, 0, 0, 3).is_err());
        assert!(BoundingBox::new(0, 0, 3, 0).is_err());
    }

    #[test]
    fn intersection_of_touching_boxes_is_empty() {
        let a = BoundingBox::new(0, 0, 5, 5).unwrap();
        let b = BoundingBox::new(5, 0, 2, 5).unwrap();
        assert!(!a.overlaps(&b));

        let c = BoundingBox::new(4, 4, 3, 3).unwrap();
        assert_eq!(a.intersection(&c), Some(BoundingBox::new(4, 4, 1, 1).unwrap()));
    }

    #[test]
    fn parses_from_string() {
        let b = BoundingBox::from_string("10, -2, 3, 4").unwrap();
        assert_eq!(b, BoundingBox::new(10, -2, 3, 4).unwrap());
        assert!(BoundingBox::from_string("1,2,3").is_err());
        assert!(BoundingBox::from_string("1,2,-3,4").is_err());
    }

    #[test]
    fn fits_within_frame() {
        let b = BoundingBox::new(0, 200, 500, 1000).unwrap();
        assert!(b.fits_within(500, 1200));
        assert!(!b.fits_within(500, 1199));
        assert!(!BoundingBox::new(-1, 0, 2, 2).unwrap().fits_within(10, 10));
    }
}
