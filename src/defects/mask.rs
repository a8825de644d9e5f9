//! Boolean defect masks

use std::collections::HashMap;
use lazy_static::lazy_static;

use crate::errors::{ObsError, ObsResult};
use crate::geom::BoundingBox;
use crate::image::{Metadata, PixelBuffer};

lazy_static! {
    /// Standard bit assignments of mask planes
    static ref MASK_PLANE_BITS: HashMap<&'static str, u32> = {
        let mut m = HashMap::new();
        m.insert("BAD", 0);
        m.insert("SAT", 1);
        m.insert("INTRP", 2);
        m.insert("CR", 3);
        m.insert("EDGE", 4);
        m.insert("DETECTED", 5);
        m.insert("DETECTED_NEGATIVE", 6);
        m.insert("SUSPECT", 7);
        m.insert("NO_DATA", 8);
        m
    };
}

/// Bit number of the mask plane `name`
///
/// An `MP_<NAME>` header card overrides the standard assignment.
pub fn mask_plane_bit(metadata: &Metadata, name: &str) -> ObsResult<u32> {
    let name = name.to_uppercase();
    let card = format!("MP_{}", name);
    if let Some(value) = metadata.get(&card) {
        return value.as_i64()
            .and_then(|bit| u32::try_from(bit).ok())
            .filter(|&bit| bit < 32)
            .ok_or_else(|| ObsError::FormatError(format!("{} = {} is not a mask bit", card, value)));
    }
    MASK_PLANE_BITS.get(name.as_str())
        .copied()
        .ok_or_else(|| ObsError::NotFound(format!("mask plane {} is not defined", name)))
}

/// Row-major grid of defect flags, row 0 at the bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl BoolMask {
    pub fn new(width: u32, height: u32, cells: Vec<bool>) -> ObsResult<Self> {
        if cells.len() != width as usize * height as usize {
            return Err(ObsError::FormatError(format!(
                "Mask of {}x{} needs {} cells, got {}", width, height,
                width as usize * height as usize, cells.len())));
        }
        Ok(BoolMask { width, height, cells })
    }

    /// Mask with no defects
    pub fn empty(width: u32, height: u32) -> Self {
        BoolMask {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
        }
    }

    /// Flag pixels of an integer mask plane that have `bit` set
    pub fn from_mask_plane(plane: &PixelBuffer, bit: u32) -> ObsResult<Self> {
        if !plane.kind().is_integer() {
            return Err(ObsError::FormatError(format!(
                "Mask plane holds {} samples, expected integers", plane.kind())));
        }
        if bit >= 32 {
            return Err(ObsError::FormatError(format!("Mask bit {} out of range", bit)));
        }

        let flag = 1u32 << bit;
        let (width, height) = plane.dimensions();
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(plane.get_u32(x, y).is_some_and(|v| v & flag != 0));
            }
        }
        BoolMask::new(width, height, cells)
    }

    /// Mask with the pixels of `boxes` set
    pub fn from_boxes(width: u32, height: u32, boxes: &[BoundingBox]) -> ObsResult<Self> {
        let mut mask = BoolMask::empty(width, height);
        for bbox in boxes {
            if !bbox.fits_within(width, height) {
                return Err(ObsError::FormatError(format!(
                    "Defect {} lies outside a {}x{} detector", bbox, width, height)));
            }
            for y in bbox.y0..bbox.y0 + bbox.height as i32 {
                let row = y as usize * width as usize;
                for x in bbox.x0..bbox.x0 + bbox.width as i32 {
                    mask.cells[row + x as usize] = true;
                }
            }
        }
        Ok(mask)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.cells[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.cells[y as usize * self.width as usize + x as usize] = value;
        }
    }

    /// Flags of row `y`
    pub fn row(&self, y: u32) -> &[bool] {
        let start = y as usize * self.width as usize;
        &self.cells[start..start + self.width as usize]
    }

    /// Number of flagged pixels
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelData;

    #[test]
    fn standard_and_overridden_bits() {
        let mut metadata = Metadata::new();
        assert_eq!(mask_plane_bit(&metadata, "BAD").unwrap(), 0);
        assert_eq!(mask_plane_bit(&metadata, "sat").unwrap(), 1);
        assert!(matches!(mask_plane_bit(&metadata, "UNDEFINED"), Err(ObsError::NotFound(_))));

        metadata.set("MP_BAD", 6i64);
        assert_eq!(mask_plane_bit(&metadata, "BAD").unwrap(), 6);
        metadata.set("MP_SAT", 40i64);
        assert!(mask_plane_bit(&metadata, "SAT").is_err());
    }

    #[test]
    fn selects_bit_from_plane() {
        let plane = PixelBuffer::new(3, 1, PixelData::U32(vec![0b01, 0b10, 0b11])).unwrap();
        let bad = BoolMask::from_mask_plane(&plane, 0).unwrap();
        assert_eq!(bad.row(0), &[true, false, true]);
        let sat = BoolMask::from_mask_plane(&plane, 1).unwrap();
        assert_eq!(sat.row(0), &[false, true, true]);
    }

    #[test]
    fn float_plane_is_rejected() {
        let plane = PixelBuffer::new(1, 1, PixelData::F32(vec![1.0])).unwrap();
        assert!(BoolMask::from_mask_plane(&plane, 0).is_err());
    }

    #[test]
    fn paints_boxes() {
        let boxes = [BoundingBox::new(1, 0, 2, 2).unwrap()];
        let mask = BoolMask::from_boxes(4, 3, &boxes).unwrap();
        assert_eq!(mask.count(), 4);
        assert!(mask.get(2, 1));
        assert!(!mask.get(0, 0));
        assert!(!mask.get(1, 2));

        let outside = [BoundingBox::new(3, 0, 2, 1).unwrap()];
        assert!(BoolMask::from_boxes(4, 3, &outside).is_err());
    }
}
