//! Mask to rectangle conversion
//!
//! Each row is run-length encoded. A run continues the box opened on the
//! previous row when it spans exactly the same columns; any other run opens
//! a new box. Boxes come out in the order they were opened, so the result is
//! fixed for a given mask, covers exactly the flagged pixels and never
//! overlaps.

use log::{debug, info};

use crate::errors::{ObsError, ObsResult};
use crate::geom::BoundingBox;
use crate::image::{Image, PlaneKind};
use super::defect_map::{DefectHeader, DefectMap};
use super::mask::{mask_plane_bit, BoolMask};

/// Box under construction: columns `[x0, x1)`, rows from `y0`
#[derive(Debug, Clone, Copy)]
struct Region {
    x0: u32,
    x1: u32,
    y0: u32,
    rows: u32,
}

/// Converts defect masks into ordered box lists
pub struct DefectRegionExtractor;

impl DefectRegionExtractor {
    /// Boxes covering the flagged pixels of `mask`
    pub fn extract(mask: &BoolMask) -> ObsResult<Vec<BoundingBox>> {
        let mut regions: Vec<Region> = Vec::new();
        // Indices of regions reaching the previous row, ordered by x0
        let mut open: Vec<usize> = Vec::new();

        for y in 0..mask.height() {
            let mut still_open = Vec::new();
            let mut candidates = open.iter().peekable();

            for (x0, x1) in row_runs(mask.row(y)) {
                while candidates.peek().is_some_and(|&&idx| regions[idx].x0 < x0) {
                    candidates.next();
                }
                match candidates.peek() {
                    Some(&&idx) if regions[idx].x0 == x0 && regions[idx].x1 == x1 => {
                        regions[idx].rows += 1;
                        still_open.push(idx);
                        candidates.next();
                    },
                    _ => {
                        regions.push(Region { x0, x1, y0: y, rows: 1 });
                        still_open.push(regions.len() - 1);
                    }
                }
            }
            open = still_open;
        }

        debug!("Extracted {} region(s) from {}x{} mask", regions.len(), mask.width(), mask.height());
        regions.iter().map(to_box).collect()
    }
}

/// Runs of set cells as `[x0, x1)`
fn row_runs(row: &[bool]) -> Vec<(u32, u32)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (x, &flag) in row.iter().enumerate() {
        match (flag, start) {
            (true, None) => start = Some(x as u32),
            (false, Some(x0)) => {
                runs.push((x0, x as u32));
                start = None;
            },
            _ => {}
        }
    }
    if let Some(x0) = start {
        runs.push((x0, row.len() as u32));
    }
    runs
}

fn to_box(region: &Region) -> ObsResult<BoundingBox> {
    let x0 = i32::try_from(region.x0)
        .map_err(|_| ObsError::FormatError(format!("Column {} out of range", region.x0)))?;
    let y0 = i32::try_from(region.y0)
        .map_err(|_| ObsError::FormatError(format!("Row {} out of range", region.y0)))?;
    BoundingBox::new(x0, y0, region.x1 - region.x0, region.rows)
}

/// Defect map of the pixels flagged in a mask plane of `image`
///
/// # Arguments
/// * `image` - Exposure carrying a mask plane
/// * `plane_name` - Name of the mask bit to use, e.g. `BAD`
/// * `header` - Header of the resulting map
pub fn defects_from_image(image: &Image, plane_name: &str, header: DefectHeader) -> ObsResult<DefectMap> {
    let plane = image.plane(PlaneKind::Mask)
        .ok_or_else(|| ObsError::NotFound("image has no mask plane".to_string()))?;
    let bit = mask_plane_bit(&image.metadata, plane_name)?;
    let mask = BoolMask::from_mask_plane(plane, bit)?;

    let boxes = DefectRegionExtractor::extract(&mask)?;
    info!("Found {} defect(s) in mask plane {} (bit {}, {} pixels)",
          boxes.len(), plane_name, bit, mask.count());
    Ok(DefectMap::new(header, boxes))
}
