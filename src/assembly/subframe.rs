//! Fixed-height crops of channel images

use log::debug;

use crate::errors::{ObsError, ObsResult};
use crate::geom::BoundingBox;
use crate::image::{Image, Plane};
use super::quadrant::Quadrant;

/// Default number of rows kept from each channel
pub const DEFAULT_SUB_HEIGHT: u32 = 1000;

/// Crops the top `sub_height` rows (rows `H - S .. H`) of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubframeExtractor {
    sub_height: u32,
}

impl SubframeExtractor {
    pub fn new(sub_height: u32) -> Self {
        SubframeExtractor { sub_height }
    }

    pub fn sub_height(&self) -> u32 {
        self.sub_height
    }

    /// Box covering the rows kept from a `width` x `height` channel
    ///
    /// Fails with `FrameTooSmall` when the channel has fewer than
    /// `sub_height` rows.
    pub fn subframe_box(&self, width: u32, height: u32, quadrant: Quadrant) -> ObsResult<BoundingBox> {
        let y_start = i64::from(height) - i64::from(self.sub_height);
        if y_start < 0 {
            return Err(ObsError::FrameTooSmall {
                quadrant,
                height,
                sub_height: self.sub_height,
            });
        }
        let y_start = i32::try_from(y_start)
            .map_err(|_| ObsError::FormatError(format!("Row offset {} out of range", y_start)))?;
        BoundingBox::new(0, y_start, width, self.sub_height)
    }

    /// Crop every plane of `image`, keeping its header
    pub fn extract(&self, image: &Image, quadrant: Quadrant) -> ObsResult<Image> {
        let bbox = self.subframe_box(image.width(), image.height(), quadrant)?;
        debug!("Channel {}: keeping {} of {}x{}", quadrant, bbox, image.width(), image.height());

        let planes = image.planes().iter()
            .map(|plane| Ok(Plane::new(plane.kind, plane.pixels.subview(&bbox)?)))
            .collect::<ObsResult<Vec<_>>>()?;

        let mut crop = Image::from_planes(planes)?;
        crop.metadata = image.metadata.clone();
        crop.wcs = image.wcs.clone();
        crop.filter = image.filter.clone();
        Ok(crop)
    }
}

impl Default for SubframeExtractor {
    fn default() -> Self {
        SubframeExtractor::new(DEFAULT_SUB_HEIGHT)
    }
}
