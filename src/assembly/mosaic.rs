//! Full-detector mosaic assembly
//!
//! The four channel crops are laid out 2x2 on a canvas twice the crop size.
//! Channels in the upper row are stored mirrored in y, so each of their
//! planes is flipped back before pasting. Planes that are entirely zero are
//! pasted unflipped.

use std::path::Path;
use log::{debug, info};

use crate::errors::{ObsError, ObsResult};
use crate::fits::constants::keywords;
use crate::fits::ImageStore;
use crate::geom::Extent;
use crate::image::{Band, Image, Metadata, PixelBuffer, Plane, PlaneKind, SampleKind, Wcs};
use crate::utils::logger::Logger;
use crate::utils::progress::ProgressTracker;
use super::locator::ChannelLocator;
use super::quadrant::{DataKind, Quadrant};
use super::subframe::SubframeExtractor;

/// Assembles channel images into one detector image
pub struct MosaicAssembler<'a> {
    /// Where channel images are read from
    store: &'a dyn ImageStore,
    /// Maps quadrants to channel files
    locator: &'a ChannelLocator<'a>,
    /// Crop applied to every channel
    extractor: SubframeExtractor,
    /// Logger for recording operations
    logger: &'a Logger,
    show_progress: bool,
}

impl<'a> MosaicAssembler<'a> {
    /// Create a new assembler
    ///
    /// # Arguments
    /// * `store` - Image store used to load channels
    /// * `locator` - Channel file locator
    /// * `extractor` - Crop applied to each channel
    /// * `logger` - Logger for recording operations
    pub fn new(
        store: &'a dyn ImageStore,
        locator: &'a ChannelLocator<'a>,
        extractor: SubframeExtractor,
        logger: &'a Logger,
    ) -> Self {
        MosaicAssembler {
            store,
            locator,
            extractor,
            logger,
            show_progress: false,
        }
    }

    /// Draw a progress bar over the quadrants while assembling
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Assemble the channel images found in `dir`
    ///
    /// # Arguments
    /// * `dir` - Directory holding one file per channel
    /// * `kind` - Whether raw or calibration channels are expected
    /// * `defaults` - Header values used only where channel (0, 0) has none
    ///
    /// # Returns
    /// The mosaic, or the first error met. Nothing is returned for a
    /// partially assembled detector.
    pub fn assemble(&self, dir: &Path, kind: DataKind, defaults: &Metadata) -> ObsResult<Image> {
        info!("Assembling {} channels from {}", kind, dir.display());
        let mosaic = self.build(defaults, |quadrant| {
            let channel = self.load_channel(dir, quadrant, kind)?;
            self.extractor.extract(&channel, quadrant)
        })?;

        self.logger.log(&format!(
            "Assembled {} mosaic {}x{} from {}",
            kind, mosaic.width(), mosaic.height(), dir.display()))?;
        Ok(mosaic)
    }

    /// Assemble channel images that are already in memory
    ///
    /// Every quadrant must be present exactly once.
    pub fn assemble_channels(&self, channels: &[(Quadrant, Image); 4], defaults: &Metadata) -> ObsResult<Image> {
        for quadrant in Quadrant::ALL {
            let count = channels.iter().filter(|(q, _)| *q == quadrant).count();
            if count > 1 {
                return Err(ObsError::GenericError(format!(
                    "channel {} supplied {} times", quadrant, count)));
            }
        }

        self.build(defaults, |quadrant| {
            let (_, channel) = channels.iter()
                .find(|(q, _)| *q == quadrant)
                .ok_or_else(|| ObsError::NotFound(format!("channel {} was not supplied", quadrant)))?;
            self.extractor.extract(channel, quadrant)
        })
    }

    /// Locate and read one channel, checking its sample type
    fn load_channel(&self, dir: &Path, quadrant: Quadrant, kind: DataKind) -> ObsResult<Image> {
        let path = self.locator.locate(dir, quadrant, kind)?;
        info!("Loading {} as {} data", path.display(), kind.sample_description());
        let channel = self.store.read_image(&path)?;

        if !kind.accepts(channel.sample_kind()) {
            return Err(ObsError::WrongKind {
                path,
                expected: kind,
                found: DataKind::of_samples(channel.sample_kind()),
            });
        }
        Ok(channel)
    }

    /// Place the crops produced by `crop_for` in quadrant order
    fn build<F>(&self, defaults: &Metadata, mut crop_for: F) -> ObsResult<Image>
    where
        F: FnMut(Quadrant) -> ObsResult<Image>,
    {
        let progress = if self.show_progress {
            ProgressTracker::new(Quadrant::ALL.len() as u64, "Assembling channels")
        } else {
            ProgressTracker::hidden()
        };

        let reference = crop_for(Quadrant::REFERENCE)?;
        let mut canvas = Canvas::start(&reference, defaults);
        for quadrant in Quadrant::ALL {
            progress.begin_step(&quadrant.channel_tag());
            if quadrant == Quadrant::REFERENCE {
                canvas.place(quadrant, &reference)?;
            } else {
                let crop = crop_for(quadrant)?;
                canvas.place(quadrant, &crop)?;
            }
            progress.complete_step();
        }
        progress.finish();

        canvas.finish()
    }
}

/// Mosaic under construction
struct Canvas {
    sub: Extent,
    layout: Vec<(PlaneKind, SampleKind)>,
    planes: Vec<Plane>,
    metadata: Metadata,
    wcs: Option<Wcs>,
    filter: Option<Band>,
}

impl Canvas {
    /// Zeroed canvas shaped after the reference crop, carrying its header
    fn start(reference: &Image, defaults: &Metadata) -> Self {
        let sub = Extent::new(reference.width(), reference.height());
        let size = sub * 2;
        let layout = reference.layout();
        let planes = layout.iter()
            .map(|&(kind, sample)| Plane::new(kind, PixelBuffer::zeros(sample, size.width, size.height)))
            .collect();

        Canvas {
            sub,
            layout,
            planes,
            metadata: merge_defaults(reference, defaults),
            wcs: reference.wcs.clone(),
            filter: reference.filter.clone(),
        }
    }

    fn place(&mut self, quadrant: Quadrant, crop: &Image) -> ObsResult<()> {
        if (crop.width(), crop.height()) != (self.sub.width, self.sub.height) {
            return Err(ObsError::DimensionMismatch(format!(
                "channel {} crops to {}x{}, channel {} to {}x{}",
                quadrant, crop.width(), crop.height(),
                Quadrant::REFERENCE, self.sub.width, self.sub.height)));
        }
        if crop.layout() != self.layout {
            return Err(ObsError::DimensionMismatch(format!(
                "channel {} has planes {:?}, channel {} has {:?}",
                quadrant, crop.layout(), Quadrant::REFERENCE, self.layout)));
        }

        let (x0, y0) = quadrant.canvas_offset(self.sub);
        for (target, source) in self.planes.iter_mut().zip(crop.planes()) {
            if quadrant.is_flipped() && !source.pixels.is_all_zero() {
                debug!("Flipping {} plane of channel {}", source.kind, quadrant);
                target.pixels.paste(&source.pixels.flipped_vertically(), x0, y0)?;
            } else {
                target.pixels.paste(&source.pixels, x0, y0)?;
            }
        }
        Ok(())
    }

    fn finish(self) -> ObsResult<Image> {
        let mut mosaic = Image::from_planes(self.planes)?;
        mosaic.metadata = self.metadata;
        mosaic.wcs = self.wcs;
        mosaic.filter = self.filter;
        Ok(mosaic)
    }
}

/// Reference metadata with `defaults` added for keys it does not provide
///
/// Keys carried by the reference's WCS or filter count as provided.
fn merge_defaults(reference: &Image, defaults: &Metadata) -> Metadata {
    let provided = |key: &str| {
        (key == keywords::FILTER && reference.filter.is_some())
            || reference.wcs.as_ref().is_some_and(|wcs| wcs.cards().exists(key))
    };

    let applicable: Metadata = defaults.iter()
        .filter(|(key, _)| !provided(key))
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();

    let mut metadata = reference.metadata.clone();
    for key in metadata.merge_missing(&applicable) {
        debug!("Using default value for {}", key);
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelData;

    /// Channel whose samples encode their quadrant, row and column
    fn channel(quadrant: Quadrant, width: u32, height: u32) -> Image {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let value = 1000 * u32::from(quadrant.x()) + 100 * u32::from(quadrant.y()) + 10 * y + x + 1;
                data.push(value as f32);
            }
        }
        Image::from_pixels(PixelBuffer::new(width, height, PixelData::F32(data)).unwrap())
    }

    fn channels(width: u32, height: u32) -> [(Quadrant, Image); 4] {
        Quadrant::ALL.map(|q| (q, channel(q, width, height)))
    }

    fn with_assembler<R>(sub_height: u32, f: impl FnOnce(&MosaicAssembler) -> R) -> R {
        let logger = Logger::disabled();
        let bands = crate::image::BandRegistry::with_defaults();
        let store = crate::fits::FitsImageStore::new(&logger, &bands);
        let locator = ChannelLocator::new(Default::default(), &logger).unwrap();
        let assembler = MosaicAssembler::new(&store, &locator, SubframeExtractor::new(sub_height), &logger);
        f(&assembler)
    }

    #[test]
    fn places_and_flips_quadrants() {
        let mosaic = with_assembler(2, |a| a.assemble_channels(&channels(2, 3), &Metadata::new())).unwrap();
        assert_eq!((mosaic.width(), mosaic.height()), (4, 4));
        let px = |x, y| mosaic.primary().get_f64(x, y).unwrap();

        // Lower row: crop row 0 is channel row 1
        assert_eq!(px(0, 0), 11.0);
        assert_eq!(px(1, 1), 22.0);
        assert_eq!(px(2, 0), 1011.0);
        // Upper row is flipped: canvas row 2 holds channel row 2
        assert_eq!(px(0, 2), 121.0);
        assert_eq!(px(0, 3), 111.0);
        assert_eq!(px(3, 2), 1122.0);
    }

    #[test]
    fn zero_planes_are_not_flipped() {
        let mut input = channels(2, 2);
        for (quadrant, image) in input.iter_mut() {
            let pixels = image.primary().clone();
            let mut mask = vec![0u32; 4];
            if *quadrant == Quadrant::new(1, 1).unwrap() {
                mask[0] = 1;
            }
            *image = Image::from_planes(vec![
                Plane::new(PlaneKind::Image, pixels),
                Plane::new(PlaneKind::Mask, PixelBuffer::new(2, 2, PixelData::U32(mask)).unwrap()),
            ]).unwrap();
        }

        let mosaic = with_assembler(2, |a| a.assemble_channels(&input, &Metadata::new())).unwrap();
        let mask = mosaic.plane(PlaneKind::Mask).unwrap();
        // The set bit at channel (0, 0) of quadrant (1, 1) moves to its top row
        assert_eq!(mask.get_u32(2, 3), Some(1));
        assert_eq!(mask.get_u32(2, 2), Some(0));
        // Image plane of the same channel is flipped as well
        assert_eq!(mosaic.primary().get_f64(2, 3), Some(1101.0));
    }

    #[test]
    fn existing_header_values_win() {
        let mut input = channels(2, 2);
        input[0].1.metadata.set("OBSTYPE", "bias");
        let mut wcs = Metadata::new();
        wcs.set("CRPIX1", 1.0);
        input[0].1.wcs = Some(Wcs::from_cards(wcs));
        input[0].1.filter = Some(Band::new("r"));
        // Headers of other channels are ignored
        input[3].1.metadata.set("DETNAME", "other");

        let mut defaults = Metadata::new();
        defaults.set("OBSTYPE", "flat");
        defaults.set("FILTER", "g");
        defaults.set("CRPIX1", 5.0);
        defaults.set("EXPTIME", 30.0);

        let mosaic = with_assembler(2, |a| a.assemble_channels(&input, &defaults)).unwrap();
        assert_eq!(mosaic.metadata.get_str("OBSTYPE"), Some("bias"));
        assert_eq!(mosaic.metadata.get("EXPTIME").and_then(|v| v.as_f64()), Some(30.0));
        assert!(!mosaic.metadata.exists("FILTER"));
        assert!(!mosaic.metadata.exists("CRPIX1"));
        assert!(!mosaic.metadata.exists("DETNAME"));
        assert_eq!(mosaic.filter, Some(Band::new("r")));
    }

    #[test]
    fn mismatched_widths_fail() {
        let mut input = channels(2, 3);
        input[2].1 = channel(input[2].0, 3, 3);
        let result = with_assembler(2, |a| a.assemble_channels(&input, &Metadata::new()));
        assert!(matches!(result, Err(ObsError::DimensionMismatch(_))));
    }

    #[test]
    fn duplicate_quadrant_fails() {
        let mut input = channels(2, 2);
        input[3].0 = Quadrant::REFERENCE;
        let result = with_assembler(2, |a| a.assemble_channels(&input, &Metadata::new()));
        assert!(matches!(result, Err(ObsError::GenericError(_))));
    }

    #[test]
    fn short_channel_fails() {
        let result = with_assembler(4, |a| a.assemble_channels(&channels(2, 3), &Metadata::new()));
        assert!(matches!(result, Err(ObsError::FrameTooSmall { .. })));
    }
}
