//! Image persistence
//!
//! `ImageStore` is the seam between the assembly code and whatever holds the
//! channel images. `FitsImageStore` keeps images in FITS-style files: the
//! primary HDU holds the image plane and header, further planes follow as
//! `IMAGE` extensions named by `EXTNAME`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, warn};

use crate::errors::{ObsError, ObsResult};
use crate::image::{BandRegistry, Image, Metadata, PixelBuffer, PixelData, Plane, PlaneKind, SampleKind, Wcs};
use crate::utils::logger::Logger;
use super::constants::{is_structural_keyword, keywords, xtension, U16_BZERO, U32_BZERO};
use super::hdu::{self, Hdu, Header};

/// Opens and saves images by path
pub trait ImageStore {
    /// Load the image stored at `path`
    fn read_image(&self, path: &Path) -> ObsResult<Image>;

    /// Save `image` to `path`, replacing any existing file
    fn write_image(&self, path: &Path, image: &Image) -> ObsResult<()>;
}

/// Image store backed by FITS-style files
pub struct FitsImageStore<'a> {
    /// Logger for recording operations
    logger: &'a Logger,
    /// Filter lookup used to resolve FILTER cards
    bands: &'a BandRegistry,
}

impl<'a> FitsImageStore<'a> {
    /// Create a new store
    ///
    /// # Arguments
    /// * `logger` - Logger for recording operations
    /// * `bands` - Filter table used to resolve `FILTER` cards
    pub fn new(logger: &'a Logger, bands: &'a BandRegistry) -> Self {
        FitsImageStore { logger, bands }
    }

    /// Split a header into metadata, WCS cards and filter name
    fn split_header(&self, headers: &[&Header], image: &mut Image) {
        let mut metadata = Metadata::new();
        let mut wcs_cards = Metadata::new();
        let mut filter_name = None;

        for header in headers {
            for card in &header.cards {
                let Some(value) = &card.value else {
                    debug!("Skipping commentary card {}", card.key);
                    continue;
                };
                if is_structural_keyword(&card.key) {
                    continue;
                }
                if card.key == keywords::FILTER {
                    if filter_name.is_none() {
                        filter_name = Some(value.to_string());
                    }
                } else if Wcs::is_wcs_key(&card.key) {
                    if !wcs_cards.exists(&card.key) {
                        wcs_cards.set(&card.key, value.clone());
                    }
                } else if !metadata.exists(&card.key) {
                    metadata.set(&card.key, value.clone());
                }
            }
        }

        image.metadata = metadata;
        image.wcs = if wcs_cards.is_empty() { None } else { Some(Wcs::from_cards(wcs_cards)) };
        image.filter = filter_name.map(|name| self.bands.resolve(&name));
    }
}

impl<'a> ImageStore for FitsImageStore<'a> {
    fn read_image(&self, path: &Path) -> ObsResult<Image> {
        info!("Reading image {}", path.display());
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);
        let hdus = hdu::read_hdus(&mut reader)?;

        let mut planes = Vec::new();
        let mut headers = vec![&hdus[0].header];

        // The image plane is either the primary array or an IMAGE extension
        if !hdus[0].header.axes()?.is_empty() {
            planes.push(Plane::new(PlaneKind::Image, decode_plane(&hdus[0])?));
        }

        for (idx, unit) in hdus.iter().enumerate().skip(1) {
            if unit.xtension() != Some(xtension::IMAGE) {
                debug!("Skipping HDU {} of type {:?}", idx, unit.xtension());
                continue;
            }
            let kind = match unit.extname().and_then(PlaneKind::from_extname) {
                Some(kind) => kind,
                None if planes.is_empty() => PlaneKind::Image,
                None => {
                    warn!("Skipping unnamed image extension {} in {}", idx, path.display());
                    continue;
                }
            };
            if kind == PlaneKind::Image {
                headers.push(&unit.header);
            }
            planes.push(Plane::new(kind, decode_plane(unit)?));
        }

        // Keep the image plane first regardless of file order
        planes.sort_by_key(|p| p.kind != PlaneKind::Image);
        let mut image = Image::from_planes(planes)
            .map_err(|e| ObsError::FormatError(format!("{}: {}", path.display(), e)))?;
        self.split_header(&headers, &mut image);

        self.logger.log(&format!(
            "Read {} ({}x{}, {} plane(s), {} samples)",
            path.display(), image.width(), image.height(), image.planes().len(), image.sample_kind()))?;
        Ok(image)
    }

    fn write_image(&self, path: &Path, image: &Image) -> ObsResult<()> {
        info!("Writing image {}", path.display());
        let mut hdus = Vec::with_capacity(image.planes().len());

        for (idx, plane) in image.planes().iter().enumerate() {
            let mut header = Header::new();
            if idx == 0 {
                header.push(keywords::SIMPLE, true);
            } else {
                header.push(keywords::XTENSION, xtension::IMAGE);
            }
            push_array_cards(&mut header, &plane.pixels);
            if idx == 0 {
                if image.planes().len() > 1 {
                    header.push(keywords::EXTEND, true);
                }
                push_image_cards(&mut header, image);
            } else {
                header.push(keywords::PCOUNT, 0i64);
                header.push(keywords::GCOUNT, 1i64);
                header.push(keywords::EXTNAME, plane.kind.extname());
            }
            hdus.push(Hdu::new(header, encode_samples(&plane.pixels)));
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        hdu::write_hdus(&mut writer, &hdus)?;
        writer.flush()?;

        self.logger.log(&format!("Wrote {} ({}x{})", path.display(), image.width(), image.height()))?;
        Ok(())
    }
}

/// BITPIX, axes and scaling cards for a pixel buffer
fn push_array_cards(header: &mut Header, pixels: &PixelBuffer) {
    let bitpix: i64 = match pixels.kind() {
        SampleKind::F32 => -32,
        SampleKind::U16 => 16,
        SampleKind::U32 => 32,
    };
    header.push(keywords::BITPIX, bitpix);
    header.push(keywords::NAXIS, 2i64);
    header.push(keywords::NAXIS1, i64::from(pixels.width()));
    header.push(keywords::NAXIS2, i64::from(pixels.height()));
    match pixels.kind() {
        SampleKind::U16 => header.push(keywords::BZERO, U16_BZERO),
        SampleKind::U32 => header.push(keywords::BZERO, U32_BZERO),
        SampleKind::F32 => {},
    }
    if pixels.kind().is_integer() {
        header.push(keywords::BSCALE, 1i64);
    }
}

/// Metadata, WCS and filter cards of the primary header
fn push_image_cards(header: &mut Header, image: &Image) {
    let wcs_has = |key: &str| image.wcs.as_ref().is_some_and(|wcs| wcs.cards().exists(key));
    for (key, value) in image.metadata.iter() {
        if is_structural_keyword(key) || (key == keywords::FILTER && image.filter.is_some()) || wcs_has(key) {
            warn!("Not writing reserved keyword {} from metadata", key);
            continue;
        }
        header.push(key, value.clone());
    }
    if let Some(wcs) = &image.wcs {
        for (key, value) in wcs.cards().iter() {
            header.push(key, value.clone());
        }
    }
    if let Some(filter) = &image.filter {
        header.push(keywords::FILTER, filter.name());
    }
}

fn encode_samples(pixels: &PixelBuffer) -> Vec<u8> {
    match pixels.data() {
        PixelData::F32(v) => {
            let mut out = vec![0u8; v.len() * 4];
            BigEndian::write_f32_into(v, &mut out);
            out
        },
        PixelData::U16(v) => {
            let stored: Vec<i16> = v.iter().map(|&s| (i32::from(s) - U16_BZERO as i32) as i16).collect();
            let mut out = vec![0u8; stored.len() * 2];
            BigEndian::write_i16_into(&stored, &mut out);
            out
        },
        PixelData::U32(v) => {
            let stored: Vec<i32> = v.iter().map(|&s| (i64::from(s) - U32_BZERO) as i32).collect();
            let mut out = vec![0u8; stored.len() * 4];
            BigEndian::write_i32_into(&stored, &mut out);
            out
        },
    }
}

/// Decode the data array of an image HDU
fn decode_plane(unit: &Hdu) -> ObsResult<PixelBuffer> {
    let header = &unit.header;
    let axes = header.axes()?;
    if axes.len() != 2 {
        return Err(ObsError::FormatError(format!(
            "Expected a 2-D image, found NAXIS = {}", axes.len())));
    }
    let width = u32::try_from(axes[0])
        .map_err(|_| ObsError::FormatError(format!("Image width {} too large", axes[0])))?;
    let height = u32::try_from(axes[1])
        .map_err(|_| ObsError::FormatError(format!("Image height {} too large", axes[1])))?;

    let bitpix = header.require_int(keywords::BITPIX)?;
    let bzero = header.get_f64(keywords::BZERO).unwrap_or(0.0);
    let bscale = header.get_f64(keywords::BSCALE).unwrap_or(1.0);
    if bscale != 1.0 {
        return Err(ObsError::FormatError(format!("Unsupported BSCALE {}", bscale)));
    }

    let bytes = &unit.data;
    let data = match (bitpix, bzero as i64) {
        (-32, 0) => {
            let mut v = vec![0f32; bytes.len() / 4];
            BigEndian::read_f32_into(bytes, &mut v);
            PixelData::F32(v)
        },
        (16, U16_BZERO) => {
            let mut raw = vec![0i16; bytes.len() / 2];
            BigEndian::read_i16_into(bytes, &mut raw);
            PixelData::U16(raw.into_iter().map(|s| (i32::from(s) + U16_BZERO as i32) as u16).collect())
        },
        (32, U32_BZERO) => {
            let mut raw = vec![0i32; bytes.len() / 4];
            BigEndian::read_i32_into(bytes, &mut raw);
            PixelData::U32(raw.into_iter().map(|s| (i64::from(s) + U32_BZERO) as u32).collect())
        },
        _ => {
            return Err(ObsError::FormatError(format!(
                "Unsupported sample encoding BITPIX = {}, BZERO = {}", bitpix, bzero)));
        }
    };

    PixelBuffer::new(width, height, data)
}
