//! Multi-plane images with header, world coordinates and filter
//!
//! An `Image` holds one or more pixel planes of identical size. The first plane
//! is always the science ("image") plane; calibration exposures may add a
//! mask and a variance plane.

use std::fmt;

use crate::errors::{ObsError, ObsResult};
use super::band::Band;
use super::metadata::Metadata;
use super::pixel_buffer::{PixelBuffer, SampleKind};

/// Role of a pixel plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneKind {
    Image,
    Mask,
    Variance,
}

impl PlaneKind {
    /// Extension name used when the plane is persisted
    pub fn extname(&self) -> &'static str {
        match self {
            PlaneKind::Image => "IMAGE",
            PlaneKind::Mask => "MASK",
            PlaneKind::Variance => "VARIANCE",
        }
    }

    /// Inverse of `extname`
    pub fn from_extname(name: &str) -> Option<PlaneKind> {
        match name.trim().to_uppercase().as_str() {
            "IMAGE" => Some(PlaneKind::Image),
            "MASK" => Some(PlaneKind::Mask),
            "VARIANCE" => Some(PlaneKind::Variance),
            _ => None,
        }
    }
}

impl fmt::Display for PlaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extname())
    }
}

/// One named pixel plane
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub kind: PlaneKind,
    pub pixels: PixelBuffer,
}

impl Plane {
    pub fn new(kind: PlaneKind, pixels: PixelBuffer) -> Self {
        Plane { kind, pixels }
    }
}

/// Opaque world coordinate system, kept as its original header cards
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Wcs {
    cards: Metadata,
}

impl Wcs {
    const EXACT_KEYS: [&'static str; 6] = ["RADESYS", "RADECSYS", "EQUINOX", "LONPOLE", "LATPOLE", "WCSAXES"];
    const PREFIXES: [&'static str; 6] = ["CTYPE", "CRPIX", "CRVAL", "CUNIT", "CDELT", "CROTA"];

    pub fn from_cards(cards: Metadata) -> Self {
        Wcs { cards }
    }

    pub fn cards(&self) -> &Metadata {
        &self.cards
    }

    /// Whether a header keyword belongs to the world coordinate description
    pub fn is_wcs_key(key: &str) -> bool {
        if Self::EXACT_KEYS.contains(&key) {
            return true;
        }
        if Self::PREFIXES.iter().any(|p| key.strip_prefix(p)
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))) {
            return true;
        }
        // CDi_j and PCi_j matrix elements
        ["CD", "PC"].iter().any(|p| key.strip_prefix(p).is_some_and(|rest| {
            let mut parts = rest.split('_');
            matches!((parts.next(), parts.next(), parts.next()), (Some(i), Some(j), None)
                if !i.is_empty() && !j.is_empty()
                    && i.chars().all(|c| c.is_ascii_digit())
                    && j.chars().all(|c| c.is_ascii_digit()))
        }))
    }
}

/// A detector image: pixel planes plus header
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    planes: Vec<Plane>,
    pub metadata: Metadata,
    pub wcs: Option<Wcs>,
    pub filter: Option<Band>,
}

impl Image {
    /// A single-plane image with an empty header
    pub fn from_pixels(pixels: PixelBuffer) -> Self {
        Image {
            planes: vec![Plane::new(PlaneKind::Image, pixels)],
            metadata: Metadata::new(),
            wcs: None,
            filter: None,
        }
    }

    /// Build an image from planes
    ///
    /// The first plane must be the image plane, kinds must be unique and
    /// every plane must have the same dimensions.
    pub fn from_planes(planes: Vec<Plane>) -> ObsResult<Self> {
        let first = planes.first()
            .ok_or_else(|| ObsError::FormatError("Image has no pixel planes".to_string()))?;
        if first.kind != PlaneKind::Image {
            return Err(ObsError::FormatError(format!(
                "First plane must be IMAGE, found {}", first.kind)));
        }

        let dims = first.pixels.dimensions();
        for (idx, plane) in planes.iter().enumerate() {
            if plane.pixels.dimensions() != dims {
                return Err(ObsError::DimensionMismatch(format!(
                    "{} plane is {}x{}, image plane is {}x{}",
                    plane.kind, plane.pixels.width(), plane.pixels.height(), dims.0, dims.1)));
            }
            if planes[..idx].iter().any(|p| p.kind == plane.kind) {
                return Err(ObsError::FormatError(format!("Duplicate {} plane", plane.kind)));
            }
        }

        Ok(Image {
            planes,
            metadata: Metadata::new(),
            wcs: None,
            filter: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.planes[0].pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.planes[0].pixels.height()
    }

    /// The science plane
    pub fn primary(&self) -> &PixelBuffer {
        &self.planes[0].pixels
    }

    /// Sample type of the science plane
    pub fn sample_kind(&self) -> SampleKind {
        self.primary().kind()
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn plane(&self, kind: PlaneKind) -> Option<&PixelBuffer> {
        self.planes.iter()
            .find(|p| p.kind == kind)
            .map(|p| &p.pixels)
    }

    /// Plane kinds in storage order
    pub fn layout(&self) -> Vec<(PlaneKind, SampleKind)> {
        self.planes.iter()
            .map(|p| (p.kind, p.pixels.kind()))
            .collect()
    }
}
