//! Typed pixel buffers
//!
//! A `PixelBuffer` is a row-major 2-D array of samples of one fixed type.
//! Row 0 is the lowest row of the detector (bottom-left origin). Sub-views are
//! bounds-checked copies, so no aliasing between buffers is possible.

use std::fmt;

use crate::errors::{ObsError, ObsResult};
use crate::geom::BoundingBox;

/// Sample type of a pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// 32-bit float samples (calibration products)
    F32,
    /// 16-bit unsigned samples (raw readouts)
    U16,
    /// 32-bit unsigned samples (raw readouts, mask planes)
    U32,
}

impl SampleKind {
    /// Whether samples are unsigned integers
    pub fn is_integer(&self) -> bool {
        !matches!(self, SampleKind::F32)
    }

    /// Short name of the sample type
    pub fn name(&self) -> &'static str {
        match self {
            SampleKind::F32 => "f32",
            SampleKind::U16 => "u16",
            SampleKind::U32 => "u32",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sample storage of a buffer
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    F32(Vec<f32>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

// Apply the same generic expression to whichever sample vector is present
macro_rules! map_samples {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            PixelData::F32($v) => PixelData::F32($body),
            PixelData::U16($v) => PixelData::U16($body),
            PixelData::U32($v) => PixelData::U32($body),
        }
    };
}

impl PixelData {
    /// Sample type of this storage
    pub fn kind(&self) -> SampleKind {
        match self {
            PixelData::F32(_) => SampleKind::F32,
            PixelData::U16(_) => SampleKind::U16,
            PixelData::U32(_) => SampleKind::U32,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            PixelData::F32(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn zeros(kind: SampleKind, len: usize) -> Self {
        match kind {
            SampleKind::F32 => PixelData::F32(vec![0.0; len]),
            SampleKind::U16 => PixelData::U16(vec![0; len]),
            SampleKind::U32 => PixelData::U32(vec![0; len]),
        }
    }
}

/// A 2-D array of samples with an explicit row-major layout
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: PixelData,
}

impl PixelBuffer {
    /// Wrap sample data, checking `len == width * height`
    pub fn new(width: u32, height: u32, data: PixelData) -> ObsResult<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(ObsError::FormatError(format!(
                "Pixel buffer of {}x{} needs {} samples, got {}",
                width, height, expected, data.len())));
        }
        Ok(PixelBuffer { width, height, data })
    }

    /// A zero-filled buffer
    pub fn zeros(kind: SampleKind, width: u32, height: u32) -> Self {
        PixelBuffer {
            width,
            height,
            data: PixelData::zeros(kind, width as usize * height as usize),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn kind(&self) -> SampleKind {
        self.data.kind()
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    pub fn into_data(self) -> PixelData {
        self.data
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Sample at (x, y) widened to f64, or None if out of bounds
    pub fn get_f64(&self, x: u32, y: u32) -> Option<f64> {
        let idx = self.index(x, y)?;
        Some(match &self.data {
            PixelData::F32(v) => f64::from(v[idx]),
            PixelData::U16(v) => f64::from(v[idx]),
            PixelData::U32(v) => f64::from(v[idx]),
        })
    }

    /// Integer sample at (x, y); None for float buffers or out of bounds
    pub fn get_u32(&self, x: u32, y: u32) -> Option<u32> {
        let idx = self.index(x, y)?;
        match &self.data {
            PixelData::F32(_) => None,
            PixelData::U16(v) => Some(u32::from(v[idx])),
            PixelData::U32(v) => Some(v[idx]),
        }
    }

    /// True when every sample equals zero
    ///
    /// NaN samples count as non-zero.
    pub fn is_all_zero(&self) -> bool {
        match &self.data {
            PixelData::F32(v) => v.iter().all(|&s| s == 0.0),
            PixelData::U16(v) => v.iter().all(|&s| s == 0),
            PixelData::U32(v) => v.iter().all(|&s| s == 0),
        }
    }

    /// Copy out the pixels inside `bbox`
    ///
    /// # Returns
    /// A new buffer of the box's extent, or a `FormatError` when the box
    /// reaches outside this buffer
    pub fn subview(&self, bbox: &BoundingBox) -> ObsResult<PixelBuffer> {
        if !bbox.fits_within(self.width, self.height) {
            return Err(ObsError::FormatError(format!(
                "Box {} lies outside a {}x{} buffer", bbox, self.width, self.height)));
        }

        let stride = self.width as usize;
        let data = map_samples!(&self.data, v => crop_rows(v, stride, bbox));
        Ok(PixelBuffer { width: bbox.width, height: bbox.height, data })
    }

    /// A copy with the row order reversed (flip about the x axis)
    pub fn flipped_vertically(&self) -> PixelBuffer {
        let width = self.width as usize;
        let data = map_samples!(&self.data, v => flip_rows(v, width));
        PixelBuffer { width: self.width, height: self.height, data }
    }

    /// Copy `src` into this buffer with its lower-left corner at (x0, y0)
    ///
    /// Fails with `DimensionMismatch` when the sample types differ or `src`
    /// would overflow this buffer.
    pub fn paste(&mut self, src: &PixelBuffer, x0: u32, y0: u32) -> ObsResult<()> {
        if u64::from(x0) + u64::from(src.width) > u64::from(self.width)
            || u64::from(y0) + u64::from(src.height) > u64::from(self.height) {
            return Err(ObsError::DimensionMismatch(format!(
                "{}x{} block at ({}, {}) overflows a {}x{} canvas",
                src.width, src.height, x0, y0, self.width, self.height)));
        }

        let dst_width = self.width as usize;
        let src_width = src.width as usize;
        let (x0, y0) = (x0 as usize, y0 as usize);
        match (&mut self.data, &src.data) {
            (PixelData::F32(d), PixelData::F32(s)) => paste_rows(d, dst_width, s, src_width, x0, y0),
            (PixelData::U16(d), PixelData::U16(s)) => paste_rows(d, dst_width, s, src_width, x0, y0),
            (PixelData::U32(d), PixelData::U32(s)) => paste_rows(d, dst_width, s, src_width, x0, y0),
            (d, s) => {
                return Err(ObsError::DimensionMismatch(format!(
                    "Cannot paste {} samples into a {} canvas", s.kind(), d.kind())));
            }
        }
        Ok(())
    }
}

fn crop_rows<T: Copy>(data: &[T], stride: usize, bbox: &BoundingBox) -> Vec<T> {
    let x0 = bbox.x0 as usize;
    let width = bbox.width as usize;
    let mut out = Vec::with_capacity(width * bbox.height as usize);
    for y in bbox.y0 as usize..bbox.end_y() as usize {
        let start = y * stride + x0;
        out.extend_from_slice(&data[start..start + width]);
    }
    out
}

fn flip_rows<T: Copy>(data: &[T], width: usize) -> Vec<T> {
    if width == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks_exact(width).rev() {
        out.extend_from_slice(row);
    }
    out
}

fn paste_rows<T: Copy>(dst: &mut [T], dst_width: usize, src: &[T], src_width: usize,
                       x0: usize, y0: usize) {
    if src_width == 0 {
        return;
    }
    for (row_idx, row) in src.chunks_exact(src_width).enumerate() {
        let start = (y0 + row_idx) * dst_width + x0;
        dst[start..start + src_width].copy_from_slice(row);
    }
}
