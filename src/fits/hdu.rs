//! Header/data units
//!
//! A file is a sequence of HDUs. Each HDU is a header of 80-byte cards ending
//! in `END`, padded with blanks to a 2880-byte block, followed by a data
//! section padded with zero bytes to a block boundary.

use std::io::{self, Read, Write};
use log::debug;

use crate::errors::{ObsError, ObsResult};
use crate::image::MetaValue;
use super::card::Card;
use super::constants::{keywords, BLOCK_SIZE, CARD_SIZE};

/// Parsed header of one HDU
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a keyword/value card
    pub fn push(&mut self, key: &str, value: impl Into<MetaValue>) {
        self.cards.push(Card::new(key, value));
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.cards.iter()
            .find(|c| c.key == key)
            .and_then(|c| c.value.as_ref())
    }

    /// Number of cards carrying `key`
    pub fn count(&self, key: &str) -> usize {
        self.cards.iter().filter(|c| c.key == key).count()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Integer value that must be present
    pub fn require_int(&self, key: &str) -> ObsResult<i64> {
        self.get_int(key)
            .ok_or_else(|| ObsError::FormatError(format!("Missing integer keyword {}", key)))
    }

    /// String value that must be present
    pub fn require_str(&self, key: &str) -> ObsResult<&str> {
        self.get_str(key)
            .ok_or_else(|| ObsError::FormatError(format!("Missing string keyword {}", key)))
    }

    /// Axis lengths NAXIS1..NAXISn
    pub fn axes(&self) -> ObsResult<Vec<usize>> {
        let naxis = self.require_int(keywords::NAXIS)?;
        if !(0..=999).contains(&naxis) {
            return Err(ObsError::FormatError(format!("Invalid NAXIS {}", naxis)));
        }
        (1..=naxis)
            .map(|n| {
                let key = format!("{}{}", keywords::NAXIS, n);
                let len = self.require_int(&key)?;
                usize::try_from(len)
                    .map_err(|_| ObsError::FormatError(format!("Invalid {} {}", key, len)))
            })
            .collect()
    }

    /// Size of the data section in bytes, before padding
    pub fn data_len(&self) -> ObsResult<usize> {
        let bitpix = self.require_int(keywords::BITPIX)?;
        let bytes_per_value = match bitpix {
            8 | 16 | 32 | 64 | -32 | -64 => (bitpix.unsigned_abs() / 8) as usize,
            _ => return Err(ObsError::FormatError(format!("Invalid BITPIX {}", bitpix))),
        };

        let axes = self.axes()?;
        if axes.is_empty() {
            return Ok(0);
        }
        let pcount = self.get_int(keywords::PCOUNT).unwrap_or(0);
        let gcount = self.get_int(keywords::GCOUNT).unwrap_or(1);
        if pcount < 0 || gcount < 0 {
            return Err(ObsError::FormatError(format!(
                "Invalid PCOUNT {} / GCOUNT {}", pcount, gcount)));
        }

        let elements = axes.iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| ObsError::FormatError("Data section size overflows".to_string()))?;
        elements.checked_mul(bytes_per_value)
            .and_then(|n| n.checked_add(pcount as usize))
            .and_then(|n| n.checked_mul(gcount as usize))
            .ok_or_else(|| ObsError::FormatError("Data section size overflows".to_string()))
    }
}

/// One header plus its raw (big-endian) data bytes
#[derive(Debug, Clone, PartialEq)]
pub struct Hdu {
    pub header: Header,
    pub data: Vec<u8>,
}

impl Hdu {
    pub fn new(header: Header, data: Vec<u8>) -> Self {
        Hdu { header, data }
    }

    /// Extension type, or None for the primary HDU
    pub fn xtension(&self) -> Option<&str> {
        self.header.get_str(keywords::XTENSION)
    }

    pub fn extname(&self) -> Option<&str> {
        self.header.get_str(keywords::EXTNAME)
    }
}

/// Fill `buf` completely, returning false on a clean end of input
fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> ObsResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(ObsError::FormatError(format!(
            "Truncated block: {} of {} bytes", n, buf.len()))),
    }
}

/// Read a header, or None if the input is exhausted
pub fn read_header(reader: &mut impl Read) -> ObsResult<Option<Header>> {
    let mut header = Header::new();
    let mut block = vec![0u8; BLOCK_SIZE];
    let mut first = true;

    loop {
        if !read_block(reader, &mut block)? {
            if first {
                return Ok(None);
            }
            return Err(ObsError::FormatError("Header ends without END card".to_string()));
        }
        first = false;

        for record in block.chunks_exact(CARD_SIZE) {
            let card = Card::parse(record)?;
            if card.is_end() {
                debug!("Read header with {} cards", header.cards.len());
                return Ok(Some(header));
            }
            // Blank filler cards carry nothing
            if card.key.is_empty() && card.value.is_none() && card.comment.is_none() {
                continue;
            }
            header.cards.push(card);
        }
    }
}

/// Read every HDU from the input
pub fn read_hdus(reader: &mut impl Read) -> ObsResult<Vec<Hdu>> {
    let mut hdus = Vec::new();

    while let Some(header) = read_header(reader)? {
        let len = header.data_len()?;
        let padded = len.checked_next_multiple_of(BLOCK_SIZE)
            .ok_or_else(|| ObsError::FormatError(format!(
                "HDU {} declares a data section of {} bytes", hdus.len(), len)))?;

        // The buffer grows with the bytes actually present, not the declared size
        let mut data = Vec::new();
        Read::take(&mut *reader, padded as u64).read_to_end(&mut data)?;
        if data.len() < padded {
            return Err(ObsError::FormatError(format!(
                "HDU {} is missing its {} byte data section ({} bytes left)",
                hdus.len(), len, data.len())));
        }
        data.truncate(len);
        hdus.push(Hdu::new(header, data));
    }

    if hdus.is_empty() {
        return Err(ObsError::FormatError("File contains no header".to_string()));
    }
    Ok(hdus)
}

/// Write one HDU with block padding
pub fn write_hdu(writer: &mut impl Write, hdu: &Hdu) -> ObsResult<()> {
    let mut header_bytes = Vec::with_capacity(BLOCK_SIZE);
    for card in hdu.header.cards.iter().chain(std::iter::once(&Card::end())) {
        header_bytes.extend_from_slice(card.to_record()?.as_bytes());
    }
    let header_padding = header_bytes.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE - header_bytes.len();
    header_bytes.extend(std::iter::repeat(b' ').take(header_padding));
    writer.write_all(&header_bytes)?;

    writer.write_all(&hdu.data)?;
    let data_padding = hdu.data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE - hdu.data.len();
    if data_padding > 0 {
        writer.write_all(&vec![0u8; data_padding])?;
    }
    Ok(())
}

/// Write a sequence of HDUs
pub fn write_hdus(writer: &mut impl Write, hdus: &[Hdu]) -> ObsResult<()> {
    for hdu in hdus {
        write_hdu(writer, hdu)?;
    }
    Ok(())
}
