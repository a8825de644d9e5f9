//! Binary table defect files
//!
//! An empty primary HDU followed by one `BINTABLE` extension per detector.
//! Current files store `x0, y0, width, height` as 32-bit integers. Older
//! files use 16 or 64-bit integer columns, or describe each defect as a
//! region: a `BOX` shape with centre `X, Y` and size `R`.

use std::collections::HashSet;
use std::io::Cursor;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::errors::{ObsError, ObsResult};
use crate::defects::defect_map::{format_calib_date, parse_calib_date, DefectHeader, DefectMap};
use crate::fits::constants::{keywords, xtension};
use crate::fits::hdu::{self, Hdu, Header};
use crate::geom::BoundingBox;
use super::handler::{DefectFormat, DefectFormatHandler};

const MAGIC: &[u8] = b"SIMPLE  =";
const EXTNAME: &str = "DEFECTS";
const COLUMNS: [&str; 4] = ["x0", "y0", "width", "height"];

mod cards {
    pub const NAME: &str = "NAME";
    pub const SERIAL: &str = "SERIAL";
    pub const CDATE: &str = "CDATE";
    pub const INSTRUME: &str = "INSTRUME";
    pub const DATE: &str = "DATE";
}

lazy_static! {
    static ref TFORM: Regex = Regex::new(r"^\s*(\d*)([IJKEDA])").unwrap();
}

/// Handler for binary table files
pub struct TableHandler;

impl DefectFormatHandler for TableHandler {
    fn encode_many(&self, maps: &[DefectMap]) -> ObsResult<Vec<u8>> {
        let mut seen = HashSet::new();
        for map in maps {
            if !seen.insert(map.header.detector_name.as_str()) {
                return Err(ObsError::DuplicateDetector {
                    name: map.header.detector_name.clone(),
                    path: format!("<{} data>", self.name()),
                });
            }
        }

        let mut hdus = vec![primary_hdu()];
        for map in maps {
            hdus.push(table_hdu(map)?);
        }
        let mut out = Vec::new();
        hdu::write_hdus(&mut out, &hdus)?;
        Ok(out)
    }

    fn decode_all(&self, data: &[u8]) -> ObsResult<Vec<DefectMap>> {
        if !data.starts_with(MAGIC) {
            return Err(ObsError::FormatError("Defect table does not start with a SIMPLE card".to_string()));
        }
        let hdus = hdu::read_hdus(&mut Cursor::new(data))?;

        let mut maps = Vec::new();
        for (idx, unit) in hdus.iter().enumerate().skip(1) {
            if unit.xtension() != Some(xtension::BINTABLE) {
                debug!("Skipping HDU {} of type {:?}", idx, unit.xtension());
                continue;
            }
            if unit.extname().is_some_and(|name| name != EXTNAME) {
                warn!("Reading table HDU {} named {:?} as defects", idx, unit.extname());
            }
            maps.push(decode_table(unit, idx)?);
        }
        Ok(maps)
    }

    fn name(&self) -> &'static str {
        "table"
    }

    fn format(&self) -> DefectFormat {
        DefectFormat::Table
    }
}

fn primary_hdu() -> Hdu {
    let mut header = Header::new();
    header.push(keywords::SIMPLE, true);
    header.push(keywords::BITPIX, 8i64);
    header.push(keywords::NAXIS, 0i64);
    header.push(keywords::EXTEND, true);
    Hdu::new(header, Vec::new())
}

fn table_hdu(map: &DefectMap) -> ObsResult<Hdu> {
    let row_bytes = COLUMNS.len() * 4;
    let mut header = Header::new();
    header.push(keywords::XTENSION, xtension::BINTABLE);
    header.push(keywords::BITPIX, 8i64);
    header.push(keywords::NAXIS, 2i64);
    header.push(keywords::NAXIS1, row_bytes as i64);
    header.push(keywords::NAXIS2, map.boxes.len() as i64);
    header.push(keywords::PCOUNT, 0i64);
    header.push(keywords::GCOUNT, 1i64);
    header.push(keywords::TFIELDS, COLUMNS.len() as i64);
    for (i, column) in COLUMNS.iter().enumerate() {
        header.push(&format!("TTYPE{}", i + 1), *column);
        header.push(&format!("TFORM{}", i + 1), "1J");
    }
    header.push(keywords::EXTNAME, EXTNAME);

    let h = &map.header;
    header.push(cards::NAME, card_text(cards::NAME, &h.detector_name)?);
    header.push(cards::SERIAL, card_text(cards::SERIAL, &h.detector_serial)?);
    header.push(cards::CDATE, format_calib_date(&h.calib_date));
    header.push(cards::INSTRUME, card_text(cards::INSTRUME, &h.instrument)?);
    header.push(cards::DATE, h.created_at().to_rfc3339_opts(SecondsFormat::Secs, true));
    if let Some(filter) = &h.filter {
        header.push(keywords::FILTER, card_text(keywords::FILTER, filter)?);
    }

    let mut data = Vec::with_capacity(row_bytes * map.boxes.len());
    for b in &map.boxes {
        let width = i32::try_from(b.width)
            .map_err(|_| ObsError::FormatError(format!("Defect {} is too wide for the table format", b)))?;
        let height = i32::try_from(b.height)
            .map_err(|_| ObsError::FormatError(format!("Defect {} is too tall for the table format", b)))?;
        for value in [b.x0, b.y0, width, height] {
            data.write_i32::<BigEndian>(value)?;
        }
    }
    Ok(Hdu::new(header, data))
}

/// Header string that reads back unchanged from a card
///
/// Card strings are printable ASCII and lose trailing blanks when read.
fn card_text<'v>(key: &str, value: &'v str) -> ObsResult<&'v str> {
    if value.ends_with(' ') || !value.chars().all(|c| (' '..='~').contains(&c)) {
        return Err(ObsError::FormatError(format!(
            "{} value {:?} cannot be stored in a table header", key, value)));
    }
    Ok(value)
}

/// Storage type of a table column
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnType {
    Short,
    Int,
    Long,
    Float,
    Double,
    Text,
}

impl ColumnType {
    fn from_code(code: &str) -> Option<ColumnType> {
        match code {
            "I" => Some(ColumnType::Short),
            "J" => Some(ColumnType::Int),
            "K" => Some(ColumnType::Long),
            "E" => Some(ColumnType::Float),
            "D" => Some(ColumnType::Double),
            "A" => Some(ColumnType::Text),
            _ => None,
        }
    }

    fn size(&self) -> usize {
        match self {
            ColumnType::Short => 2,
            ColumnType::Int | ColumnType::Float => 4,
            ColumnType::Long | ColumnType::Double => 8,
            ColumnType::Text => 1,
        }
    }

    fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Short | ColumnType::Int | ColumnType::Long)
    }
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    kind: ColumnType,
    repeat: usize,
    offset: usize,
}

impl Column {
    fn width(&self) -> usize {
        self.kind.size() * self.repeat
    }

    fn bytes<'r>(&self, row: &'r [u8]) -> &'r [u8] {
        &row[self.offset..self.offset + self.width()]
    }

    /// Single integer cell
    fn integer(&self, row: &[u8]) -> ObsResult<i64> {
        let bytes = self.bytes(row);
        match self.kind {
            ColumnType::Short => Ok(i64::from(BigEndian::read_i16(bytes))),
            ColumnType::Int => Ok(i64::from(BigEndian::read_i32(bytes))),
            ColumnType::Long => Ok(BigEndian::read_i64(bytes)),
            _ => Err(ObsError::FormatError(format!("Column {} does not hold integers", self.name))),
        }
    }

    /// Every element of a numeric cell, widened to f64
    fn numbers(&self, row: &[u8]) -> ObsResult<Vec<f64>> {
        let size = self.kind.size();
        self.bytes(row).chunks_exact(size)
            .map(|chunk| match self.kind {
                ColumnType::Short => Ok(f64::from(BigEndian::read_i16(chunk))),
                ColumnType::Int => Ok(f64::from(BigEndian::read_i32(chunk))),
                ColumnType::Long => Ok(BigEndian::read_i64(chunk) as f64),
                ColumnType::Float => Ok(f64::from(BigEndian::read_f32(chunk))),
                ColumnType::Double => Ok(BigEndian::read_f64(chunk)),
                ColumnType::Text => Err(ObsError::FormatError(format!(
                    "Column {} holds text, expected numbers", self.name))),
            })
            .collect()
    }

    fn text(&self, row: &[u8]) -> String {
        String::from_utf8_lossy(self.bytes(row))
            .trim_end_matches(['\0', ' '])
            .to_string()
    }
}

/// Column descriptions from the TTYPEn / TFORMn cards
fn parse_columns(header: &Header) -> ObsResult<Vec<Column>> {
    let fields = header.require_int(keywords::TFIELDS)?;
    let mut columns = Vec::new();
    let mut offset = 0;

    for n in 1..=fields {
        let tform = header.require_str(&format!("TFORM{}", n))?;
        let caps = TFORM.captures(tform)
            .ok_or_else(|| ObsError::FormatError(format!("Unsupported TFORM{} '{}'", n, tform)))?;
        let repeat = if caps[1].is_empty() {
            1
        } else {
            caps[1].parse::<usize>()
                .map_err(|_| ObsError::FormatError(format!("Invalid TFORM{} '{}'", n, tform)))?
        };
        let kind = ColumnType::from_code(&caps[2])
            .ok_or_else(|| ObsError::FormatError(format!("Unsupported TFORM{} '{}'", n, tform)))?;
        let name = header.get_str(&format!("TTYPE{}", n)).unwrap_or("").trim().to_string();

        let column = Column { name, kind, repeat, offset };
        offset += column.width();
        columns.push(column);
    }
    Ok(columns)
}

/// Where the box geometry lives in a row
enum BoxLayout {
    /// Integer corner and extent columns
    Corner([usize; 4]),
    /// Region description: centre, size and optional shape column
    Region { x: usize, y: usize, r: usize, shape: Option<usize> },
}

impl BoxLayout {
    fn detect(columns: &[Column]) -> ObsResult<BoxLayout> {
        let find = |name: &str| columns.iter().position(|c| c.name.eq_ignore_ascii_case(name));

        if let [Some(x0), Some(y0), Some(w), Some(h)] = COLUMNS.map(find) {
            let corner = [x0, y0, w, h];
            for &idx in &corner {
                let column = &columns[idx];
                if !column.kind.is_integer() || column.repeat != 1 {
                    return Err(ObsError::FormatError(format!(
                        "Column {} must hold one integer per row", column.name)));
                }
            }
            return Ok(BoxLayout::Corner(corner));
        }

        match (find("X"), find("Y"), find("R")) {
            (Some(x), Some(y), Some(r)) => Ok(BoxLayout::Region { x, y, r, shape: find("SHAPE") }),
            _ => Err(ObsError::FormatError(
                "Table has neither x0/y0/width/height nor X/Y/R columns".to_string())),
        }
    }

    fn read_box(&self, columns: &[Column], row: &[u8], row_no: usize) -> ObsResult<BoundingBox> {
        let out_of_range = || ObsError::FormatError(format!("Row {}: value out of range", row_no));
        let (x0, y0, width, height) = match self {
            BoxLayout::Corner([x0, y0, w, h]) => (
                columns[*x0].integer(row)?,
                columns[*y0].integer(row)?,
                columns[*w].integer(row)?,
                columns[*h].integer(row)?,
            ),
            BoxLayout::Region { x, y, r, shape } => {
                if let Some(shape) = shape {
                    let name = columns[*shape].text(row);
                    if !name.eq_ignore_ascii_case("BOX") {
                        return Err(ObsError::FormatError(format!(
                            "Row {}: unsupported region shape '{}'", row_no, name)));
                    }
                }
                let cx = first_number(&columns[*x], row, row_no)?;
                let cy = first_number(&columns[*y], row, row_no)?;
                let size = columns[*r].numbers(row)?;
                let (w, h) = match size.as_slice() {
                    [side] => (*side, *side),
                    [w, h, ..] => (*w, *h),
                    [] => return Err(ObsError::FormatError(format!("Row {}: empty R cell", row_no))),
                };
                let width = integral(w, "width", row_no)?;
                let height = integral(h, "height", row_no)?;
                (
                    integral(cx - (width as f64 - 1.0) / 2.0, "x0", row_no)?,
                    integral(cy - (height as f64 - 1.0) / 2.0, "y0", row_no)?,
                    width,
                    height,
                )
            }
        };

        BoundingBox::new(
            i32::try_from(x0).map_err(|_| out_of_range())?,
            i32::try_from(y0).map_err(|_| out_of_range())?,
            u32::try_from(width).map_err(|_| out_of_range())?,
            u32::try_from(height).map_err(|_| out_of_range())?)
            .map_err(|e| ObsError::FormatError(format!("Row {}: {}", row_no, e)))
    }
}

fn first_number(column: &Column, row: &[u8], row_no: usize) -> ObsResult<f64> {
    column.numbers(row)?
        .first()
        .copied()
        .ok_or_else(|| ObsError::FormatError(format!("Row {}: empty {} cell", row_no, column.name)))
}

/// Exact integer value of a region coordinate
fn integral(value: f64, what: &str, row_no: usize) -> ObsResult<i64> {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(ObsError::FormatError(format!(
            "Row {}: {} {} is not a whole pixel", row_no, what, value)));
    }
    Ok(value as i64)
}

fn decode_table(unit: &Hdu, idx: usize) -> ObsResult<DefectMap> {
    let header = &unit.header;
    let row_bytes = usize::try_from(header.require_int(keywords::NAXIS1)?)
        .map_err(|_| ObsError::FormatError(format!("HDU {}: invalid NAXIS1", idx)))?;
    let rows = usize::try_from(header.require_int(keywords::NAXIS2)?)
        .map_err(|_| ObsError::FormatError(format!("HDU {}: invalid NAXIS2", idx)))?;

    let columns = parse_columns(header)?;
    let used: usize = columns.iter().map(Column::width).sum();
    if used != row_bytes {
        return Err(ObsError::FormatError(format!(
            "HDU {}: columns take {} bytes but rows are {} bytes", idx, used, row_bytes)));
    }
    if unit.data.len() < row_bytes * rows {
        return Err(ObsError::FormatError(format!(
            "HDU {}: {} rows need {} bytes, found {}", idx, rows, row_bytes * rows, unit.data.len())));
    }

    let layout = BoxLayout::detect(&columns)?;
    let mut boxes = Vec::with_capacity(rows);
    if row_bytes > 0 {
        for (row_no, row) in unit.data.chunks_exact(row_bytes).take(rows).enumerate() {
            boxes.push(layout.read_box(&columns, row, row_no + 1)?);
        }
    }

    let defect_header = parse_defect_header(header)?;
    debug!("Read {} defect row(s) for detector {} from HDU {}", boxes.len(), defect_header.detector_name, idx);
    Ok(DefectMap::new(defect_header, boxes))
}

fn parse_defect_header(header: &Header) -> ObsResult<DefectHeader> {
    let required = |key: &str| header.get(key)
        .map(|value| value.to_string())
        .ok_or_else(|| ObsError::FormatError(format!("Defect table lacks the {} card", key)));

    let calib_date = parse_calib_date(&required(cards::CDATE)?)?;
    let created_at = match header.get_str(cards::DATE) {
        Some(stamp) => match DateTime::parse_from_rfc3339(stamp) {
            Ok(stamp) => stamp.with_timezone(&Utc),
            Err(_) => Utc.from_utc_datetime(&parse_calib_date(stamp)?),
        },
        None => Utc.from_utc_datetime(&calib_date),
    };

    Ok(DefectHeader::new(
        header.get_str(cards::INSTRUME).unwrap_or(""),
        &required(cards::NAME)?,
        &required(cards::SERIAL)?,
        calib_date)
        .with_filter(header.get_str(keywords::FILTER))
        .with_created_at(created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MetaValue;

    fn header(name: &str) -> DefectHeader {
        DefectHeader::new("test", name, "0000011", parse_calib_date("1970-01-01T00:00:00").unwrap())
            .with_created_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn boxes() -> Vec<BoundingBox> {
        vec![
            BoundingBox::new(10, 20, 3, 4).unwrap(),
            BoundingBox::new(1200, 5, 1, 2000).unwrap(),
        ]
    }

    fn file(hdus: &[Hdu]) -> Vec<u8> {
        let mut out = Vec::new();
        hdu::write_hdus(&mut out, hdus).unwrap();
        out
    }

    /// Table HDU with the header cards of `name` and custom columns
    fn legacy_hdu(name: &str, columns: &[(&str, &str)], rows: usize, data: Vec<u8>) -> Hdu {
        let mut h = Header::new();
        h.push(keywords::XTENSION, xtension::BINTABLE);
        h.push(keywords::BITPIX, 8i64);
        h.push(keywords::NAXIS, 2i64);
        h.push(keywords::NAXIS1, (data.len() / rows) as i64);
        h.push(keywords::NAXIS2, rows as i64);
        h.push(keywords::PCOUNT, 0i64);
        h.push(keywords::GCOUNT, 1i64);
        h.push(keywords::TFIELDS, columns.len() as i64);
        for (i, (ttype, tform)) in columns.iter().enumerate() {
            h.push(&format!("TTYPE{}", i + 1), *ttype);
            h.push(&format!("TFORM{}", i + 1), *tform);
        }
        h.push(cards::NAME, name);
        h.push(cards::SERIAL, "0000011");
        h.push(cards::CDATE, "1970-01-01T00:00:00");
        Hdu::new(h, data)
    }

    #[test]
    fn round_trips_several_detectors() {
        let maps = vec![
            DefectMap::new(header("0"), boxes()),
            DefectMap::new(header("1").with_filter(Some("r")), vec![]),
        ];
        let bytes = TableHandler.encode_many(&maps).unwrap();
        assert_eq!(bytes.len() % 2880, 0);

        assert_eq!(TableHandler.decode_all(&bytes).unwrap(), maps);
        assert_eq!(TableHandler.decode(&bytes, "1").unwrap(), maps[1]);
        assert!(matches!(TableHandler.decode(&bytes, "2"), Err(ObsError::NotFound(_))));
    }

    #[test]
    fn duplicate_detector_is_an_error() {
        let map = DefectMap::new(header("0"), boxes());
        let bytes = file(&[primary_hdu(), table_hdu(&map).unwrap(), table_hdu(&map).unwrap()]);
        assert!(matches!(TableHandler.decode(&bytes, "0"), Err(ObsError::DuplicateDetector { .. })));

        let result = TableHandler.encode_many(&[map.clone(), map]);
        assert!(matches!(result, Err(ObsError::DuplicateDetector { .. })));
    }

    #[test]
    fn reads_short_integer_columns() {
        let mut data = Vec::new();
        for b in boxes() {
            // Columns stored as height, width, x0, y0
            data.write_i16::<BigEndian>(b.height as i16).unwrap();
            data.write_i16::<BigEndian>(b.width as i16).unwrap();
            data.write_i16::<BigEndian>(b.x0 as i16).unwrap();
            data.write_i16::<BigEndian>(b.y0 as i16).unwrap();
        }
        let columns = [("HEIGHT", "1I"), ("WIDTH", "1I"), ("X0", "1I"), ("Y0", "1I")];
        let bytes = file(&[primary_hdu(), legacy_hdu("0", &columns, 2, data)]);

        let map = TableHandler.decode(&bytes, "0").unwrap();
        assert_eq!(map.boxes, boxes());
        assert_eq!(map.header.instrument, "");
        assert_eq!(map.header.created_at(), Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn reads_region_layout() {
        let mut data = Vec::new();
        for b in boxes() {
            data.extend_from_slice(b"BOX");
            data.write_f64::<BigEndian>(f64::from(b.x0) + (f64::from(b.width) - 1.0) / 2.0).unwrap();
            data.write_f64::<BigEndian>(f64::from(b.y0) + (f64::from(b.height) - 1.0) / 2.0).unwrap();
            data.write_f64::<BigEndian>(f64::from(b.width)).unwrap();
            data.write_f64::<BigEndian>(f64::from(b.height)).unwrap();
        }
        let columns = [("SHAPE", "3A"), ("X", "1D"), ("Y", "1D"), ("R", "2D")];
        let bytes = file(&[primary_hdu(), legacy_hdu("0", &columns, 2, data)]);

        assert_eq!(TableHandler.decode(&bytes, "0").unwrap().boxes, boxes());
    }

    #[test]
    fn rejects_fractional_region() {
        let mut data = Vec::new();
        data.write_f32::<BigEndian>(11.25).unwrap();
        data.write_f32::<BigEndian>(21.0).unwrap();
        data.write_f32::<BigEndian>(3.0).unwrap();
        let columns = [("X", "1E"), ("Y", "1E"), ("R", "1E")];
        let bytes = file(&[primary_hdu(), legacy_hdu("0", &columns, 1, data)]);

        assert!(matches!(TableHandler.decode(&bytes, "0"), Err(ObsError::FormatError(_))));
    }

    #[test]
    fn header_strings_survive_or_are_refused() {
        for serial in ["it's", "a=b", " 11", "x / y", ""] {
            let mut map = DefectMap::new(header("0"), boxes());
            map.header.detector_serial = serial.to_string();
            map.header.instrument = format!("'{}'", serial);
            let bytes = TableHandler.encode(&map).unwrap();
            assert_eq!(TableHandler.decode(&bytes, "0").unwrap(), map, "{:?}", serial);
        }

        for serial in ["0000011 ", "00\n11", "caf\u{e9}"] {
            let mut map = DefectMap::new(header("0"), boxes());
            map.header.detector_serial = serial.to_string();
            assert!(matches!(TableHandler.encode(&map), Err(ObsError::FormatError(_))), "{:?}", serial);
        }

        let map = DefectMap::new(header("0").with_filter(Some("r ")), boxes());
        assert!(matches!(TableHandler.encode(&map), Err(ObsError::FormatError(_))));
    }

    #[test]
    fn rejects_oversized_row_counts() {
        for rows in [6_148_914_691_236_517_205i64, 1_000_000_000_000_000] {
            let mut hdu = legacy_hdu("0", &[("X0", "3A")], 1, vec![0u8; 3]);
            for card in hdu.header.cards.iter_mut() {
                if card.key == keywords::NAXIS2 {
                    card.value = Some(MetaValue::Int(rows));
                }
            }
            hdu.data.clear();
            let bytes = file(&[primary_hdu(), hdu]);
            assert!(matches!(TableHandler.decode_all(&bytes), Err(ObsError::FormatError(_))), "{}", rows);
        }
    }

    #[test]
    fn rejects_other_data() {
        assert!(matches!(TableHandler.decode_all(b"# %ECSV 1.0\n"), Err(ObsError::FormatError(_))));

        let mut bytes = TableHandler.encode(&DefectMap::new(header("0"), boxes())).unwrap();
        bytes.truncate(2880 * 2 + 8);
        assert!(matches!(TableHandler.decode_all(&bytes), Err(ObsError::FormatError(_))));
    }
}
