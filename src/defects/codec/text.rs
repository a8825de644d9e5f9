//! Plain text defect lists
//!
//! ```text
//! # detector=0 serial=0000011 calibDate=1970-01-01T00:00:00 created=2024-05-01T12:00:00Z instrument=test
//!   10   20    3    4
//! 1200    5    1 2000
//! ```
//!
//! Header values are percent-escaped so they never contain whitespace, `=`
//! or `%`. Each row holds `x0 y0 width height`, right-justified to a common
//! width of at least four characters.

use std::collections::HashMap;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use log::debug;

use crate::errors::{ObsError, ObsResult};
use crate::defects::defect_map::{format_calib_date, parse_calib_date, DefectHeader, DefectMap};
use crate::geom::BoundingBox;
use super::handler::{single_map, DefectFormat, DefectFormatHandler};

const MIN_FIELD_WIDTH: usize = 4;

/// Handler for whitespace-aligned text files
pub struct TextHandler;

impl DefectFormatHandler for TextHandler {
    fn encode_many(&self, maps: &[DefectMap]) -> ObsResult<Vec<u8>> {
        let map = single_map(maps, self.name())?;
        let header = &map.header;

        let mut out = format!(
            "# detector={} serial={} calibDate={} created={} instrument={}",
            escape(&header.detector_name),
            escape(&header.detector_serial),
            escape(&format_calib_date(&header.calib_date)),
            header.created_at().to_rfc3339_opts(SecondsFormat::Secs, true),
            escape(&header.instrument));
        if let Some(filter) = &header.filter {
            out.push_str(&format!(" filter={}", escape(filter)));
        }
        out.push('\n');

        let rows: Vec<[String; 4]> = map.boxes.iter()
            .map(|b| [b.x0.to_string(), b.y0.to_string(), b.width.to_string(), b.height.to_string()])
            .collect();
        let width = rows.iter()
            .flat_map(|row| row.iter().map(String::len))
            .fold(MIN_FIELD_WIDTH, usize::max);
        for row in &rows {
            let fields: Vec<String> = row.iter().map(|v| format!("{:>width$}", v, width = width)).collect();
            out.push_str(&fields.join(" "));
            out.push('\n');
        }

        Ok(out.into_bytes())
    }

    fn decode_all(&self, data: &[u8]) -> ObsResult<Vec<DefectMap>> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ObsError::FormatError(format!("Defect text is not UTF-8: {}", e)))?;
        let mut lines = text.lines().enumerate();

        let header_line = lines.next()
            .map(|(_, line)| line)
            .filter(|line| line.starts_with('#') && !line.starts_with("# %ECSV"))
            .ok_or_else(|| ObsError::FormatError("Defect text must start with a '#' header line".to_string()))?;
        let header = parse_header(header_line)?;

        let mut boxes = Vec::new();
        for (idx, line) in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            boxes.push(parse_row(line, idx + 1)?);
        }

        debug!("Read {} text defect row(s) for detector {}", boxes.len(), header.detector_name);
        Ok(vec![DefectMap::new(header, boxes)])
    }

    fn name(&self) -> &'static str {
        "text"
    }

    fn format(&self) -> DefectFormat {
        DefectFormat::Text
    }
}

fn parse_header(line: &str) -> ObsResult<DefectHeader> {
    let mut fields = HashMap::new();
    for token in line.trim_start_matches('#').split_whitespace() {
        let (key, value) = token.split_once('=')
            .ok_or_else(|| ObsError::FormatError(format!("Header token '{}' is not key=value", token)))?;
        fields.insert(key, unescape(value)?);
    }

    let required = |key: &str| fields.get(key)
        .cloned()
        .ok_or_else(|| ObsError::FormatError(format!("Defect text header lacks {}", key)));

    let calib_date = parse_calib_date(&required("calibDate")?)?;
    let created_at = match fields.get("created") {
        Some(stamp) => DateTime::parse_from_rfc3339(stamp)
            .map_err(|e| ObsError::FormatError(format!("Invalid creation time '{}': {}", stamp, e)))?
            .with_timezone(&Utc),
        None => Utc.from_utc_datetime(&calib_date),
    };

    for key in fields.keys() {
        if !["detector", "serial", "calibDate", "created", "instrument", "filter"].contains(key) {
            debug!("Ignoring header field {}", key);
        }
    }

    Ok(DefectHeader::new(
        fields.get("instrument").map(String::as_str).unwrap_or(""),
        &required("detector")?,
        &required("serial")?,
        calib_date)
        .with_filter(fields.get("filter").map(String::as_str))
        .with_created_at(created_at))
}

fn parse_row(line: &str, line_no: usize) -> ObsResult<BoundingBox> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(ObsError::FormatError(format!(
            "Line {}: expected 4 fields, found {}", line_no, fields.len())));
    }
    let int = |idx: usize| fields[idx].parse::<i64>()
        .map_err(|_| ObsError::FormatError(format!("Line {}: '{}' is not an integer", line_no, fields[idx])));
    let (x0, y0, width, height) = (int(0)?, int(1)?, int(2)?, int(3)?);

    let out_of_range = || ObsError::FormatError(format!("Line {}: value out of range", line_no));
    BoundingBox::new(
        i32::try_from(x0).map_err(|_| out_of_range())?,
        i32::try_from(y0).map_err(|_| out_of_range())?,
        u32::try_from(width).map_err(|_| out_of_range())?,
        u32::try_from(height).map_err(|_| out_of_range())?)
        .map_err(|e| ObsError::FormatError(format!("Line {}: {}", line_no, e)))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '=' || c.is_whitespace() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape(value: &str) -> ObsResult<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = value.get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| ObsError::FormatError(format!("Bad escape in '{}'", value)))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ObsError::FormatError(format!("Bad escape in '{}'", value)))
}
