//! ECSV defect tables
//!
//! A commented YAML header declares the columns and carries the calibration
//! metadata in an ordered map; the rows follow as delimited text. Only the
//! subset of YAML that these headers use is understood: flow mappings of
//! one `key: value` pair per list item.

use std::collections::HashMap;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::errors::{ObsError, ObsResult};
use crate::defects::defect_map::{format_calib_date, parse_calib_date, DefectHeader, DefectMap};
use crate::geom::BoundingBox;
use super::handler::{single_map, DefectFormat, DefectFormatHandler};

const CURRENT_VERSION: &str = "1.0";
const READABLE_VERSIONS: [&str; 2] = ["0.9", "1.0"];
const COLUMNS: [&str; 4] = ["x0", "y0", "width", "height"];

lazy_static! {
    static ref VERSION_LINE: Regex = Regex::new(r"^# %ECSV (\d+\.\d+)\s*$").unwrap();
    static ref DATATYPE_ENTRY: Regex =
        Regex::new(r"^-\s*\{\s*name:\s*([^,}]+?)\s*,\s*datatype:\s*([^,}]+?)\s*(?:,[^}]*)?\}$").unwrap();
    static ref META_ENTRY: Regex = Regex::new(r"^-\s*\{\s*([A-Za-z0-9_]+)\s*:\s*(.*?)\s*\}$").unwrap();
    static ref INTEGER_TYPE: Regex = Regex::new(r"^u?int(8|16|32|64)$").unwrap();
}

/// Handler for ECSV tables
pub struct EcsvHandler;

impl DefectFormatHandler for EcsvHandler {
    fn encode_many(&self, maps: &[DefectMap]) -> ObsResult<Vec<u8>> {
        let map = single_map(maps, self.name())?;
        let header = &map.header;
        let created = header.created_at();

        let mut lines = vec![
            format!("# %ECSV {}", CURRENT_VERSION),
            "# ---".to_string(),
            "# datatype:".to_string(),
        ];
        for column in COLUMNS {
            lines.push(format!("# - {{name: {}, datatype: int32}}", column));
        }
        lines.push("# meta: !!omap".to_string());
        let meta = [
            ("INSTRUME", Some(header.instrument.clone())),
            ("DETECTOR", Some(header.detector_name.clone())),
            ("DETECTOR_SERIAL", Some(header.detector_serial.clone())),
            ("CALIBDATE", Some(format_calib_date(&header.calib_date))),
            ("FILTER", header.filter.clone()),
            ("CALIB_ID", Some(header.calib_id())),
            ("CALIB_CREATION_DATE", Some(created.format("%Y-%m-%d").to_string())),
            ("CALIB_CREATION_TIME", Some(created.format("%H:%M:%S").to_string())),
            ("OBSTYPE", Some("defects".to_string())),
        ];
        for (key, value) in meta {
            let value = value.map_or_else(|| "null".to_string(), |v| quote(&v));
            lines.push(format!("# - {{{}: {}}}", key, value));
        }
        lines.push("# schema: astropy-2.0".to_string());
        lines.push(COLUMNS.join(" "));
        for b in &map.boxes {
            lines.push(format!("{} {} {} {}", b.x0, b.y0, b.width, b.height));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out.into_bytes())
    }

    fn decode_all(&self, data: &[u8]) -> ObsResult<Vec<DefectMap>> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ObsError::FormatError(format!("ECSV data is not UTF-8: {}", e)))?;
        let mut lines = text.lines().enumerate().peekable();

        let version = lines.next()
            .and_then(|(_, line)| VERSION_LINE.captures(line))
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ObsError::FormatError("Missing '# %ECSV' header line".to_string()))?;
        if !READABLE_VERSIONS.contains(&version.as_str()) {
            return Err(ObsError::FormatError(format!("Unsupported ECSV version {}", version)));
        }

        let mut section = String::new();
        let mut datatypes: Vec<(String, String)> = Vec::new();
        let mut meta: HashMap<String, Option<String>> = HashMap::new();
        let mut delimiter = ' ';

        while let Some((idx, line)) = lines.next_if(|(_, line)| line.starts_with('#')) {
            let content = line.trim_start_matches('#').trim();
            if content.is_empty() || content == "---" {
                continue;
            }
            if !content.starts_with('-') {
                let (key, value) = content.split_once(':').unwrap_or((content, ""));
                section = key.trim().to_string();
                if section == "delimiter" {
                    delimiter = unquote(value.trim())?.chars().next().unwrap_or(' ');
                }
                continue;
            }
            match section.as_str() {
                "datatype" => {
                    let caps = DATATYPE_ENTRY.captures(content).ok_or_else(|| ObsError::FormatError(
                        format!("Line {}: malformed column entry '{}'", idx + 1, content)))?;
                    datatypes.push((caps[1].to_string(), caps[2].to_string()));
                },
                "meta" => {
                    let caps = META_ENTRY.captures(content).ok_or_else(|| ObsError::FormatError(
                        format!("Line {}: malformed metadata entry '{}'", idx + 1, content)))?;
                    let value = caps[2].trim();
                    let value = if value == "null" || value == "~" { None } else { Some(unquote(value)?) };
                    meta.insert(caps[1].to_string(), value);
                },
                other => debug!("Ignoring ECSV header entry under '{}'", other),
            }
        }

        let (_, names_line) = lines.next()
            .ok_or_else(|| ObsError::FormatError("ECSV data has no column name line".to_string()))?;
        let names: Vec<&str> = split_fields(names_line, delimiter);
        let positions = column_positions(&names, &datatypes)?;

        let mut boxes = Vec::new();
        for (idx, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_fields(line, delimiter);
            if fields.len() != names.len() {
                return Err(ObsError::FormatError(format!(
                    "Line {}: expected {} fields, found {}", idx + 1, names.len(), fields.len())));
            }
            boxes.push(parse_row(&fields, &positions, idx + 1)?);
        }

        let header = build_header(&meta)?;
        debug!("Read ECSV {} table with {} row(s) for detector {}", version, boxes.len(), header.detector_name);
        Ok(vec![DefectMap::new(header, boxes)])
    }

    fn name(&self) -> &'static str {
        "ecsv"
    }

    fn format(&self) -> DefectFormat {
        DefectFormat::Ecsv
    }
}

fn split_fields(line: &str, delimiter: char) -> Vec<&str> {
    if delimiter == ' ' {
        line.split_whitespace().collect()
    } else {
        line.split(delimiter).map(str::trim).collect()
    }
}

/// Index of each box column in the row
fn column_positions(names: &[&str], datatypes: &[(String, String)]) -> ObsResult<[usize; 4]> {
    if !datatypes.is_empty() {
        let declared: Vec<&str> = datatypes.iter().map(|(name, _)| name.as_str()).collect();
        if declared != names {
            return Err(ObsError::FormatError(format!(
                "Column line {:?} does not match declared columns {:?}", names, declared)));
        }
    }

    let mut positions = [0usize; 4];
    for (slot, column) in positions.iter_mut().zip(COLUMNS) {
        *slot = names.iter()
            .position(|name| name.eq_ignore_ascii_case(column))
            .ok_or_else(|| ObsError::FormatError(format!("ECSV table has no {} column", column)))?;
        if let Some((_, datatype)) = datatypes.get(*slot) {
            if !INTEGER_TYPE.is_match(datatype) {
                return Err(ObsError::FormatError(format!(
                    "Column {} has type {}, expected an integer type", column, datatype)));
            }
        }
    }
    Ok(positions)
}

fn parse_row(fields: &[&str], positions: &[usize; 4], line_no: usize) -> ObsResult<BoundingBox> {
    let value = |i: usize| -> ObsResult<i64> {
        let field = fields[positions[i]];
        field.parse::<i64>()
            .map_err(|_| ObsError::FormatError(format!("Line {}: '{}' is not an integer", line_no, field)))
    };
    let out_of_range = || ObsError::FormatError(format!("Line {}: value out of range", line_no));

    BoundingBox::new(
        i32::try_from(value(0)?).map_err(|_| out_of_range())?,
        i32::try_from(value(1)?).map_err(|_| out_of_range())?,
        u32::try_from(value(2)?).map_err(|_| out_of_range())?,
        u32::try_from(value(3)?).map_err(|_| out_of_range())?)
        .map_err(|e| ObsError::FormatError(format!("Line {}: {}", line_no, e)))
}

fn build_header(meta: &HashMap<String, Option<String>>) -> ObsResult<DefectHeader> {
    let get = |key: &str| meta.get(key).and_then(|v| v.as_deref());
    let required = |keys: &[&str]| keys.iter()
        .find_map(|key| get(key))
        .ok_or_else(|| ObsError::FormatError(format!("ECSV metadata lacks {}", keys[0])));

    let calib_date = parse_calib_date(required(&["CALIBDATE"])?)?;
    let created_at = match get("CALIB_CREATION_DATE") {
        Some(date) => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| ObsError::FormatError(format!("Invalid CALIB_CREATION_DATE '{}': {}", date, e)))?;
            let time = match get("CALIB_CREATION_TIME") {
                Some(time) => NaiveTime::parse_from_str(time, "%H:%M:%S")
                    .map_err(|e| ObsError::FormatError(format!("Invalid CALIB_CREATION_TIME '{}': {}", time, e)))?,
                None => NaiveTime::default(),
            };
            Utc.from_utc_datetime(&date.and_time(time))
        },
        None => Utc.from_utc_datetime(&calib_date),
    };

    Ok(DefectHeader::new(
        get("INSTRUME").unwrap_or(""),
        required(&["DETECTOR"])?,
        required(&["DETECTOR_SERIAL", "SERIAL"])?,
        calib_date)
        .with_filter(get("FILTER"))
        .with_created_at(created_at))
}

/// YAML scalar for `value`; control characters force the escaped double-quoted style
fn quote(value: &str) -> String {
    if !value.chars().any(char::is_control) {
        return format!("'{}'", value.replace('\'', "''"));
    }

    let mut out = String::from("\"");
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(value: &str) -> ObsResult<String> {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        Ok(value[1..value.len() - 1].replace("''", "'"))
    } else if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        unescape(&value[1..value.len() - 1])
    } else {
        Ok(value.to_string())
    }
}

/// Resolve the escapes of a double-quoted YAML scalar
fn unescape(body: &str) -> ObsResult<String> {
    let invalid = || ObsError::FormatError(format!("Invalid escape in \"{}\"", body));
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next().ok_or_else(invalid)? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '/' => out.push('/'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            kind @ ('x' | 'u') => {
                let digits: String = chars.by_ref().take(if kind == 'x' { 2 } else { 4 }).collect();
                let code = u32::from_str_radix(&digits, 16).map_err(|_| invalid())?;
                out.push(char::from_u32(code).ok_or_else(invalid)?);
            },
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DefectMap {
        let header = DefectHeader::new("test", "0", "0000011", parse_calib_date("1970-01-01T00:00:00").unwrap())
            .with_created_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap());
        DefectMap::new(header, vec![
            BoundingBox::new(10, 20, 3, 4).unwrap(),
            BoundingBox::new(1200, 5, 1, 2000).unwrap(),
        ])
    }

    #[test]
    fn writes_calibration_metadata() {
        let text = String::from_utf8(EcsvHandler.encode(&sample()).unwrap()).unwrap();
        assert!(text.starts_with("# %ECSV 1.0\n"));
        assert!(text.contains("# - {name: height, datatype: int32}"));
        assert!(text.contains("# - {DETECTOR_SERIAL: '0000011'}"));
        assert!(text.contains("# - {FILTER: null}"));
        assert!(text.contains(
            "# - {CALIB_ID: 'detector=0 calibDate=1970-01-01T00:00:00 ccd=0 ccdnum=0 filter=None'}"));
        assert!(text.contains("# - {CALIB_CREATION_TIME: '12:30:45'}"));
        assert!(text.ends_with("x0 y0 width height\n10 20 3 4\n1200 5 1 2000\n"));
    }

    #[test]
    fn round_trips() {
        let map = sample();
        let bytes = EcsvHandler.encode(&map).unwrap();
        assert_eq!(EcsvHandler.decode(&bytes, "0").unwrap(), map);

        let mut filtered = sample();
        filtered.header.filter = Some("it's r".to_string());
        let bytes = EcsvHandler.encode(&filtered).unwrap();
        assert_eq!(EcsvHandler.decode(&bytes, "0").unwrap(), filtered);
    }

    #[test]
    fn awkward_header_strings_round_trip() {
        for serial in ["0000011 ", " 11", "it's", "a=b", "x: {y}", "00\n11", "tab\there", "back\\slash \"q\"", "\u{7f}"] {
            let mut map = sample();
            map.header.detector_serial = serial.to_string();
            map.header.instrument = format!("{}#", serial);
            let bytes = EcsvHandler.encode(&map).unwrap();
            assert_eq!(EcsvHandler.decode(&bytes, "0").unwrap(), map, "{:?}", serial);
        }
    }

    #[test]
    fn control_characters_are_escaped() {
        let mut map = sample();
        map.header.detector_serial = "00\n11".to_string();
        let text = String::from_utf8(EcsvHandler.encode(&map).unwrap()).unwrap();
        assert!(text.contains("# - {DETECTOR_SERIAL: \"00\\n11\"}"));
        assert_eq!(unescape("\\x41\\u00e9").unwrap(), "A\u{e9}");
        assert!(unescape("\\q").is_err());
    }

    #[test]
    fn reads_older_tables() {
        let legacy = "\
# %ECSV 0.9
# ---
# datatype:
# - {name: height, datatype: int64}
# - {name: x0, datatype: int64}
# - {name: width, datatype: int64}
# - {name: y0, datatype: int64}
# meta: !!omap
# - {DETECTOR: 0}
# - {SERIAL: 0000011}
# - {CALIBDATE: '1970-01-01T00:00:00'}
height x0 width y0
4 10 3 20
";
        let map = EcsvHandler.decode(legacy.as_bytes(), "0").unwrap();
        assert_eq!(map.boxes, vec![BoundingBox::new(10, 20, 3, 4).unwrap()]);
        assert_eq!(map.header.detector_serial, "0000011");
        assert_eq!(map.header.filter, None);
        assert_eq!(map.header.instrument, "");
        assert_eq!(map.header.created_at(), Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_bad_tables() {
        let bad_version = "# %ECSV 2.0\nx0 y0 width height\n";
        assert!(matches!(EcsvHandler.decode(bad_version.as_bytes(), "0"), Err(ObsError::FormatError(_))));

        assert!(matches!(EcsvHandler.decode(b"# detector=0\n", "0"), Err(ObsError::FormatError(_))));

        let text = String::from_utf8(EcsvHandler.encode(&sample()).unwrap()).unwrap();
        let short_row = format!("{}7 8 9\n", text);
        assert!(matches!(EcsvHandler.decode(short_row.as_bytes(), "0"), Err(ObsError::FormatError(_))));

        let float_row = format!("{}7 8 9.5 1\n", text);
        assert!(matches!(EcsvHandler.decode(float_row.as_bytes(), "0"), Err(ObsError::FormatError(_))));

        assert!(matches!(EcsvHandler.decode(text.as_bytes(), "1"), Err(ObsError::NotFound(_))));
    }
}
