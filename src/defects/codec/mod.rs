//! Defect file formats
//!
//! This module implements strategies for the persisted defect formats. The
//! format of a file follows from its extension; every reader also checks the
//! leading bytes and refuses data of another format.

mod ecsv;
mod factory;
mod handler;
mod table;
mod text;

pub use ecsv::EcsvHandler;
pub use factory::DefectFormatFactory;
pub use handler::{select_detector, DefectFormat, DefectFormatHandler};
pub use table::TableHandler;
pub use text::TextHandler;

use std::fs;
use std::path::Path;
use log::info;

use crate::errors::{ObsError, ObsResult};
use crate::utils::logger::Logger;
use super::DefectMap;

/// Reads and writes defect maps in any supported format
pub struct DefectCodec<'a> {
    /// Logger for recording operations
    logger: &'a Logger,
}

impl<'a> DefectCodec<'a> {
    pub fn new(logger: &'a Logger) -> Self {
        DefectCodec { logger }
    }

    /// Serialize one map in `format`
    pub fn encode(&self, map: &DefectMap, format: DefectFormat) -> ObsResult<Vec<u8>> {
        DefectFormatFactory::create_handler(format).encode(map)
    }

    /// Parse the map of `detector` from data in `format`
    pub fn decode(&self, data: &[u8], format: DefectFormat, detector: &str) -> ObsResult<DefectMap> {
        DefectFormatFactory::create_handler(format).decode(data, detector)
    }

    /// Write maps to `path` in the format its extension names
    pub fn write(&self, path: &Path, maps: &[DefectMap]) -> ObsResult<DefectFormat> {
        let handler = DefectFormatFactory::get_handler_for_path(path)?;
        let bytes = handler.encode_many(maps)?;
        fs::write(path, &bytes)?;

        info!("Wrote {} detector(s) to {} as {}", maps.len(), path.display(), handler.name());
        self.logger.log(&format!("Wrote defects {} ({} bytes)", path.display(), bytes.len()))?;
        Ok(handler.format())
    }

    /// Every detector stored in `path`
    pub fn read_all(&self, path: &Path) -> ObsResult<Vec<DefectMap>> {
        let handler = DefectFormatFactory::get_handler_for_path(path)?;
        let bytes = fs::read(path)?;
        let maps = handler.decode_all(&bytes)?;

        info!("Read {} detector(s) from {} as {}", maps.len(), path.display(), handler.name());
        self.logger.log(&format!("Read defects {}", path.display()))?;
        Ok(maps)
    }

    /// The map of `detector` stored in `path`
    pub fn read(&self, path: &Path, detector: &str) -> ObsResult<DefectMap> {
        let maps = self.read_all(path)?;
        select_detector(maps, detector, &path.display().to_string())
    }

    /// Write `map` to a file that must not exist yet, then read it back
    ///
    /// Fails if the file is already there, or if the map read back differs
    /// from the one written.
    pub fn write_verified(&self, path: &Path, map: &DefectMap) -> ObsResult<DefectFormat> {
        if path.exists() {
            return Err(ObsError::GenericError(format!(
                "{} already exists; refusing to overwrite", path.display())));
        }

        let format = self.write(path, std::slice::from_ref(map))?;
        let reread = self.read(path, &map.header.detector_name)?;
        if &reread != map {
            return Err(ObsError::FormatError(format!(
                "{} did not read back as written ({} box(es) written, {} read)",
                path.display(), map.len(), reread.len())));
        }

        info!("Verified {} defect(s) in {}", map.len(), path.display());
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defects::{parse_calib_date, DefectHeader};
    use crate::geom::BoundingBox;

    fn sample(name: &str) -> DefectMap {
        let header = DefectHeader::new("test", name, "0000011", parse_calib_date("1970-01-01T00:00:00").unwrap())
            .with_filter(Some("g"));
        DefectMap::new(header, vec![
            BoundingBox::new(0, 0, 1, 1).unwrap(),
            BoundingBox::new(5, 9, 12, 3).unwrap(),
            BoundingBox::new(-2, 40, 2, 100).unwrap(),
        ])
    }

    #[test]
    fn every_format_round_trips() {
        let logger = Logger::disabled();
        let codec = DefectCodec::new(&logger);
        let map = sample("0");
        for format in [DefectFormat::Table, DefectFormat::Text, DefectFormat::Ecsv] {
            let bytes = codec.encode(&map, format).unwrap();
            assert_eq!(codec.decode(&bytes, format, "0").unwrap(), map, "{}", format);
        }
    }

    #[test]
    fn readers_refuse_other_formats() {
        let logger = Logger::disabled();
        let codec = DefectCodec::new(&logger);
        let map = sample("0");
        for written in [DefectFormat::Table, DefectFormat::Text, DefectFormat::Ecsv] {
            let bytes = codec.encode(&map, written).unwrap();
            for read in [DefectFormat::Table, DefectFormat::Text, DefectFormat::Ecsv] {
                if read != written {
                    let result = codec.decode(&bytes, read, "0");
                    assert!(matches!(result, Err(ObsError::FormatError(_))), "{} as {}", written, read);
                }
            }
        }
    }

    #[test]
    fn files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::disabled();
        let codec = DefectCodec::new(&logger);
        let first = sample("0");
        let second = sample("1");

        let path = dir.path().join("defects_c0.ecsv");
        assert_eq!(codec.write(&path, std::slice::from_ref(&first)).unwrap(), DefectFormat::Ecsv);
        assert_eq!(codec.read(&path, "0").unwrap(), first);

        let table = dir.path().join("defects.fits");
        codec.write(&table, &[first.clone(), second.clone()]).unwrap();
        assert_eq!(codec.read_all(&table).unwrap(), vec![first.clone(), second.clone()]);
        match codec.read(&table, "7") {
            Err(ObsError::NotFound(msg)) => assert!(msg.contains("defects.fits")),
            other => panic!("expected NotFound, got {:?}", other),
        }

        let text = dir.path().join("defects.dat");
        assert!(codec.write(&text, &[first, second]).is_err());
    }

    #[test]
    fn verified_write_refuses_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::disabled();
        let codec = DefectCodec::new(&logger);
        let map = sample("0");

        let path = dir.path().join("defects_c0.dat");
        assert_eq!(codec.write_verified(&path, &map).unwrap(), DefectFormat::Text);
        assert_eq!(codec.read(&path, "0").unwrap(), map);

        let result = codec.write_verified(&path, &map);
        assert!(matches!(result, Err(ObsError::GenericError(_))));
    }
}
