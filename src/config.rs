//! Configuration file support
//!
//! Settings come from an optional TOML file with `[assembly]`, `[defects]`
//! and `[bands]` tables. Every key is optional; missing keys keep their
//! defaults. Command line flags are applied on top by the commands.

use std::fs;
use std::path::Path;
use chrono::NaiveDateTime;
use log::debug;

use crate::assembly::{ChannelNaming, DEFAULT_SUB_HEIGHT};
use crate::defects::parse_calib_date;
use crate::errors::{ObsError, ObsResult};
use crate::image::BandRegistry;

/// Settings for mosaic assembly
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyConfig {
    /// Rows kept from the top of each channel
    pub sub_height: u32,
    pub naming: ChannelNaming,
    /// Output file for calibration mosaics
    pub calib_output: String,
    /// Output file for raw mosaics
    pub raw_output: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        AssemblyConfig {
            sub_height: DEFAULT_SUB_HEIGHT,
            naming: ChannelNaming::default(),
            calib_output: "image.fits".to_string(),
            raw_output: "raw.fits".to_string(),
        }
    }
}

/// Settings for defect extraction
#[derive(Debug, Clone, PartialEq)]
pub struct DefectsConfig {
    pub instrument: String,
    pub detector_name: String,
    pub detector_serial: String,
    pub calib_date: NaiveDateTime,
    /// Mask plane whose pixels are defects
    pub mask_plane: String,
    pub output: String,
}

impl Default for DefectsConfig {
    fn default() -> Self {
        DefectsConfig {
            instrument: "test".to_string(),
            detector_name: "0".to_string(),
            detector_serial: "0000011".to_string(),
            calib_date: NaiveDateTime::default(),
            mask_plane: "BAD".to_string(),
            output: "defects_c0.ecsv".to_string(),
        }
    }
}

/// Complete tool configuration
#[derive(Debug, Clone)]
pub struct ObsConfig {
    pub assembly: AssemblyConfig,
    pub defects: DefectsConfig,
    pub bands: BandRegistry,
}

impl Default for ObsConfig {
    fn default() -> Self {
        ObsConfig {
            assembly: AssemblyConfig::default(),
            defects: DefectsConfig::default(),
            bands: BandRegistry::with_defaults(),
        }
    }
}

impl ObsConfig {
    /// Parse configuration from TOML text
    pub fn from_str(content: &str) -> ObsResult<Self> {
        let toml_value: toml::Value = match content.parse() {
            Ok(value) => value,
            Err(e) => return Err(ObsError::ConfigError(format!("Failed to parse TOML: {}", e))),
        };

        let mut config = ObsConfig::default();

        if let Some(table) = section(&toml_value, "assembly")? {
            let assembly = &mut config.assembly;
            if let Some(value) = get_int(table, "assembly", "sub_height")? {
                assembly.sub_height = u32::try_from(value)
                    .ok()
                    .filter(|&h| h > 0)
                    .ok_or_else(|| ObsError::ConfigError(format!(
                        "assembly.sub_height must be a positive integer, got {}", value)))?;
            }
            set_string(table, "assembly", "channel_prefix", &mut assembly.naming.prefix)?;
            set_string(table, "assembly", "raft", &mut assembly.naming.raft)?;
            set_string(table, "assembly", "sensor", &mut assembly.naming.sensor)?;
            set_string(table, "assembly", "calib_output", &mut assembly.calib_output)?;
            set_string(table, "assembly", "raw_output", &mut assembly.raw_output)?;
        }

        if let Some(table) = section(&toml_value, "defects")? {
            let defects = &mut config.defects;
            set_string(table, "defects", "instrument", &mut defects.instrument)?;
            set_string(table, "defects", "detector_name", &mut defects.detector_name)?;
            set_string(table, "defects", "detector_serial", &mut defects.detector_serial)?;
            set_string(table, "defects", "mask_plane", &mut defects.mask_plane)?;
            set_string(table, "defects", "output", &mut defects.output)?;
            if let Some(date) = get_str(table, "defects", "calib_date")? {
                defects.calib_date = parse_calib_date(date)
                    .map_err(|e| ObsError::ConfigError(format!("defects.calib_date: {}", e)))?;
            }
        }

        if let Some(table) = section(&toml_value, "bands")? {
            config.bands = parse_bands(table)?;
        }

        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> ObsResult<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return Err(ObsError::ConfigError(format!("Cannot read {}: {}", path.display(), e))),
        };

        Self::from_str(&contents)
    }
}

type Table = toml::map::Map<String, toml::Value>;

fn section<'v>(root: &'v toml::Value, name: &str) -> ObsResult<Option<&'v Table>> {
    match root.get(name) {
        None => Ok(None),
        Some(value) => value.as_table()
            .map(Some)
            .ok_or_else(|| ObsError::ConfigError(format!("[{}] must be a table", name))),
    }
}

fn get_str<'v>(table: &'v Table, section: &str, key: &str) -> ObsResult<Option<&'v str>> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value.as_str()
            .map(Some)
            .ok_or_else(|| ObsError::ConfigError(format!("{}.{} must be a string", section, key))),
    }
}

fn get_int(table: &Table, section: &str, key: &str) -> ObsResult<Option<i64>> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value.as_integer()
            .map(Some)
            .ok_or_else(|| ObsError::ConfigError(format!("{}.{} must be an integer", section, key))),
    }
}

fn set_string(table: &Table, section: &str, key: &str, target: &mut String) -> ObsResult<()> {
    if let Some(value) = get_str(table, section, key)? {
        *target = value.to_string();
    }
    Ok(())
}

/// Band table: canonical name to list of aliases
fn parse_bands(table: &Table) -> ObsResult<BandRegistry> {
    let mut registry = BandRegistry::new();
    for (name, aliases) in table {
        let aliases = aliases.as_array()
            .ok_or_else(|| ObsError::ConfigError(format!("bands.{} must be a list of aliases", name)))?
            .iter()
            .map(|alias| alias.as_str()
                .ok_or_else(|| ObsError::ConfigError(format!("bands.{} aliases must be strings", name))))
            .collect::<ObsResult<Vec<&str>>>()?;
        registry.define(name, &aliases)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Band;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ObsConfig::from_str("").unwrap();
        assert_eq!(config.assembly, AssemblyConfig::default());
        assert_eq!(config.defects, DefectsConfig::default());
        assert_eq!(config.assembly.sub_height, 1000);
        assert_eq!(config.defects.calib_date.to_string(), "1970-01-01 00:00:00");
        assert_eq!(config.bands.lookup("Y"), Some(Band::new("y")));
    }

    #[test]
    fn reads_every_section() {
        let config = ObsConfig::from_str(r#"
            [assembly]
            sub_height = 500
            channel_prefix = "phosim"
            raw_output = "mosaic_raw.fits"

            [defects]
            detector_serial = "ITL-3800C-002"
            calib_date = "2021-06-01"
            output = "defects.fits"

            [bands]
            HSC-R = ["r2", "HSC_R"]
        "#).unwrap();

        assert_eq!(config.assembly.sub_height, 500);
        assert_eq!(config.assembly.naming.prefix, "phosim");
        assert_eq!(config.assembly.naming.raft, "R22");
        assert_eq!(config.assembly.raw_output, "mosaic_raw.fits");
        assert_eq!(config.defects.detector_serial, "ITL-3800C-002");
        assert_eq!(config.defects.calib_date.to_string(), "2021-06-01 00:00:00");
        assert_eq!(config.defects.instrument, "test");
        assert_eq!(config.bands.lookup("HSC_R"), Some(Band::new("HSC-R")));
        assert_eq!(config.bands.lookup("r"), None);
    }

    #[test]
    fn wrong_types_are_config_errors() {
        for text in [
            "[assembly]\nsub_height = \"tall\"",
            "[assembly]\nsub_height = 0",
            "[defects]\ninstrument = 3",
            "[defects]\ncalib_date = \"someday\"",
            "assembly = 4",
            "[bands]\nr = \"R\"",
            "[bands]\nr = [\"R\"]\ng = [\"R\"]",
            "not toml at all [",
        ] {
            assert!(matches!(ObsConfig::from_str(text), Err(ObsError::ConfigError(_))), "{}", text);
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = ObsConfig::from_file(Path::new("/nonexistent/obsmosaic.toml"));
        assert!(matches!(result, Err(ObsError::ConfigError(_))));
    }
}
