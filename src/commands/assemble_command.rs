//! Mosaic assembly command
//!
//! Builds a full-detector image from the four channel files in a directory
//! and writes it through the FITS image store.

use std::path::PathBuf;
use clap::ArgMatches;
use log::info;

use crate::assembly::{ChannelLocator, DataKind, MosaicAssembler, SubframeExtractor};
use crate::commands::command_traits::Command;
use crate::config::ObsConfig;
use crate::errors::{ObsError, ObsResult};
use crate::fits::{FitsImageStore, ImageStore};
use crate::image::{MetaValue, Metadata};
use crate::utils::logger::Logger;

/// Command for assembling channel images into a mosaic
pub struct AssembleCommand<'a> {
    /// Directory holding the channel files
    input_dir: PathBuf,
    /// Where the mosaic is written
    output_file: PathBuf,
    /// Raw or calibration channels
    kind: DataKind,
    /// Header values applied where channel (0, 0) has none
    defaults: Metadata,
    config: ObsConfig,
    /// Logger for recording operations
    logger: &'a Logger,
}

impl<'a> AssembleCommand<'a> {
    /// Create a new assemble command
    ///
    /// # Arguments
    /// * `args` - CLI argument matches from clap
    /// * `config` - Effective configuration
    /// * `kind` - Whether raw or calibration channels are assembled
    /// * `logger` - Logger for recording operations
    pub fn new(args: &ArgMatches, config: ObsConfig, kind: DataKind, logger: &'a Logger) -> ObsResult<Self> {
        let input_dir = PathBuf::from(super::input_path(args)?);

        let output_file = match args.get_one::<String>("output") {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(default_output(&config, kind)),
        };

        let pairs: Vec<String> = args.get_many::<String>("defaults")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        let defaults = parse_header_defaults(&pairs)?;

        Ok(AssembleCommand {
            input_dir,
            output_file,
            kind,
            defaults,
            config,
            logger,
        })
    }
}

impl<'a> Command for AssembleCommand<'a> {
    fn execute(&self) -> ObsResult<()> {
        let store = FitsImageStore::new(self.logger, &self.config.bands);
        let locator = ChannelLocator::new(self.config.assembly.naming.clone(), self.logger)?;
        let assembler = MosaicAssembler::new(
            &store,
            &locator,
            SubframeExtractor::new(self.config.assembly.sub_height),
            self.logger,
        ).with_progress(true);

        let mosaic = assembler.assemble(&self.input_dir, self.kind, &self.defaults)?;
        store.write_image(&self.output_file, &mosaic)?;

        info!("Wrote {}x{} {} mosaic to {}",
              mosaic.width(), mosaic.height(), self.kind, self.output_file.display());
        Ok(())
    }
}

/// Parse `KEY=VALUE` header defaults
///
/// Values are typed the way header cards are: `T`/`F` and `true`/`false`
/// become booleans, then integers and floats are tried, and anything else
/// (optionally single-quoted) is a string.
pub fn parse_header_defaults(pairs: &[String]) -> ObsResult<Metadata> {
    let mut defaults = Metadata::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| ObsError::GenericError(format!(
                "Invalid header default '{}'; expected KEY=VALUE", pair)))?;
        defaults.set(&key.to_uppercase(), parse_header_value(value));
    }
    Ok(defaults)
}

fn parse_header_value(value: &str) -> MetaValue {
    match value {
        "T" | "true" => return MetaValue::Bool(true),
        "F" | "false" => return MetaValue::Bool(false),
        _ => {}
    }
    if let Ok(int) = value.parse::<i64>() {
        return MetaValue::Int(int);
    }
    if let Ok(float) = value.parse::<f64>() {
        return MetaValue::Float(float);
    }
    let unquoted = value.strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);
    MetaValue::Str(unquoted.to_string())
}

/// Configured output file for mosaics of `kind`
pub fn default_output(config: &ObsConfig, kind: DataKind) -> &str {
    match kind {
        DataKind::Calibration => &config.assembly.calib_output,
        DataKind::Raw => &config.assembly.raw_output,
    }
}
