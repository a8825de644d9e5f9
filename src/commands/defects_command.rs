//! Defect extraction command
//!
//! Turns the bad-pixel mask of an image into a defect file and checks that
//! the file reads back to the same defect list.

use std::path::PathBuf;
use clap::ArgMatches;
use log::info;

use crate::commands::command_traits::Command;
use crate::config::{DefectsConfig, ObsConfig};
use crate::defects::{defects_from_image, DefectCodec, DefectHeader};
use crate::errors::ObsResult;
use crate::fits::{FitsImageStore, ImageStore};
use crate::utils::logger::Logger;

/// Command for writing the defects of an image's mask plane
pub struct DefectsCommand<'a> {
    /// Image carrying the mask plane
    input_file: PathBuf,
    /// Defect file to create
    output_file: PathBuf,
    config: ObsConfig,
    /// Logger for recording operations
    logger: &'a Logger,
}

impl<'a> DefectsCommand<'a> {
    /// Create a new defects command
    ///
    /// # Arguments
    /// * `args` - CLI argument matches from clap
    /// * `config` - Effective configuration
    /// * `logger` - Logger for recording operations
    pub fn new(args: &ArgMatches, config: ObsConfig, logger: &'a Logger) -> ObsResult<Self> {
        let input_file = PathBuf::from(super::input_path(args)?);
        let output_file = PathBuf::from(args.get_one::<String>("output")
            .unwrap_or(&config.defects.output));

        Ok(DefectsCommand {
            input_file,
            output_file,
            config,
            logger,
        })
    }
}

impl<'a> Command for DefectsCommand<'a> {
    fn execute(&self) -> ObsResult<()> {
        let store = FitsImageStore::new(self.logger, &self.config.bands);
        let image = store.read_image(&self.input_file)?;

        let header = defect_header(&self.config.defects);
        let map = defects_from_image(&image, &self.config.defects.mask_plane, header)?;

        let format = DefectCodec::new(self.logger).write_verified(&self.output_file, &map)?;
        info!("Wrote {} to {} as {}", map, self.output_file.display(), format);
        Ok(())
    }
}

/// Header for extracted defects; the band of the source image is not recorded
pub fn defect_header(config: &DefectsConfig) -> DefectHeader {
    DefectHeader::new(
        &config.instrument,
        &config.detector_name,
        &config.detector_serial,
        config.calib_date,
    )
}
