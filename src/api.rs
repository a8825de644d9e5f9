use std::path::Path;
use log::info;

use crate::assembly::{ChannelLocator, DataKind, MosaicAssembler, SubframeExtractor};
use crate::commands::analyze_command::analyze_path;
use crate::commands::defects_command::defect_header;
use crate::config::ObsConfig;
use crate::defects::{defects_from_image, DefectCodec, DefectMap};
use crate::errors::ObsResult;
use crate::fits::{FitsImageStore, ImageStore};
use crate::image::{Image, Metadata};
use crate::utils::logger::Logger;

/// Main interface to the obsmosaic library
pub struct ObsMosaic {
    logger: Logger,
    config: ObsConfig,
}

impl ObsMosaic {
    /// Create a new ObsMosaic instance
    ///
    /// # Arguments
    /// * `log_file` - Optional path to a log file; without one nothing is recorded
    /// * `config` - Settings used by every operation
    ///
    /// # Returns
    /// An ObsMosaic instance or an error if the log file cannot be created
    pub fn new(log_file: Option<&str>, config: ObsConfig) -> ObsResult<Self> {
        let logger = match log_file {
            Some(path) => Logger::new(path)?,
            None => Logger::disabled(),
        };
        Ok(ObsMosaic { logger, config })
    }

    pub fn config(&self) -> &ObsConfig {
        &self.config
    }

    /// Assemble the channel images in `dir` into one detector image
    ///
    /// # Arguments
    /// * `dir` - Directory holding the four channel files
    /// * `kind` - Whether raw or calibration channels are expected
    /// * `defaults` - Header values used only where channel (0, 0) has none
    pub fn assemble(&self, dir: &Path, kind: DataKind, defaults: &Metadata) -> ObsResult<Image> {
        let store = FitsImageStore::new(&self.logger, &self.config.bands);
        let locator = ChannelLocator::new(self.config.assembly.naming.clone(), &self.logger)?;
        let assembler = MosaicAssembler::new(
            &store,
            &locator,
            SubframeExtractor::new(self.config.assembly.sub_height),
            &self.logger,
        );
        assembler.assemble(dir, kind, defaults)
    }

    /// Assemble the channels in `dir` and write the mosaic to `output`
    pub fn assemble_to_file(&self, dir: &Path, kind: DataKind, defaults: &Metadata, output: &Path) -> ObsResult<Image> {
        let mosaic = self.assemble(dir, kind, defaults)?;
        self.write_image(output, &mosaic)?;
        info!("Wrote mosaic to {}", output.display());
        Ok(mosaic)
    }

    pub fn read_image(&self, path: &Path) -> ObsResult<Image> {
        FitsImageStore::new(&self.logger, &self.config.bands).read_image(path)
    }

    pub fn write_image(&self, path: &Path, image: &Image) -> ObsResult<()> {
        FitsImageStore::new(&self.logger, &self.config.bands).write_image(path, image)
    }

    /// Defects in the configured mask plane of the image at `image_path`
    pub fn find_defects(&self, image_path: &Path) -> ObsResult<DefectMap> {
        let image = self.read_image(image_path)?;
        let header = defect_header(&self.config.defects);
        defects_from_image(&image, &self.config.defects.mask_plane, header)
    }

    /// Find the defects of an image and save them to a new file
    ///
    /// The file format follows from the extension of `output`. The written
    /// file is read back and compared with the extracted defects.
    pub fn write_defects(&self, image_path: &Path, output: &Path) -> ObsResult<DefectMap> {
        let map = self.find_defects(image_path)?;
        DefectCodec::new(&self.logger).write_verified(output, &map)?;
        Ok(map)
    }

    /// Read the defects of `detector` from a defect file
    pub fn read_defects(&self, path: &Path, detector: &str) -> ObsResult<DefectMap> {
        DefectCodec::new(&self.logger).read(path, detector)
    }

    /// Summarize an image or defect file
    ///
    /// # Returns
    /// String containing analysis information or an error
    pub fn analyze(&self, path: &Path, verbose: bool) -> ObsResult<String> {
        analyze_path(path, &self.config, verbose, &self.logger)
    }
}
