//! File analysis command
//!
//! Prints a summary of an image file or a defect file. Defect files are
//! recognized by extension; `.fits` files count as defect tables when they
//! carry a binary table extension.

use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use clap::ArgMatches;
use log::{debug, info};

use crate::commands::command_traits::Command;
use crate::config::ObsConfig;
use crate::defects::{DefectCodec, DefectFormat, DefectMap};
use crate::errors::ObsResult;
use crate::fits::constants::xtension;
use crate::fits::{hdu, FitsImageStore, ImageStore};
use crate::image::Image;
use crate::utils::logger::Logger;

/// Command for summarizing an image or defect file
pub struct AnalyzeCommand<'a> {
    /// Path to the input file
    input_file: PathBuf,
    /// Whether to list every header card and defect box
    verbose: bool,
    config: ObsConfig,
    /// Logger for recording operations
    logger: &'a Logger,
}

impl<'a> AnalyzeCommand<'a> {
    /// Create a new analyze command
    ///
    /// # Arguments
    /// * `args` - CLI argument matches from clap
    /// * `config` - Effective configuration
    /// * `logger` - Logger for recording operations
    pub fn new(args: &ArgMatches, config: ObsConfig, logger: &'a Logger) -> ObsResult<Self> {
        Ok(AnalyzeCommand {
            input_file: PathBuf::from(super::input_path(args)?),
            verbose: args.get_flag("verbose"),
            config,
            logger,
        })
    }
}

impl<'a> Command for AnalyzeCommand<'a> {
    fn execute(&self) -> ObsResult<()> {
        let summary = analyze_path(&self.input_file, &self.config, self.verbose, self.logger)?;
        print!("{}", summary);
        Ok(())
    }
}

/// Summary of the image or defect file at `path`
pub fn analyze_path(path: &Path, config: &ObsConfig, verbose: bool, logger: &Logger) -> ObsResult<String> {
    if is_defect_file(path)? {
        info!("Analyzing defect file {}", path.display());
        let maps = DefectCodec::new(logger).read_all(path)?;
        Ok(describe_defects(path, &maps, verbose))
    } else {
        info!("Analyzing image {}", path.display());
        let image = FitsImageStore::new(logger, &config.bands).read_image(path)?;
        Ok(describe_image(path, &image, verbose))
    }
}

/// Whether `path` holds defects rather than an image
pub fn is_defect_file(path: &Path) -> ObsResult<bool> {
    match DefectFormat::from_path(path) {
        Some(DefectFormat::Table) => {
            let mut reader = BufReader::new(File::open(path)?);
            let units = hdu::read_hdus(&mut reader)?;
            Ok(units.iter().any(|unit| unit.xtension() == Some(xtension::BINTABLE)))
        }
        Some(_) => Ok(true),
        None => {
            debug!("{} has no defect file extension; treating it as an image", path.display());
            Ok(false)
        }
    }
}

pub fn describe_image(path: &Path, image: &Image, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Image {}", path.display());
    let _ = writeln!(out, "  Dimensions: {}x{}", image.width(), image.height());
    for plane in image.planes() {
        let _ = writeln!(out, "  Plane {}: {} samples{}",
                         plane.kind, plane.pixels.kind(),
                         if plane.pixels.is_all_zero() { " (all zero)" } else { "" });
    }
    let _ = writeln!(out, "  Filter: {}",
                     image.filter.as_ref().map_or("none".to_string(), |band| band.to_string()));
    let wcs_cards = image.wcs.as_ref().map_or(0, |wcs| wcs.cards().len());
    let _ = writeln!(out, "  WCS cards: {}", wcs_cards);
    let _ = writeln!(out, "  Header cards: {}", image.metadata.len());

    if verbose {
        for (key, value) in image.metadata.iter() {
            let _ = writeln!(out, "    {:<8} = {}", key, value);
        }
    }
    out
}

pub fn describe_defects(path: &Path, maps: &[DefectMap], verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Defect file {} ({} detector(s))", path.display(), maps.len());
    for map in maps {
        let header = &map.header;
        let _ = writeln!(out, "  Detector {} (serial {}, instrument {})",
                         header.detector_name, header.detector_serial, header.instrument);
        let _ = writeln!(out, "    {}", map);
        let _ = writeln!(out, "    Created: {}", header.created_at().to_rfc3339());
        if let Some((first, second)) = map.find_overlap() {
            let _ = writeln!(out, "    Warning: boxes {} and {} overlap", map.boxes[first], map.boxes[second]);
        }

        if verbose {
            for bbox in &map.boxes {
                let _ = writeln!(out, "    {}", bbox);
            }
        }
    }
    out
}
