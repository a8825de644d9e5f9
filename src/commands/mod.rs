//! CLI command implementations
//!
//! The command line is a flat set of flags; `ObsCommandFactory` turns the
//! action flag into one of the commands below.

pub mod command_traits;
pub mod analyze_command;
pub mod assemble_command;
pub mod defects_command;

pub use command_traits::{Command, CommandFactory};
pub use analyze_command::AnalyzeCommand;
pub use assemble_command::AssembleCommand;
pub use defects_command::DefectsCommand;

use std::path::Path;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};
use log::debug;

use crate::assembly::DataKind;
use crate::config::ObsConfig;
use crate::errors::{ObsError, ObsResult};
use crate::utils::logger::Logger;

/// Argument definitions of the `obsmosaic` binary
pub fn build_cli() -> ClapCommand {
    ClapCommand::new("obsmosaic")
        .version("0.1")
        .about("Assemble detector channel mosaics and extract defect regions")
        .arg(
            Arg::new("input")
                .help("Channel directory, image file or defect file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("defaults")
                .help("Default header values for the mosaic, as KEY=VALUE")
                .value_name("KEY=VALUE")
                .num_args(0..)
                .index(2),
        )
        .arg(
            Arg::new("assemble")
                .long("assemble")
                .help("Assemble a mosaic from a directory of calibration channel images")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("assemble-raw")
                .long("assemble-raw")
                .help("Assemble a mosaic from a directory of raw channel images")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("defects")
                .long("defects")
                .help("Extract defect regions from the mask plane of an image")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Output file")
                .value_name("FILE")
                .required(false),
        )
        .arg(
            Arg::new("sub-height")
                .long("sub-height")
                .help("Rows kept from the top of each channel")
                .value_name("ROWS")
                .value_parser(value_parser!(u32).range(1..))
                .required(false),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML configuration file")
                .value_name("FILE")
                .required(false),
        )
        .arg(
            Arg::new("detector")
                .long("detector")
                .help("Detector name")
                .value_name("NAME")
                .required(false),
        )
        .arg(
            Arg::new("mask-plane")
                .long("mask-plane")
                .help("Mask plane holding the defects")
                .value_name("NAME")
                .required(false),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write log output to this file instead of the console")
                .value_name("FILE")
                .required(false),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose output")
                .action(ArgAction::SetTrue),
        )
}

/// Configuration from `--config`, with command line overrides applied
pub fn config_from_args(args: &ArgMatches) -> ObsResult<ObsConfig> {
    let mut config = match args.get_one::<String>("config") {
        Some(path) => ObsConfig::from_file(Path::new(path))?,
        None => ObsConfig::default(),
    };

    if let Some(&sub_height) = args.get_one::<u32>("sub-height") {
        config.assembly.sub_height = sub_height;
    }
    if let Some(detector) = args.get_one::<String>("detector") {
        config.defects.detector_name = detector.clone();
    }
    if let Some(plane) = args.get_one::<String>("mask-plane") {
        config.defects.mask_plane = plane.clone();
    }

    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Path of the positional input argument
pub(crate) fn input_path(args: &ArgMatches) -> ObsResult<String> {
    args.get_one::<String>("input")
        .cloned()
        .ok_or_else(|| ObsError::GenericError("Missing input path".to_string()))
}

/// Factory for creating command instances based on CLI arguments
pub struct ObsCommandFactory;

impl ObsCommandFactory {
    /// Create a new factory instance
    pub fn new() -> Self {
        ObsCommandFactory
    }
}

impl Default for ObsCommandFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CommandFactory<'a> for ObsCommandFactory {
    fn create_command(&self, args: &ArgMatches, logger: &'a Logger) -> ObsResult<Box<dyn Command + 'a>> {
        let actions = ["assemble", "assemble-raw", "defects"];
        let chosen: Vec<&str> = actions.iter().copied().filter(|a| args.get_flag(a)).collect();
        if chosen.len() > 1 {
            return Err(ObsError::GenericError(format!(
                "Choose one of --{}", chosen.join(", --"))));
        }

        let config = config_from_args(args)?;
        match chosen.first() {
            Some(&"assemble") => Ok(Box::new(AssembleCommand::new(args, config, DataKind::Calibration, logger)?)),
            Some(&"assemble-raw") => Ok(Box::new(AssembleCommand::new(args, config, DataKind::Raw, logger)?)),
            Some(_) => Ok(Box::new(DefectsCommand::new(args, config, logger)?)),
            // Default to analyze command
            None => Ok(Box::new(AnalyzeCommand::new(args, config, logger)?)),
        }
    }
}
