//! Channel file lookup
//!
//! Channel images are found by name: `{prefix}_*_{raft}_{sensor}_C{y}{x}*`.
//! Raw readouts carry a five-digit run id straight after the prefix
//! (`imsim_890104911_R22_S00_C00_E000.fits`); calibration products do not
//! (`imsim_2_R22_S00_C00.fits`).

use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info};
use regex::Regex;

use crate::errors::{ObsError, ObsResult};
use crate::utils::logger::Logger;
use super::quadrant::{DataKind, Quadrant};

/// Fixed parts of channel file names
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelNaming {
    pub prefix: String,
    pub raft: String,
    pub sensor: String,
}

impl Default for ChannelNaming {
    fn default() -> Self {
        ChannelNaming {
            prefix: "imsim".to_string(),
            raft: "R22".to_string(),
            sensor: "S00".to_string(),
        }
    }
}

/// Finds the single file holding a quadrant's channel image
pub struct ChannelLocator<'a> {
    naming: ChannelNaming,
    /// Matches names of raw readouts
    raw_pattern: Regex,
    /// Logger for recording operations
    logger: &'a Logger,
}

impl<'a> ChannelLocator<'a> {
    /// Create a locator for the given naming scheme
    pub fn new(naming: ChannelNaming, logger: &'a Logger) -> ObsResult<Self> {
        let raw_pattern = Regex::new(&format!(r"^{}_\d{{5}}", regex::escape(&naming.prefix)))
            .map_err(|e| ObsError::ConfigError(format!("Invalid channel prefix: {}", e)))?;
        Ok(ChannelLocator { naming, raw_pattern, logger })
    }

    /// Glob-style description of the names accepted for a quadrant
    pub fn glob_for(&self, quadrant: Quadrant) -> String {
        format!("{}_*_{}_{}_{}*", self.naming.prefix, self.naming.raft,
                self.naming.sensor, quadrant.channel_tag())
    }

    fn pattern_for(&self, quadrant: Quadrant) -> ObsResult<Regex> {
        let pattern = format!(
            "^{}_.*_{}_{}_{}",
            regex::escape(&self.naming.prefix),
            regex::escape(&self.naming.raft),
            regex::escape(&self.naming.sensor),
            quadrant.channel_tag());
        Regex::new(&pattern)
            .map_err(|e| ObsError::ConfigError(format!("Invalid channel pattern {}: {}", pattern, e)))
    }

    /// Decide from the file name whether a channel file is raw or calibration data
    pub fn classify(&self, file_name: &str) -> DataKind {
        if self.raw_pattern.is_match(file_name) {
            DataKind::Raw
        } else {
            DataKind::Calibration
        }
    }

    /// Find the channel file for `quadrant` in `dir`
    ///
    /// # Arguments
    /// * `dir` - Directory holding the channel images
    /// * `quadrant` - Quadrant to look up
    /// * `expected` - Kind of data the caller needs
    ///
    /// # Returns
    /// The path of the only matching file. Fails with `NotFound` when no file
    /// matches, `AmbiguousMatch` when several do and `WrongKind` when the
    /// match holds the other kind of data.
    pub fn locate(&self, dir: &Path, quadrant: Quadrant, expected: DataKind) -> ObsResult<PathBuf> {
        let pattern = self.pattern_for(quadrant)?;
        debug!("Looking for {} in {}", self.glob_for(quadrant), dir.display());

        let mut matches = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if pattern.is_match(name) {
                matches.push(entry.path());
            }
        }
        matches.sort();

        let path = match matches.len() {
            0 => {
                return Err(ObsError::NotFound(format!(
                    "no file matching {} in {} for channel {}",
                    self.glob_for(quadrant), dir.display(), quadrant)));
            },
            1 => matches.remove(0),
            _ => {
                return Err(ObsError::AmbiguousMatch {
                    pattern: dir.join(self.glob_for(quadrant)).display().to_string(),
                    matches,
                });
            }
        };

        let file_name = path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let found = self.classify(file_name);
        if found != expected {
            return Err(ObsError::WrongKind { path, expected, found });
        }

        info!("Located channel {} as {}", quadrant, file_name);
        self.logger.log(&format!("channel {} -> {}", quadrant, path.display()))?;
        Ok(path)
    }
}
