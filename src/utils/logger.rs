//! Logger utility for application-wide logging
//!
//! This module provides a file-backed logger that works alongside the
//! standard log crate. Components that touch the filesystem take a `&Logger`
//! and record the files they read and write through it.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use log::{Level, Log, Metadata, Record};

/// File-backed logger
pub struct Logger {
    /// File handle for log output; None discards messages
    file: Mutex<Option<File>>,
    /// Most verbose level passed through the log facade
    level: Level,
}

impl Logger {
    /// Creates a new logger instance
    ///
    /// # Arguments
    ///
    /// * `log_file` - Path to the log file (truncated if it exists)
    ///
    /// # Returns
    ///
    /// A new Logger instance or an error if the file cannot be created
    pub fn new(log_file: &str) -> io::Result<Self> {
        let file = File::create(Path::new(log_file))?;
        Ok(Logger {
            file: Mutex::new(Some(file)),
            level: Level::Info,
        })
    }

    /// A logger that discards everything
    pub fn disabled() -> Self {
        Logger {
            file: Mutex::new(None),
            level: Level::Info,
        }
    }

    /// Set the most verbose level accepted from the log facade
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Logs a message to the log file
    ///
    /// # Arguments
    ///
    /// * `message` - The message to log
    pub fn log(&self, message: &str) -> io::Result<()> {
        let mut guard = self.file.lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        if let Some(file) = guard.as_mut() {
            writeln!(file, "{}", message)?;
            file.flush()?;
        }
        Ok(())
    }

    /// A second logger writing to the same file at the same level
    pub fn try_clone(&self) -> io::Result<Self> {
        let guard = self.file.lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        let file = match guard.as_ref() {
            Some(file) => Some(file.try_clone()?),
            None => None,
        };
        Ok(Logger {
            file: Mutex::new(file),
            level: self.level,
        })
    }

    /// Install a copy of this logger as the global `log` backend
    ///
    /// Facade records and the messages passed to [`Logger::log`] end up in
    /// the same file.
    pub fn install_global(&self) -> io::Result<()> {
        let global_logger = self.try_clone()?;

        if log::set_boxed_logger(Box::new(global_logger)).is_err() {
            eprintln!("Warning: Global logger was already initialized");
        }

        log::set_max_level(self.level.to_level_filter());
        Ok(())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("[{}] {}", record.level(), record.args());
            let _ = Logger::log(self, &message);

            // Warnings and errors also go to the console
            if record.level() <= Level::Warn {
                eprintln!("{}", message);
            }
        }
    }

    fn flush(&self) {
        // Already flushing in the log method
    }
}

/// Log level matching the verbosity flag
pub fn level_for(verbose: bool) -> Level {
    if verbose { Level::Debug } else { Level::Info }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_messages_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let logger = Logger::new(path.to_str().unwrap()).unwrap();
        logger.log("first").unwrap();
        logger.log("second").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn clones_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.log");
        let logger = Logger::new(path.to_str().unwrap()).unwrap().with_level(Level::Debug);
        let copy = logger.try_clone().unwrap();
        assert_eq!(copy.level, Level::Debug);

        logger.log("Read image a.fits").unwrap();
        copy.log("[INFO] assembled").unwrap();
        logger.log("Wrote image b.fits").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Read image a.fits\n[INFO] assembled\nWrote image b.fits\n");
    }

    #[test]
    fn disabled_logger_accepts_messages() {
        assert!(Logger::disabled().log("dropped").is_ok());
    }
}
