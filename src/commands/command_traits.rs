//! Command pattern interfaces
//!
//! Each CLI action is a `Command`; a `CommandFactory` picks the command
//! that matches the parsed arguments.

use crate::errors::ObsResult;
use crate::utils::logger::Logger;

/// An executable command in the application
///
/// Command objects hold everything parsed from the command line, so
/// construction fails early on bad arguments and `execute` does the work.
pub trait Command {
    /// Execute the command
    ///
    /// # Returns
    /// Result indicating success or an error
    fn execute(&self) -> ObsResult<()>;
}

/// Factory for creating commands from CLI arguments
pub trait CommandFactory<'a> {
    /// Create a new Command instance based on CLI arguments
    ///
    /// # Arguments
    /// * `args` - CLI argument matches from clap
    /// * `logger` - Logger for recording operations
    ///
    /// # Returns
    /// A command that implements the Command trait, or an error
    fn create_command(&self, args: &clap::ArgMatches, logger: &'a Logger) -> ObsResult<Box<dyn Command + 'a>>;
}
