use std::process;
use log::error;

use obsmosaic::commands::{build_cli, CommandFactory, ObsCommandFactory};
use obsmosaic::errors::ObsError;
use obsmosaic::utils::logger::{level_for, Logger};

fn main() {
    let matches = build_cli().get_matches();
    let level = level_for(matches.get_flag("verbose"));

    let logger = match matches.get_one::<String>("log-file") {
        Some(log_file) => {
            let logger = match Logger::new(log_file) {
                Ok(logger) => logger.with_level(level),
                Err(e) => {
                    eprintln!("Error opening log file {}: {}", log_file, e);
                    process::exit(1);
                }
            };
            if let Err(e) = logger.install_global() {
                eprintln!("Error setting up global logger: {}", e);
                process::exit(1);
            }
            logger
        }
        None => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
                .init();
            Logger::disabled()
        }
    };

    let factory = ObsCommandFactory::new();

    let result = factory.create_command(&matches, &logger)
        .and_then(|command| command.execute());
    if let Err(e) = result {
        fail(&e);
    }
}

fn fail(e: &ObsError) -> ! {
    error!("{}", e);
    eprintln!("Error [{}]: {}", e.kind(), e);
    process::exit(1);
}
