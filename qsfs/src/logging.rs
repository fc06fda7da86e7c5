//! Logging setup: `env_logger` aimed either at stderr (foreground) or a
//! rolling file under the configured log directory (spec §6 `-l/--logdir`,
//! `-L/--loglevel`, `-C/--clearlogdir`).

use std::fs::{self, OpenOptions};
use std::path::Path;

use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to prepare log directory {0}: {1}")]
    PrepareDir(std::path::PathBuf, std::io::Error),
    #[error("failed to open log file {0}: {1}")]
    OpenFile(std::path::PathBuf, std::io::Error),
}

pub fn init(config: &Config) -> Result<(), LoggingError> {
    let mut builder = Builder::new();
    builder.filter_level(config.log_level.to_level_filter());

    match &config.log_dir {
        Some(dir) => {
            if config.clear_log_dir && dir.exists() {
                let _ = fs::remove_dir_all(dir);
            }
            fs::create_dir_all(dir).map_err(|e| LoggingError::PrepareDir(dir.clone(), e))?;
            let file_path = dir.join("qsfs.log");
            let file = open_log_file(&file_path)?;
            builder.target(Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(Target::Stderr);
        }
    }

    builder.init();
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggingError::OpenFile(path.to_path_buf(), e))
}

/// Exposed for callers (e.g. `main`) that need the effective level outside
/// of the `log` facade, such as deciding whether to print a startup banner.
pub fn level_enabled(level: LevelFilter) -> bool {
    log::max_level() >= level
}
