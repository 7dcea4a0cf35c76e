//! Process-wide log sink selection.
//!
//! All subsystems log through the `log` facade; this module only decides where the records end
//! up. With neither a log file nor console logging configured the forwarder still reports
//! warnings and errors on stderr, so fatal conditions and rejected connections stay visible.
//! `RUST_LOG`, when set, overrides the computed level.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::configuration::types::LogSettings;
use crate::error_handling::types::LoggingError;

/// Level used when diagnostics are requested explicitly.
pub const ENABLED_LEVEL: LevelFilter = LevelFilter::Debug;
/// Level used otherwise.
pub const QUIET_LEVEL: LevelFilter = LevelFilter::Warn;

pub fn level_for(settings: &LogSettings) -> LevelFilter {
    if settings.enabled() {
        ENABLED_LEVEL
    } else {
        QUIET_LEVEL
    }
}

/// Writes every record to the log file and, optionally, to stdout as well.
struct LogTee {
    file: File,
    console: Option<io::Stdout>,
}

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if let Some(console) = self.console.as_mut() {
            // Console trouble must not lose the file copy.
            let _ = console.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if let Some(console) = self.console.as_mut() {
            let _ = console.flush();
        }
        Ok(())
    }
}

fn open_log_file(settings: &LogSettings) -> Result<Option<File>, LoggingError> {
    match settings.log_file.as_ref() {
        Some(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(Some)
            .map_err(|e| LoggingError::OpenFailed(path.clone(), e)),
        None => Ok(None),
    }
}

/// Prepares an `env_logger` builder for `settings` without installing it.
///
/// # Errors
///
/// Returns [`LoggingError::OpenFailed`] if the configured log file cannot be opened for append.
pub fn builder(settings: &LogSettings) -> Result<Builder, LoggingError> {
    let mut builder = Builder::new();
    builder.filter_level(level_for(settings)).format_target(false);
    builder.parse_default_env();

    let target = match open_log_file(settings)? {
        Some(file) => Target::Pipe(Box::new(LogTee {
            file,
            console: settings.log_to_console.then(io::stdout),
        })),
        None if settings.log_to_console => Target::Stdout,
        None => Target::Stderr,
    };
    builder.target(target);

    Ok(builder)
}

/// Installs the global logger. Call once, before anything else logs.
pub fn init(settings: &LogSettings) -> Result<(), LoggingError> {
    builder(settings)?
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
