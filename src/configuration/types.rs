use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// A `host:port` pair the forwarder dials.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where diagnostic records go.
///
/// Logging counts as enabled when either a file is configured or console output was requested.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct LogSettings {
    pub log_file: Option<PathBuf>,
    pub log_to_console: bool,
}

impl LogSettings {
    pub fn enabled(&self) -> bool {
        self.log_to_console || self.log_file.is_some()
    }
}

/// What the accept loop does when `accept()` itself fails.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptErrorPolicy {
    /// Stop serving and report the error to the caller.
    #[default]
    Fatal,
    /// Log the error and keep accepting.
    Continue,
}
