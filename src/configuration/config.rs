use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::{ArgAction, Parser};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command-line surface of the forwarder.
///
/// Every value is optional at the parser level so that [`Config::from_args`] can report all
/// missing or out-of-range values at once instead of stopping at the first one. Numbers are
/// parsed as `i64` for the same reason: `--source-port 70000` must reach validation.
///
/// The historical short flag names (`--sp`, `--dh`, ...) are kept as visible aliases.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mirrorfwd")]
#[command(version)]
#[command(about = "Relay TCP connections to a destination, mirroring and capturing each direction")]
pub struct Args {
    /// Source port for incoming connections. Required.
    #[arg(long, visible_alias = "sp", value_name = "PORT", allow_negative_numbers = true)]
    pub source_port: Option<i64>,

    /// Destination host to forward incoming connections to. Required.
    #[arg(long, visible_alias = "dh", value_name = "HOST")]
    pub destination_host: Option<String>,

    /// Destination port to forward incoming connections to. Required.
    #[arg(long, visible_alias = "dp", value_name = "PORT", allow_negative_numbers = true)]
    pub destination_port: Option<i64>,

    /// Mirror host receiving a copy of upstream (source to destination) traffic.
    #[arg(long, visible_alias = "muh", value_name = "HOST")]
    pub upstream_mirror_host: Option<String>,

    /// Mirror port for upstream traffic. Required if the upstream mirror host is set.
    #[arg(long, visible_alias = "mup", value_name = "PORT", allow_negative_numbers = true)]
    pub upstream_mirror_port: Option<i64>,

    /// Mirror host receiving a copy of downstream (destination to source) traffic.
    #[arg(long, visible_alias = "mdh", value_name = "HOST")]
    pub downstream_mirror_host: Option<String>,

    /// Mirror port for downstream traffic. Required if the downstream mirror host is set.
    #[arg(long, visible_alias = "mdp", value_name = "PORT", allow_negative_numbers = true)]
    pub downstream_mirror_port: Option<i64>,

    /// Append upstream payload bytes to this file.
    #[arg(long, visible_alias = "duf", value_name = "PATH")]
    pub upstream_capture_file: Option<PathBuf>,

    /// Append downstream payload bytes to this file.
    #[arg(long, visible_alias = "ddf", value_name = "PATH")]
    pub downstream_capture_file: Option<PathBuf>,

    /// Write diagnostic log records to this file.
    #[arg(long, visible_alias = "logf", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Write diagnostic log records to the console.
    #[arg(long, visible_alias = "logc", action = ArgAction::SetTrue)]
    pub log_to_console: bool,

    /// Size of the read/write buffer in bytes [default: 1024]
    #[arg(long, visible_alias = "bufs", value_name = "BYTES", allow_negative_numbers = true)]
    pub buffer_size: Option<i64>,

    /// What to do when accepting a connection fails [default: fatal]
    #[arg(long, value_enum, value_name = "POLICY")]
    pub accept_errors: Option<AcceptErrorPolicy>,

    /// TOML file providing defaults for any of the options above.
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,
}

/// Contents of a `--config-file`. Keys mirror the long flag names in snake_case.
///
/// ```toml
/// source_port = 9999
/// destination_host = "localhost"
/// destination_port = 10000
/// upstream_mirror_host = "localhost"
/// upstream_mirror_port = 12001
/// buffer_size = 4096
/// ```
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source_port: Option<i64>,
    pub destination_host: Option<String>,
    pub destination_port: Option<i64>,
    pub upstream_mirror_host: Option<String>,
    pub upstream_mirror_port: Option<i64>,
    pub downstream_mirror_host: Option<String>,
    pub downstream_mirror_port: Option<i64>,
    pub upstream_capture_file: Option<PathBuf>,
    pub downstream_capture_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_to_console: Option<bool>,
    pub buffer_size: Option<i64>,
    pub accept_errors: Option<AcceptErrorPolicy>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Layers command-line values over the file values, key by key.
    fn overlay(self, args: Args) -> FileConfig {
        FileConfig {
            source_port: args.source_port.or(self.source_port),
            destination_host: args.destination_host.or(self.destination_host),
            destination_port: args.destination_port.or(self.destination_port),
            upstream_mirror_host: args.upstream_mirror_host.or(self.upstream_mirror_host),
            upstream_mirror_port: args.upstream_mirror_port.or(self.upstream_mirror_port),
            downstream_mirror_host: args.downstream_mirror_host.or(self.downstream_mirror_host),
            downstream_mirror_port: args.downstream_mirror_port.or(self.downstream_mirror_port),
            upstream_capture_file: args.upstream_capture_file.or(self.upstream_capture_file),
            downstream_capture_file: args
                .downstream_capture_file
                .or(self.downstream_capture_file),
            log_file: args.log_file.or(self.log_file),
            log_to_console: if args.log_to_console {
                Some(true)
            } else {
                self.log_to_console
            },
            buffer_size: args.buffer_size.or(self.buffer_size),
            accept_errors: args.accept_errors.or(self.accept_errors),
        }
    }
}

/// Validated forwarder configuration.
///
/// Built once at startup and shared read-only (usually as `Arc<Config>`) with the accept loop
/// and every session. A mirror is either fully configured or absent, which the `Option<Endpoint>`
/// fields make impossible to get wrong downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source_port: u16,
    pub destination: Endpoint,
    pub upstream_mirror: Option<Endpoint>,
    pub downstream_mirror: Option<Endpoint>,
    pub upstream_capture_file: Option<PathBuf>,
    pub downstream_capture_file: Option<PathBuf>,
    pub log: LogSettings,
    pub buffer_size: usize,
    pub accept_errors: AcceptErrorPolicy,
}

impl Config {
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;
    /// Each copier allocates its buffer up front, so the size is capped at 64 MiB.
    pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

    /// Builds a configuration from parsed command-line arguments, reading `--config-file` first
    /// when given.
    ///
    /// # Errors
    ///
    /// * `ConfigError::FileRead` / `ConfigError::TomlError` if the configuration file cannot be
    ///   loaded
    /// * `ConfigError::Invalid` carrying one message per violated constraint
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let file = match args.config_file.as_deref() {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::validate(file.overlay(args))
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn validate(raw: FileConfig) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();

        let source_port = raw.source_port.and_then(valid_port);
        if source_port.is_none() {
            errors.push("You need to specify source port in range 1-65535.".to_string());
        }

        let destination_host = raw.destination_host.filter(|h| !h.is_empty());
        if destination_host.is_none() {
            errors.push("You need to specify destination host.".to_string());
        }

        let destination_port = raw.destination_port.and_then(valid_port);
        if destination_port.is_none() {
            errors.push("You need to specify destination port in range 1-65535.".to_string());
        }

        let buffer_size = raw.buffer_size.unwrap_or(Self::DEFAULT_BUFFER_SIZE as i64);
        if buffer_size < 1 {
            errors.push("Buffer size needs to be >= 1.".to_string());
        } else if buffer_size > Self::MAX_BUFFER_SIZE as i64 {
            errors.push(format!(
                "Buffer size needs to be <= {}.",
                Self::MAX_BUFFER_SIZE
            ));
        }

        let upstream_mirror = mirror_endpoint(
            "upstream",
            raw.upstream_mirror_host,
            raw.upstream_mirror_port,
            &mut errors,
        );
        let downstream_mirror = mirror_endpoint(
            "downstream",
            raw.downstream_mirror_host,
            raw.downstream_mirror_port,
            &mut errors,
        );

        match (source_port, destination_host, destination_port) {
            (Some(source_port), Some(host), Some(port)) if errors.is_empty() => Ok(Self {
                source_port,
                destination: Endpoint::new(host, port),
                upstream_mirror,
                downstream_mirror,
                upstream_capture_file: raw.upstream_capture_file,
                downstream_capture_file: raw.downstream_capture_file,
                log: LogSettings {
                    log_file: raw.log_file,
                    log_to_console: raw.log_to_console.unwrap_or(false),
                },
                buffer_size: buffer_size as usize,
                accept_errors: raw.accept_errors.unwrap_or_default(),
            }),
            _ => Err(ConfigError::Invalid(errors)),
        }
    }
}

fn valid_port(port: i64) -> Option<u16> {
    u16::try_from(port).ok().filter(|p| *p >= 1)
}

fn mirror_endpoint(
    direction: &str,
    host: Option<String>,
    port: Option<i64>,
    errors: &mut Vec<String>,
) -> Option<Endpoint> {
    let host = host.filter(|h| !h.is_empty());
    match (host, port) {
        (Some(host), port) => match port.and_then(valid_port) {
            Some(port) => Some(Endpoint::new(host, port)),
            None => {
                errors.push(format!(
                    "When {} mirror host is defined, its port must be defined in range 1-65535.",
                    direction
                ));
                None
            }
        },
        // A zero port means "not set", same as leaving it out.
        (None, Some(port)) if port != 0 => {
            errors.push(format!(
                "{} mirror port defined but no {} mirror host. Mirror host is required if mirror is enabled.",
                capitalize(direction),
                direction
            ));
            None
        }
        (None, _) => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
