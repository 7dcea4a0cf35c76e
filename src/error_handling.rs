//! Error types shared by the forwarder subsystems.

pub mod types;

pub use types::{
    CaptureError, ConfigError, ControllerError, LoggingError, NetworkError, SessionError,
};
