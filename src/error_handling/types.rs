use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlError(String),
    Invalid(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Unable to read configuration file {}: {}", path.display(), e)
            }
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::Invalid(errors) => {
                for e in errors {
                    writeln!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum LoggingError {
    OpenFailed(PathBuf, std::io::Error),
    AlreadyInitialized,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::OpenFailed(path, e) => {
                write!(f, "Failed to open log file {} for writing: {}", path.display(), e)
            }
            LoggingError::AlreadyInitialized => write!(f, "Logger already initialized"),
        }
    }
}

impl std::error::Error for LoggingError {}

#[derive(Debug)]
pub enum CaptureError {
    OpenFailed(PathBuf, std::io::Error),
    WriteFailed(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::OpenFailed(path, e) => write!(
                f,
                "Failed to open capture file {} for writing: {}",
                path.display(),
                e
            ),
            CaptureError::WriteFailed(e) => write!(f, "Capture write failed: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::WriteFailed(err)
    }
}

#[derive(Debug)]
pub enum NetworkError {
    BindFailed(String, std::io::Error),
    AcceptFailed(std::io::Error),
    DialFailed(String, std::io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindFailed(addr, e) => write!(f, "Listen on {} failed: {}", addr, e),
            NetworkError::AcceptFailed(e) => write!(f, "Accept failed: {}", e),
            NetworkError::DialFailed(addr, e) => write!(f, "Dial {} failed: {}", addr, e),
        }
    }
}

impl std::error::Error for NetworkError {}

#[derive(Debug)]
pub enum SessionError {
    DestinationUnavailable(NetworkError),
    Join(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::DestinationUnavailable(e) => {
                write!(f, "Connection to destination failed: {}", e)
            }
            SessionError::Join(e) => write!(f, "Stream forwarder task failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug)]
pub enum ControllerError {
    CaptureError(CaptureError),
    NetworkError(NetworkError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::CaptureError(e) => write!(f, "Capture error: {}", e),
            ControllerError::NetworkError(e) => write!(f, "Network error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<CaptureError> for ControllerError {
    fn from(err: CaptureError) -> Self {
        ControllerError::CaptureError(err)
    }
}

impl From<NetworkError> for ControllerError {
    fn from(err: NetworkError) -> Self {
        ControllerError::NetworkError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_invalid_config_lists_every_violation() {
        let err = ConfigError::Invalid(vec![
            "first problem".to_string(),
            "second problem".to_string(),
        ]);
        assert_eq!(err.to_string(), "first problem\nsecond problem\n");
    }

    #[test]
    fn test_controller_error_wraps_network_error() {
        let err: ControllerError = NetworkError::BindFailed(
            "localhost:9999".to_string(),
            io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        )
        .into();
        assert_eq!(
            err.to_string(),
            "Network error: Listen on localhost:9999 failed: in use"
        );
    }

    #[test]
    fn test_session_error_names_destination() {
        let err = SessionError::DestinationUnavailable(NetworkError::DialFailed(
            "localhost:1".to_string(),
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        ));
        assert!(err.to_string().contains("localhost:1"));
    }
}
