use log::{info, warn};
use std::sync::Arc;

use crate::configuration::config::Config;
use crate::data_capture::capture_sink::CaptureSinks;
use crate::error_handling::types::ControllerError;
use crate::network::network_listener::NetworkListener;

/// Owns the process-wide state of the forwarder: the configuration and the capture sinks shared
/// by every session.
pub struct Controller {
    config: Arc<Config>,
    sinks: CaptureSinks,
}

impl Controller {
    /// Opens the configured capture files.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::CaptureError`] if a capture file cannot be opened; the
    /// forwarder does not start without it.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        let sinks = CaptureSinks::open(&config).await?;
        Ok(Self {
            config: config.into_shared(),
            sinks,
        })
    }

    /// Binds the source port and serves until the accept loop fails or Ctrl-C is received.
    ///
    /// On Ctrl-C the accept loop is dropped; sessions already running are left to the runtime.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!(
            "Forwarding localhost:{} to {}",
            self.config.source_port, self.config.destination
        );
        if let Some(mirror) = self.config.upstream_mirror.as_ref() {
            info!("Mirroring upstream traffic to {}", mirror);
        }
        if let Some(mirror) = self.config.downstream_mirror.as_ref() {
            info!("Mirroring downstream traffic to {}", mirror);
        }

        let listener = NetworkListener::bind(Arc::clone(&self.config), self.sinks).await?;
        let stop = listener.stop_handle();

        tokio::select! {
            result = listener.serve() => result?,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Unable to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                stop.stop();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::{CaptureError, NetworkError};
    use crate::network::test_support::config_for;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_new_fails_on_unopenable_capture_file() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(10000);
        config.upstream_capture_file = Some(dir.path().join("missing").join("up.bin"));

        let result = Controller::new(config).await;
        assert!(matches!(
            result,
            Err(ControllerError::CaptureError(CaptureError::OpenFailed(_, _)))
        ));
    }

    #[tokio::test]
    async fn test_new_opens_capture_files() {
        let dir = TempDir::new().unwrap();
        let down = dir.path().join("down.bin");
        let mut config = config_for(10000);
        config.downstream_capture_file = Some(down.clone());

        let controller = Controller::new(config).await.unwrap();
        assert!(down.exists());
        assert!(controller.sinks.upstream.is_none());
        assert!(controller.sinks.downstream.is_some());
    }

    #[tokio::test]
    async fn test_run_fails_when_source_port_is_taken() {
        let taken_v4 = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = taken_v4.local_addr().unwrap().port();
        let _taken_v6 = TcpListener::bind(("::1", port)).await;

        let mut config = config_for(10000);
        config.source_port = port;

        let controller = Controller::new(config).await.unwrap();
        assert!(matches!(
            controller.run().await,
            Err(ControllerError::NetworkError(NetworkError::BindFailed(_, _)))
        ));
    }
}
