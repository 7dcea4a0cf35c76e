//! # Network Listener Module
//!
//! The accept loop of the forwarder. [`NetworkListener`] owns the source listener and spawns one
//! session task per accepted connection; sessions run independently of the loop and of each
//! other, with no admission limit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌──────────────────────────┐
//! │ Incoming        │───▶│ NetworkListener  │───▶│ SessionHandler (1 task)  │
//! │ Connections     │    │  accept loop     │    │  ├─ src->dst copier task │
//! └─────────────────┘    └──────────────────┘    │  └─ dst->src copier task │
//!                                                └──────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirrorfwd::configuration::{Config, Endpoint};
//! use mirrorfwd::data_capture::CaptureSinks;
//! use mirrorfwd::error_handling::NetworkError;
//! use mirrorfwd::network::NetworkListener;
//!
//! async fn run(config: Config) -> Result<(), NetworkError> {
//!     let config = config.into_shared();
//!     let listener = NetworkListener::bind(config, CaptureSinks::default()).await?;
//!     let stop = listener.stop_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stop.stop();
//!     });
//!     listener.serve().await
//! }
//! ```

use crate::configuration::config::Config;
use crate::configuration::types::AcceptErrorPolicy;
use crate::data_capture::capture_sink::CaptureSinks;
use crate::error_handling::types::NetworkError;
use crate::session_management::session_handler::SessionHandler;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Asks a running [`NetworkListener`] to stop accepting.
///
/// Stopping never touches sessions already in flight. An `accept()` that is already pending is
/// not interrupted either: the flag is checked before each accept, so the loop ends once the
/// current accept returns and its connection has been handed off.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Accept loop bound to the configured source port.
pub struct NetworkListener {
    listener: TcpListener,
    handler: Arc<SessionHandler>,
    stopper: StopHandle,
    accept_errors: AcceptErrorPolicy,
}

impl NetworkListener {
    /// Binds `localhost:<source_port>`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the port cannot be bound. There is no retry and
    /// no fallback port; callers treat this as fatal.
    pub async fn bind(config: Arc<Config>, sinks: CaptureSinks) -> Result<Self, NetworkError> {
        let addr = format!("localhost:{}", config.source_port);
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|e| NetworkError::BindFailed(addr, e))?;
        Ok(Self::from_listener(listener, config, sinks))
    }

    /// Uses an already bound listener instead of the configured source port.
    pub fn from_listener(listener: TcpListener, config: Arc<Config>, sinks: CaptureSinks) -> Self {
        let accept_errors = config.accept_errors;
        Self {
            listener,
            handler: Arc::new(SessionHandler::new(config, sinks)),
            stopper: StopHandle::default(),
            accept_errors,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stopper.clone()
    }

    /// Accepts connections until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::AcceptFailed`] on the first failed accept when the policy is
    /// [`AcceptErrorPolicy::Fatal`]. With [`AcceptErrorPolicy::Continue`] the error is logged and
    /// the loop goes on.
    pub async fn serve(self) -> Result<(), NetworkError> {
        match self.listener.local_addr() {
            Ok(addr) => info!("Listening for connections on {}", addr),
            Err(_) => info!("Listening for connections"),
        }

        loop {
            if self.stopper.is_stopped() {
                info!("Stop requested, no longer accepting connections");
                break;
            }

            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!(
                        "Got connection {} -> {:?}",
                        peer_addr,
                        stream.local_addr().ok()
                    );
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(stream, peer_addr).await {
                            debug!("Session for {} ended early: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => on_accept_error(self.accept_errors, e)?,
            }
        }

        Ok(())
    }
}

/// Applies `policy` to a failed accept: `Err` ends the loop, `Ok` keeps it going.
fn on_accept_error(policy: AcceptErrorPolicy, e: io::Error) -> Result<(), NetworkError> {
    match policy {
        AcceptErrorPolicy::Fatal => {
            error!("Accept failed: {}", e);
            Err(NetworkError::AcceptFailed(e))
        }
        AcceptErrorPolicy::Continue => {
            warn!("Accept failed, continuing: {}", e);
            Ok(())
        }
    }
}
