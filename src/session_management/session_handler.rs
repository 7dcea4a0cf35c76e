use crate::configuration::config::Config;
use crate::configuration::types::Endpoint;
use crate::data_capture::capture_sink::CaptureSinks;
use crate::data_capture::stream_copier::StreamCopier;
use crate::data_capture::types::Direction;
use crate::error_handling::types::SessionError;
use crate::network::link::Link;
use crate::session_management::session::Session;
use crate::session_management::SessionStatus;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use uuid::Uuid;

/// Drives one accepted source connection from accept to teardown.
///
/// The handler is shared by every session spawned from the accept loop; it only carries the
/// read-only configuration and the process-wide capture sinks.
///
/// # Lifecycle
///
/// 1. Dial the destination once. On failure the source connection is closed and the session
///    ends with [`SessionError::DestinationUnavailable`]; no copier is started.
/// 2. Dial each configured mirror once. A failed mirror is logged and left out, it never aborts
///    the session.
/// 3. Run the upstream (source to destination) and downstream (destination to source) copiers
///    on their own tasks and wait for both.
/// 4. Close the source and destination links again, which is a no-op if the copiers already did.
pub struct SessionHandler {
    config: Arc<Config>,
    sinks: CaptureSinks,
}

impl SessionHandler {
    pub fn new(config: Arc<Config>, sinks: CaptureSinks) -> Self {
        Self { config, sinks }
    }

    /// Forwards `source` until both directions are done and returns the session summary.
    ///
    /// # Errors
    ///
    /// * [`SessionError::DestinationUnavailable`] if the destination could not be dialed
    /// * [`SessionError::Join`] if a copier task panicked; the links are closed regardless
    pub async fn handle(
        &self,
        source: TcpStream,
        client_addr: SocketAddr,
    ) -> Result<Session, SessionError> {
        let mut session = Session::new(client_addr);
        let source = Arc::new(Link::new("source", source));
        debug!("[{}] Got connection {}", session.id, source);

        let destination = match Link::connect("destination", &self.config.destination).await {
            Ok(link) => Arc::new(link),
            Err(e) => {
                error!(
                    "[{}] Connection to destination failed. Skipping connection. Error: {}",
                    session.id, e
                );
                source.close();
                session.finish(SessionStatus::Error);
                return Err(SessionError::DestinationUnavailable(e));
            }
        };

        let upstream_mirror = Self::dial_mirror(
            session.id,
            "upstream mirror",
            self.config.upstream_mirror.as_ref(),
        )
        .await;
        let downstream_mirror = Self::dial_mirror(
            session.id,
            "downstream mirror",
            self.config.downstream_mirror.as_ref(),
        )
        .await;
        session.upstream_mirror = upstream_mirror.is_some();
        session.downstream_mirror = downstream_mirror.is_some();
        session.status = SessionStatus::Active;

        info!(
            "[{}] Forwarding {} -> {} (upstream mirror: {}, downstream mirror: {})",
            session.id,
            client_addr,
            self.config.destination,
            session.upstream_mirror,
            session.downstream_mirror
        );

        let upstream = StreamCopier::new(
            session.id,
            Direction::Upstream,
            Arc::clone(&source),
            Arc::clone(&destination),
            self.config.buffer_size,
        )
        .with_mirror(upstream_mirror)
        .with_capture(self.sinks.for_direction(Direction::Upstream))
        .spawn();

        let downstream = StreamCopier::new(
            session.id,
            Direction::Downstream,
            Arc::clone(&destination),
            Arc::clone(&source),
            self.config.buffer_size,
        )
        .with_mirror(downstream_mirror)
        .with_capture(self.sinks.for_direction(Direction::Downstream))
        .spawn();

        let (upstream, downstream) = tokio::join!(upstream, downstream);

        source.close();
        destination.close();

        let mut failure = None;
        for result in [upstream, downstream] {
            match result {
                Ok(report) => {
                    debug!(
                        "[{}] {} finished: {}",
                        session.id, report.direction, report.end
                    );
                    session.record(&report);
                }
                Err(e) => {
                    error!("[{}] Stream forwarder task failed: {}", session.id, e);
                    failure = Some(SessionError::Join(e.to_string()));
                }
            }
        }

        if let Some(e) = failure {
            session.finish(SessionStatus::Error);
            return Err(e);
        }

        session.finish(SessionStatus::Completed);
        info!(
            "[{}] Connection from {} closed: {} byte(s) upstream, {} byte(s) downstream, {} total",
            session.id,
            client_addr,
            session.bytes_upstream,
            session.bytes_downstream,
            session.bytes_transferred()
        );
        Ok(session)
    }

    async fn dial_mirror(
        session_id: Uuid,
        label: &'static str,
        endpoint: Option<&Endpoint>,
    ) -> Option<Link> {
        let endpoint = endpoint?;
        match Link::connect(label, endpoint).await {
            Ok(link) => {
                debug!("[{}] Connected to {} {}", session_id, label, endpoint);
                Some(link)
            }
            Err(e) => {
                warn!(
                    "[{}] Connection to {} failed. Skipping mirror for this connection. Error: {}",
                    session_id, label, e
                );
                None
            }
        }
    }
}
