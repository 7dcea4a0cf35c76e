//! A TCP connection that two tasks can drive at once and either of them can close.
//!
//! Each session owns two primary links (source and destination) and hands both of them to both
//! stream copiers. A copier that finishes closes both links, which wakes the other copier out of
//! whatever read or write it is blocked in. That is the only cancellation mechanism between the
//! two directions of a session, so [`Link::close`] must be safe to call any number of times from
//! any task.

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::configuration::types::Endpoint;
use crate::error_handling::types::NetworkError;

pub struct Link {
    label: &'static str,
    peer: Option<SocketAddr>,
    stream: TcpStream,
    closed: AtomicBool,
    close_notify: Notify,
}

impl Link {
    /// Wraps an already connected stream. `label` names the role of the connection in logs.
    pub fn new(label: &'static str, stream: TcpStream) -> Self {
        // Relay chunks as soon as they are written.
        if let Err(e) = stream.set_nodelay(true) {
            trace!("{}: unable to set TCP_NODELAY: {}", label, e);
        }
        Self {
            label,
            peer: stream.peer_addr().ok(),
            stream,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    /// Dials `endpoint` once. There is no retry; callers decide what a failure means.
    pub async fn connect(label: &'static str, endpoint: &Endpoint) -> Result<Self, NetworkError> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| NetworkError::DialFailed(endpoint.to_string(), e))?;
        let link = Self::new(label, stream);
        debug!(
            "Dialed {} {:?} -> {:?}",
            label,
            link.stream.local_addr().ok(),
            link.peer
        );
        Ok(link)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reads whatever is available, up to `buf.len()` bytes. `Ok(0)` means end of stream.
    ///
    /// Fails with `NotConnected` once the link has been closed, including when the close happens
    /// while this read is pending.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_closed() {
            return Err(closed_error());
        }
        tokio::select! {
            biased;
            _ = self.wait_closed() => Err(closed_error()),
            res = self.read_ready(buf) => res,
        }
    }

    /// Writes the whole of `buf`. Same close semantics as [`Link::read`].
    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        tokio::select! {
            biased;
            _ = self.wait_closed() => Err(closed_error()),
            res = self.write_ready(buf) => res,
        }
    }

    /// Shuts the socket down in both directions and wakes every task blocked on this link.
    /// Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = SockRef::from(&self.stream).shutdown(Shutdown::Both) {
            // The peer may already have reset the connection.
            trace!("{}: shutdown: {}", self, e);
        }
        self.close_notify.notify_waiters();
        debug!("Closed {}", self);
    }

    async fn read_ready(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.stream.readable().await?;
            match self.stream.try_read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_ready(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.stream.writable().await?;
            match self.stream.try_write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn wait_closed(&self) {
        let notified = self.close_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer {
            Some(peer) => write!(f, "{} ({})", self.label, peer),
            None => write!(f, "{}", self.label),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("label", &self.label)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "link closed")
}
