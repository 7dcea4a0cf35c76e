//! One direction of a forwarded session.
//!
//! A [`StreamCopier`] reads from its primary reader and writes every chunk to its primary
//! writer, then tees the same chunk to an optional mirror connection and an optional capture
//! sink. Chunks are forwarded as soon as they are read, at the size they were read, and always
//! reach the mirror after the destination.
//!
//! The primary pair is shared with the copier of the opposite direction. Whichever way a copier
//! ends (EOF, error, panic) it closes both primary links, which is what brings the other
//! direction down. Mirror and capture failures are logged and never end the copier.

use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::configuration::config::Config;
use crate::network::link::Link;

use super::capture_sink::CaptureSink;
use super::types::{CopyEnd, CopyReport, Direction};

const PREVIEW_LEN: usize = 64;

pub struct StreamCopier {
    session_id: Uuid,
    direction: Direction,
    reader: Arc<Link>,
    writer: Arc<Link>,
    mirror: Option<Link>,
    capture: Option<Arc<CaptureSink>>,
    buffer_size: usize,
}

/// Closes the primary pair when dropped, so every exit path of [`StreamCopier::run`] releases
/// both links.
struct CloseOnExit<'a> {
    reader: &'a Link,
    writer: &'a Link,
}

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.reader.close();
        self.writer.close();
    }
}

impl StreamCopier {
    /// `buffer_size` is the largest chunk read (and forwarded) at once. It is clamped to
    /// `1..=Config::MAX_BUFFER_SIZE`.
    pub fn new(
        session_id: Uuid,
        direction: Direction,
        reader: Arc<Link>,
        writer: Arc<Link>,
        buffer_size: usize,
    ) -> Self {
        Self {
            session_id,
            direction,
            reader,
            writer,
            mirror: None,
            capture: None,
            buffer_size: buffer_size.clamp(1, Config::MAX_BUFFER_SIZE),
        }
    }

    pub fn with_mirror(mut self, mirror: Option<Link>) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_capture(mut self, capture: Option<Arc<CaptureSink>>) -> Self {
        self.capture = capture;
        self
    }

    /// Runs the copier on its own task. The handle resolves exactly once, when the copier has
    /// exited and closed its links.
    pub fn spawn(self) -> JoinHandle<CopyReport> {
        tokio::spawn(self.run())
    }

    /// Copies until the reader reports end of stream or a primary read/write fails.
    pub async fn run(self) -> CopyReport {
        let StreamCopier {
            session_id,
            direction,
            reader,
            writer,
            mut mirror,
            capture,
            buffer_size,
        } = self;
        let _close = CloseOnExit {
            reader: &reader,
            writer: &writer,
        };

        let mut report = CopyReport::new(direction);
        let mut buf = vec![0u8; buffer_size];

        match mirror.as_ref() {
            Some(m) => debug!("[{}] {}: initializing with mirror {}", session_id, direction, m),
            None => debug!("[{}] {}: initializing without mirror", session_id, direction),
        }

        report.end = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("[{}] {}: EOF received, connection closed", session_id, direction);
                    break CopyEnd::Eof;
                }
                Ok(n) => n,
                Err(e) => {
                    if reader.is_closed() {
                        break CopyEnd::Closed;
                    }
                    debug!("[{}] {}: breaking on read error: {}", session_id, direction, e);
                    break CopyEnd::ReadFailed(e.kind());
                }
            };
            let chunk = &buf[..n];
            report.chunks += 1;

            debug!("[{}] {}: forwarding data, n={}", session_id, direction, n);
            trace!(
                "[{}] {}: {}{}",
                session_id,
                direction,
                String::from_utf8_lossy(&chunk[..n.min(PREVIEW_LEN)]),
                if n > PREVIEW_LEN { " ..." } else { "" }
            );

            if let Err(e) = writer.write_all(chunk).await {
                if writer.is_closed() {
                    break CopyEnd::Closed;
                }
                debug!("[{}] {}: breaking on write error: {}", session_id, direction, e);
                break CopyEnd::WriteFailed(e.kind());
            }
            report.bytes_forwarded += n as u64;
            debug!("[{}] {}: write done", session_id, direction);

            let mirror_failed = match mirror.as_ref() {
                Some(m) => match m.write_all(chunk).await {
                    Ok(()) => {
                        report.bytes_mirrored += n as u64;
                        debug!("[{}] {}: writing to mirror done", session_id, direction);
                        false
                    }
                    Err(e) => {
                        warn!(
                            "[{}] {}: mirror {} failed, continuing without it: {}",
                            session_id, direction, m, e
                        );
                        true
                    }
                },
                None => false,
            };
            if mirror_failed {
                if let Some(m) = mirror.take() {
                    m.close();
                }
                report.mirror_detached = true;
            }

            if let Some(sink) = capture.as_ref() {
                match sink.record(chunk).await {
                    Ok(written) => report.bytes_captured += written as u64,
                    Err(e) => warn!(
                        "[{}] {}: capture to {} failed: {}",
                        session_id,
                        direction,
                        sink.path().display(),
                        e
                    ),
                }
            }
        };

        if let Some(m) = mirror.take() {
            m.close();
        }
        debug!(
            "[{}] {}: exiting stream forwarder ({}, {} byte(s) forwarded)",
            session_id, direction, report.end, report.bytes_forwarded
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_support::{tcp_pair, TEST_TIMEOUT};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    /// A link whose far end is handed back to the test.
    async fn link_with_remote(label: &'static str) -> (Arc<Link>, TcpStream) {
        let (local, remote) = tcp_pair().await.unwrap();
        (Arc::new(Link::new(label, local)), remote)
    }

    #[tokio::test]
    async fn test_forwards_mirrors_and_captures_in_order() {
        let (source, mut client) = link_with_remote("source").await;
        let (destination, mut server) = link_with_remote("destination").await;
        let (mirror_local, mut observer) = tcp_pair().await.unwrap();

        let dir = TempDir::new().unwrap();
        let capture_path = dir.path().join("up.bin");
        let sink = Arc::new(CaptureSink::open(&capture_path).await.unwrap());

        let copier = StreamCopier::new(
            Uuid::new_v4(),
            Direction::Upstream,
            Arc::clone(&source),
            Arc::clone(&destination),
            3,
        )
        .with_mirror(Some(Link::new("upstream mirror", mirror_local)))
        .with_capture(Some(sink));
        let handle = copier.spawn();

        client.write_all(b"hello_t, and more").await.unwrap();
        client.shutdown().await.unwrap();

        let report = timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap();
        assert_eq!(report.end, CopyEnd::Eof);
        assert_eq!(report.bytes_forwarded, 17);
        assert_eq!(report.bytes_mirrored, 17);
        assert_eq!(report.bytes_captured, 17);
        assert!(report.chunks >= 6, "buffer of 3 must split 17 bytes");

        let mut at_destination = Vec::new();
        server.read_to_end(&mut at_destination).await.unwrap();
        assert_eq!(at_destination, b"hello_t, and more");

        let mut at_mirror = Vec::new();
        observer.read_to_end(&mut at_mirror).await.unwrap();
        assert_eq!(at_mirror, b"hello_t, and more");

        assert_eq!(std::fs::read(&capture_path).unwrap(), b"hello_t, and more");
        assert!(source.is_closed());
        assert!(destination.is_closed());
    }

    #[tokio::test]
    async fn test_buffer_size_is_clamped() {
        let (source, _client) = link_with_remote("source").await;
        let (destination, _server) = link_with_remote("destination").await;

        let huge = StreamCopier::new(
            Uuid::new_v4(),
            Direction::Upstream,
            Arc::clone(&source),
            Arc::clone(&destination),
            usize::MAX,
        );
        assert_eq!(huge.buffer_size, Config::MAX_BUFFER_SIZE);

        let empty = StreamCopier::new(Uuid::new_v4(), Direction::Upstream, source, destination, 0);
        assert_eq!(empty.buffer_size, 1);
    }

    #[tokio::test]
    async fn test_failed_mirror_does_not_stop_forwarding() {
        let (source, mut client) = link_with_remote("source").await;
        let (destination, mut server) = link_with_remote("destination").await;
        let (mirror_local, _observer) = tcp_pair().await.unwrap();
        let mirror = Link::new("upstream mirror", mirror_local);
        mirror.close();

        let handle = StreamCopier::new(
            Uuid::new_v4(),
            Direction::Upstream,
            source,
            destination,
            1024,
        )
        .with_mirror(Some(mirror))
        .spawn();

        client.write_all(b"payload").await.unwrap();
        client.shutdown().await.unwrap();

        let report = timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap();
        assert_eq!(report.bytes_forwarded, 7);
        assert_eq!(report.bytes_mirrored, 0);
        assert!(report.mirror_detached);

        let mut at_destination = Vec::new();
        server.read_to_end(&mut at_destination).await.unwrap();
        assert_eq!(at_destination, b"payload");
    }

    #[tokio::test]
    async fn test_closing_shared_links_stops_the_peer_direction() {
        let (source, _client) = link_with_remote("source").await;
        let (destination, _server) = link_with_remote("destination").await;

        // Downstream copier blocks reading the destination, nothing ever arrives.
        let handle = StreamCopier::new(
            Uuid::new_v4(),
            Direction::Downstream,
            Arc::clone(&destination),
            Arc::clone(&source),
            16,
        )
        .spawn();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        // What the upstream copier does on exit.
        source.close();
        destination.close();

        let report = timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap();
        assert_eq!(report.end, CopyEnd::Closed);
        assert_eq!(report.bytes_forwarded, 0);
    }

    #[tokio::test]
    async fn test_nothing_is_captured_when_nothing_was_read() {
        let (source, mut client) = link_with_remote("source").await;
        let (destination, _server) = link_with_remote("destination").await;

        let dir = TempDir::new().unwrap();
        let capture_path = dir.path().join("down.bin");
        let sink = Arc::new(CaptureSink::open(&capture_path).await.unwrap());

        client.shutdown().await.unwrap();
        let report = StreamCopier::new(
            Uuid::new_v4(),
            Direction::Downstream,
            source,
            destination,
            8,
        )
        .with_capture(Some(sink))
        .run()
        .await;

        assert_eq!(report.end, CopyEnd::Eof);
        assert_eq!(report.chunks, 0);
        assert!(std::fs::read(&capture_path).unwrap().is_empty());
    }
}
