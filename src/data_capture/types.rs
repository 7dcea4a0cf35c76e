//! Common data types used across the data_capture subsystem.

use std::fmt;
use std::io;

/// Direction of TCP flow through a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes flowing from the source connection to the destination.
    Upstream,
    /// Bytes flowing from the destination back to the source connection.
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "src->dst"),
            Direction::Downstream => write!(f, "dst->src"),
        }
    }
}

/// Why a stream copier stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyEnd {
    /// The reader reached end of stream.
    Eof,
    /// One of the primary links was closed underneath the copier, normally by the copier of
    /// the opposite direction.
    Closed,
    /// Reading from the primary reader failed.
    ReadFailed(io::ErrorKind),
    /// Writing to the primary writer failed.
    WriteFailed(io::ErrorKind),
}

impl fmt::Display for CopyEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyEnd::Eof => write!(f, "end of stream"),
            CopyEnd::Closed => write!(f, "connection closed"),
            CopyEnd::ReadFailed(kind) => write!(f, "read failed ({:?})", kind),
            CopyEnd::WriteFailed(kind) => write!(f, "write failed ({:?})", kind),
        }
    }
}

/// Outcome of one stream copier run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub direction: Direction,
    /// Number of non-empty reads, each forwarded as one write.
    pub chunks: u64,
    pub bytes_forwarded: u64,
    pub bytes_mirrored: u64,
    pub bytes_captured: u64,
    /// `true` if a mirror was attached and later detached after a failure.
    pub mirror_detached: bool,
    pub end: CopyEnd,
}

impl CopyReport {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            chunks: 0,
            bytes_forwarded: 0,
            bytes_mirrored: 0,
            bytes_captured: 0,
            mirror_detached: false,
            end: CopyEnd::Eof,
        }
    }
}
