//! Per-direction forwarding and payload capture.

pub mod capture_sink;
pub mod stream_copier;
pub mod types;

pub use capture_sink::{CaptureSink, CaptureSinks};
pub use stream_copier::StreamCopier;
pub use types::{CopyEnd, CopyReport, Direction};
