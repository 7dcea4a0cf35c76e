//! Session management core module.
//!
//! One session covers the full lifetime of a single accepted source connection: dialing the
//! destination and mirrors, running both stream copiers, and tearing everything down.

/// Submodule for session data structures.
pub mod session;
/// Submodule driving a session from accept to teardown.
pub mod session_handler;

pub use session::Session;
pub use session_handler::SessionHandler;

/// Represents the current status of a session.
///
/// Variants:
/// - `Pending`: The destination is being dialed.
/// - `Active`: Both directions are being forwarded.
/// - `Completed`: Both directions have finished.
/// - `Error`: The destination was unreachable or a forwarder task died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
    Error,
}
