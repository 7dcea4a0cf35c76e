//! Network side of the forwarder: the accept loop and the connection wrapper shared by the
//! stream copiers of a session.

pub mod link;
pub mod network_listener;

#[cfg(test)]
pub(crate) mod test_support;

pub use link::Link;
pub use network_listener::{NetworkListener, StopHandle};
