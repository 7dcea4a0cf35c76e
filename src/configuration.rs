pub mod config;
pub mod types;

pub use config::{Args, Config, FileConfig};
pub use types::{AcceptErrorPolicy, Endpoint, LogSettings};
