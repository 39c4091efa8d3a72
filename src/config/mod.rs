pub mod cli;
pub mod config;
pub mod file;
pub mod net;
pub mod types;

pub use config::Config;
pub use net::NetConfig;
pub use types::{FramingMode, LogLevel};
