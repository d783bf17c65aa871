mod config;

pub use config::{ConfigError, ZeroConfig};
