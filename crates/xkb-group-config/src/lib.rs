//! Configuration parsing for xkb-group
//!
//! This crate handles parsing the KDL configuration file that selects the
//! X display, the non-layout symbols to skip, and the log level.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{load_config, parse_config, parse_config_str, DEFAULT_CONFIG_PATH};
