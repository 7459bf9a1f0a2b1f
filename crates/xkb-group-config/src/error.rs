use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(xkb_group::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(xkb_group::config::invalid))]
    Invalid { message: String },

    #[error("Missing value for `{node}`")]
    #[diagnostic(
        code(xkb_group::config::missing_value),
        help("`{node}` takes at least one string argument")
    )]
    MissingValue { node: String },

    #[error("Configuration file not found: {}", path.display())]
    #[diagnostic(code(xkb_group::config::not_found))]
    NotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
