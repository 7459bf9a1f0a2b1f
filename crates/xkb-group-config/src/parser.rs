//! KDL configuration parser

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;

/// Where the CLI looks for its configuration unless told otherwise
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/xkb-group/config.kdl";

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Load a configuration file, tolerating its absence unless `required`
///
/// A missing optional file yields [`Config::default`].
pub fn load_config(path: &Path, required: bool) -> Result<Config, ConfigError> {
    if !path.exists() {
        if required {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        tracing::debug!("No configuration at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    parse_config(path)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so we need to extract offset/len manually
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "display" => {
                config.display = Some(parse_display(node)?);
            }
            "ignore-symbols" => {
                config.ignore_symbols = Some(string_entries(node)?);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    let val = first_string(child)?;
                    global.log_level = val
                        .parse()
                        .map_err(|e| ConfigError::Invalid { message: e })?;
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_display(node: &kdl::KdlNode) -> Result<String, ConfigError> {
    let display = first_string(node)?;
    if display.trim().is_empty() {
        return Err(ConfigError::Invalid {
            message: "display must not be empty".to_string(),
        });
    }
    Ok(display.to_string())
}

fn first_string(node: &kdl::KdlNode) -> Result<&str, ConfigError> {
    let name = node.name().value();
    let entry = node.entries().first().ok_or_else(|| ConfigError::MissingValue {
        node: name.to_string(),
    })?;

    entry.value().as_string().ok_or_else(|| ConfigError::Invalid {
        message: format!("`{}` expects a string, got {}", name, entry.value()),
    })
}

fn string_entries(node: &kdl::KdlNode) -> Result<Vec<String>, ConfigError> {
    node.entries()
        .iter()
        .map(|entry| {
            entry
                .value()
                .as_string()
                .map(|s| s.to_string())
                .ok_or_else(|| ConfigError::Invalid {
                    message: format!(
                        "`{}` expects strings, got {}",
                        node.name().value(),
                        entry.value()
                    ),
                })
        })
        .collect()
}
