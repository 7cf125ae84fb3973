//! Transport NSW Common Library
//!
//! Shared plumbing for the Transport NSW exporter:
//!
//! - [`config`] - Configuration loading (JSON5 format) and logging settings
//! - [`error`] - Error types

pub mod config;
pub mod error;

pub use config::{LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};

/// Install the global `tracing` subscriber described by `config`.
///
/// A set `RUST_LOG` wins over `config.level`. Fails if the level is not a
/// valid filter directive or a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let output = match config.format {
        LogFormat::Text => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().flatten_event(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}

fn level_filter(level: &str) -> Result<tracing_subscriber::EnvFilter> {
    tracing_subscriber::EnvFilter::try_new(level)
        .map_err(|e| Error::Config(format!("Invalid log level {:?}: {}", level, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_accepts_directives() {
        assert!(level_filter("info").is_ok());
        assert!(level_filter("warn,transport_nsw_exporter=debug").is_ok());
    }

    #[test]
    fn test_level_filter_rejects_unknown_level() {
        let err = level_filter("transport_nsw_exporter=loud").unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }
}
