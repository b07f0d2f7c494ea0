//! Tracing subscriber setup shared by the binaries

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set, else `logging.level` for this
/// library and for the calling binary's target (`env!("CARGO_CRATE_NAME")`
/// evaluated in the binary).
pub fn env_filter(config: &LoggingConfig, bin_target: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::new("warn");
    for target in [env!("CARGO_CRATE_NAME"), bin_target] {
        let directive = format!("{}={}", target, config.level);
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("Invalid log level \"{}\"", config.level))?,
        );
    }
    Ok(filter)
}

/// Install the global subscriber in the configured format
pub fn init(config: &LoggingConfig, bin_target: &str) -> Result<()> {
    let filter = env_filter(config, bin_target)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "loud!".to_string(),
            ..Default::default()
        };
        assert!(env_filter(&config, "postprocessing").is_err());
    }

    #[test]
    fn test_binary_and_library_targets_enabled() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let filter = env_filter(&LoggingConfig::default(), "postprocessing").unwrap();
        let subscriber = tracing_subscriber::registry().with(filter);

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "postprocessing", Level::INFO));
            assert!(tracing::enabled!(target: "genai_image_services::api", Level::INFO));
            assert!(!tracing::enabled!(target: "postprocessing", Level::DEBUG));
            assert!(!tracing::enabled!(target: "hyper", Level::INFO));
            assert!(tracing::enabled!(target: "hyper", Level::WARN));
        });
    }
}
