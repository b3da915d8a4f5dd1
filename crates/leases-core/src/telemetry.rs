//! Process-wide tracing setup shared by the service binaries.

use crate::config::TelemetryConfig;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{value}'")]
    Filter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install the global tracing subscriber")]
    Install(#[from] SetGlobalDefaultError),
}

/// Install the subscriber for this process. `RUST_LOG` overrides the
/// configured level so operators can raise verbosity without a config change.
pub fn init(service: &str, config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(config)?,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing::info!(service, "telemetry initialised");
    Ok(())
}

fn configured_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::Filter {
        value: config.log_level.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_filter_is_reported_with_its_value() {
        let config = TelemetryConfig {
            log_level: "definitely not a filter".to_string(),
        };
        let error = configured_filter(&config).expect_err("invalid filter rejected");
        assert!(matches!(error, TelemetryError::Filter { ref value, .. } if value == &config.log_level));
    }

    #[test]
    fn level_names_build_a_filter() {
        let config = TelemetryConfig {
            log_level: "debug".to_string(),
        };
        assert!(configured_filter(&config).is_ok());
    }
}
