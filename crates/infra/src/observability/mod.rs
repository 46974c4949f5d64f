//! Tracing initialisation
//!
//! Installs a global `tracing-subscriber` with an [`EnvFilter`] read from
//! `RUST_LOG` (default `info`).
//!
//! Set `RUST_LOG` to control log verbosity:
//! - `RUST_LOG=info` - Show info, warn, and error messages
//! - `RUST_LOG=guildsync_infra=debug` - Debug output for the sync client only
//! - `RUST_LOG=trace` - Show all messages (very verbose)

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, compact single-line output
    #[default]
    Pretty,
    /// Newline-delimited JSON, one object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" | "compact" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Error returned when a global subscriber is already installed
#[derive(Debug, thiserror::Error)]
#[error("tracing subscriber already initialised: {0}")]
pub struct TracingInitError(String);

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global tracing subscriber
///
/// Calling this more than once leaves the first subscriber in place and
/// returns an error.
///
/// # Errors
/// Returns [`TracingInitError`] if a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<(), TracingInitError> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter()).with_target(true);

    let result = match format {
        LogFormat::Pretty => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| TracingInitError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let _ = init_tracing(LogFormat::Pretty);
        assert!(init_tracing(LogFormat::Json).is_err());
    }
}
