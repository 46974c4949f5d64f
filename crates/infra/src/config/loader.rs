//! Configuration loader
//!
//! Loads the client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `API_BASE_URL` is not set, falls back to loading from file
//! 3. Probes the working directory and the executable directory for files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `API_BASE_URL`: Backend root (required for env loading)
//! - `API_KEY`: Key exchanged for bearer credentials
//! - `LOCAL_MODE`: Use the local sentinel credential (true/false)
//! - `MAX_CONCURRENT_REQUESTS`: Connection pool size
//! - `REQUEST_TIMEOUT`: Per-request timeout in seconds (fractions allowed)
//! - `MAX_RETRY_ATTEMPTS`: Total attempts per operation
//! - `BATCH_SIZE`: Entities per sync batch
//! - `BATCH_CONCURRENCY`: Batches in flight at once
//! - `RETRY_BASE_DELAY_MS`: Base backoff delay in milliseconds
//! - `RETRY_MAX_DELAY_MS`: Backoff cap in milliseconds
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./guildsync.toml` or `./guildsync.json` (current working directory)
//! 2. `../guildsync.toml` or `../guildsync.json` (parent directory)
//! 3. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use guildsync_domain::{ClientConfig, DomainError, Result};

/// Environment variable names recognised by [`load_from_env`]
pub mod vars {
    pub const API_BASE_URL: &str = "API_BASE_URL";
    pub const API_KEY: &str = "API_KEY";
    pub const LOCAL_MODE: &str = "LOCAL_MODE";
    pub const MAX_CONCURRENT_REQUESTS: &str = "MAX_CONCURRENT_REQUESTS";
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
    pub const MAX_RETRY_ATTEMPTS: &str = "MAX_RETRY_ATTEMPTS";
    pub const BATCH_SIZE: &str = "BATCH_SIZE";
    pub const BATCH_CONCURRENCY: &str = "BATCH_CONCURRENCY";
    pub const RETRY_BASE_DELAY_MS: &str = "RETRY_BASE_DELAY_MS";
    pub const RETRY_MAX_DELAY_MS: &str = "RETRY_MAX_DELAY_MS";
}

const CONFIG_FILE_STEM: &str = "guildsync";

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the environment
/// does not describe a client (no `API_BASE_URL`), falls back to loading
/// from a config file.
///
/// # Errors
/// Returns `DomainError::Config` if:
/// - Configuration cannot be loaded from either source
/// - A value is malformed or fails validation
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) if std::env::var(vars::API_BASE_URL).is_ok() => {
            // The environment was meant to configure the client; don't mask
            // its error with a file lookup.
            Err(e)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from process environment variables
///
/// # Errors
/// Returns `DomainError::Config` if `API_BASE_URL` is missing, a value
/// cannot be parsed, or the resulting configuration is invalid.
pub fn load_from_env() -> Result<ClientConfig> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a configuration from an arbitrary variable lookup
///
/// Unset optional variables keep their defaults.
///
/// # Errors
/// See [`load_from_env`].
pub fn from_lookup<F>(lookup: F) -> Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let api_base_url = get(vars::API_BASE_URL).ok_or_else(|| {
        DomainError::Config(format!("Missing required environment variable: {}", vars::API_BASE_URL))
    })?;

    let mut config = ClientConfig { api_base_url, ..ClientConfig::default() };
    config.api_key = get(vars::API_KEY);

    if let Some(raw) = get(vars::LOCAL_MODE) {
        config.local_mode = parse_bool(vars::LOCAL_MODE, &raw)?;
    }
    if let Some(raw) = get(vars::MAX_CONCURRENT_REQUESTS) {
        config.max_concurrent_requests = parse_number(vars::MAX_CONCURRENT_REQUESTS, &raw)?;
    }
    if let Some(raw) = get(vars::REQUEST_TIMEOUT) {
        config.request_timeout = parse_seconds(vars::REQUEST_TIMEOUT, &raw)?;
    }
    if let Some(raw) = get(vars::MAX_RETRY_ATTEMPTS) {
        config.max_retry_attempts = parse_number(vars::MAX_RETRY_ATTEMPTS, &raw)?;
    }
    if let Some(raw) = get(vars::BATCH_SIZE) {
        config.batch_size = parse_number(vars::BATCH_SIZE, &raw)?;
    }
    if let Some(raw) = get(vars::BATCH_CONCURRENCY) {
        config.batch_concurrency = parse_number(vars::BATCH_CONCURRENCY, &raw)?;
    }
    if let Some(raw) = get(vars::RETRY_BASE_DELAY_MS) {
        config.retry_base_delay =
            Duration::from_millis(parse_number(vars::RETRY_BASE_DELAY_MS, &raw)?);
    }
    if let Some(raw) = get(vars::RETRY_MAX_DELAY_MS) {
        config.retry_max_delay =
            Duration::from_millis(parse_number(vars::RETRY_MAX_DELAY_MS, &raw)?);
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `DomainError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid or the configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(DomainError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            DomainError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| DomainError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| DomainError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| DomainError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(DomainError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory, its parent, and the executable
/// directory, TOML before JSON.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .into_iter()
        .flat_map(|root| {
            ["toml", "json"].map(|ext| root.join(format!("{CONFIG_FILE_STEM}.{ext}")))
        })
        .find(|path| path.exists())
}

/// Parse a boolean flag
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DomainError::Config(format!("Invalid boolean for {key}: '{raw}'"))),
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| DomainError::Config(format!("Invalid value for {key}: {e}")))
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration> {
    let seconds: f64 = parse_number(key, raw)?;
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| {
            DomainError::Config(format!("Invalid value for {key}: '{raw}' is not a positive duration"))
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn write_temp(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn test_bool_parsing() {
        for raw in ["1", "true", "YES", "on"] {
            assert!(parse_bool("X", raw).unwrap(), "{raw} should be true");
        }
        for raw in ["0", "false", "No", "OFF"] {
            assert!(!parse_bool("X", raw).unwrap(), "{raw} should be false");
        }
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_lookup_all_vars_set() {
        let config = from_lookup(lookup(&[
            ("API_BASE_URL", "https://bot-api.example.com/api"),
            ("API_KEY", "secret"),
            ("LOCAL_MODE", "false"),
            ("MAX_CONCURRENT_REQUESTS", "4"),
            ("REQUEST_TIMEOUT", "2.5"),
            ("MAX_RETRY_ATTEMPTS", "5"),
            ("BATCH_SIZE", "50"),
            ("BATCH_CONCURRENCY", "2"),
            ("RETRY_BASE_DELAY_MS", "100"),
            ("RETRY_MAX_DELAY_MS", "2000"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "https://bot-api.example.com/api");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert!(!config.local_mode);
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.batch_concurrency, 2);
        assert_eq!(config.retry_base_delay, Duration::from_millis(100));
        assert_eq!(config.retry_max_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_lookup_defaults_for_optional_vars() {
        let config = from_lookup(lookup(&[
            ("API_BASE_URL", "http://localhost:8000/api"),
            ("LOCAL_MODE", "1"),
        ]))
        .unwrap();

        assert!(config.local_mode);
        assert_eq!(config.api_key, None);
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_lookup_missing_base_url() {
        let err = from_lookup(lookup(&[("API_KEY", "secret")])).unwrap_err();
        assert!(matches!(err, DomainError::Config(msg) if msg.contains("API_BASE_URL")));
    }

    #[test]
    fn test_lookup_invalid_number() {
        let err = from_lookup(lookup(&[
            ("API_BASE_URL", "http://localhost:8000/api"),
            ("API_KEY", "secret"),
            ("BATCH_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DomainError::Config(msg) if msg.contains("BATCH_SIZE")));
    }

    #[test]
    fn test_lookup_rejects_non_positive_timeout() {
        for raw in ["0", "-1", "NaN"] {
            let result = from_lookup(lookup(&[
                ("API_BASE_URL", "http://localhost:8000/api"),
                ("API_KEY", "secret"),
                ("REQUEST_TIMEOUT", raw),
            ]));
            assert!(result.is_err(), "timeout '{raw}' should be rejected");
        }
    }

    #[test]
    fn test_lookup_runs_validation() {
        let result = from_lookup(lookup(&[
            ("API_BASE_URL", "http://localhost:8000/api"),
            ("API_KEY", "secret"),
            ("MAX_RETRY_ATTEMPTS", "0"),
        ]));
        assert!(matches!(result, Err(DomainError::Config(_))));
    }

    #[test]
    fn test_load_from_file_toml() {
        let (_guard, path) = write_temp(
            r#"
api_base_url = "https://bot-api.example.com/api"
api_key = "secret"
max_concurrent_requests = 6
request_timeout_ms = 1500
batch_size = 25
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        assert_eq!(config.max_concurrent_requests, 6);
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_retry_attempts, 3);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_json() {
        let (_guard, path) = write_temp(
            r#"{ "api_base_url": "http://localhost:8000/api", "local_mode": true, "batch_concurrency": 3 }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        assert!(config.local_mode);
        assert_eq!(config.batch_concurrency, 3);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/guildsync.json")));
        assert!(matches!(result, Err(DomainError::Config(_))));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let (_guard, path) = write_temp(r#"{ "this is": "not valid json" "#, "json");
        assert!(load_from_file(Some(path.clone())).is_err());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", Path::new("guildsync.yaml"));
        assert!(result.is_err(), "Should fail with unsupported format");
    }
}
