use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub fetch: FetchConfig,
    pub server: ServerConfig,
    pub sessions: SessionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Deadline of every request scope
    pub request_timeout: Duration,
    /// How long shutdown waits for outstanding work
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
    /// File stem of the store, `<db_name>.redb`
    pub db_name: String,
    /// Insert the default admin account into an empty store
    pub seed_admin: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_days: u32,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_body_bytes: usize,
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            db_name: "morbo".to_string(),
            seed_admin: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_days: 30,
            sweep_interval: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.idle_days))
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_defaults = ServerConfig::default();
        let storage_defaults = StorageConfig::default();
        let session_defaults = SessionConfig::default();
        let fetch_defaults = FetchConfig::default();

        let config = Config {
            server: ServerConfig {
                bind_address: lookup("BIND_ADDRESS").unwrap_or(server_defaults.bind_address),
                request_timeout: secs(
                    &lookup,
                    "REQUEST_TIMEOUT_SECS",
                    server_defaults.request_timeout,
                )?,
                shutdown_timeout: secs(
                    &lookup,
                    "SHUTDOWN_TIMEOUT_SECS",
                    server_defaults.shutdown_timeout,
                )?,
            },
            storage: StorageConfig {
                data_dir: lookup("DATA_DIR").unwrap_or(storage_defaults.data_dir),
                db_name: lookup("DB_NAME").unwrap_or(storage_defaults.db_name),
                seed_admin: lookup("SEED_ADMIN")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(storage_defaults.seed_admin),
            },
            sessions: SessionConfig {
                idle_days: parsed(&lookup, "SESSION_IDLE_DAYS", session_defaults.idle_days)?,
                sweep_interval: secs(
                    &lookup,
                    "SWEEP_INTERVAL_SECS",
                    session_defaults.sweep_interval,
                )?,
            },
            fetch: FetchConfig {
                max_body_bytes: parsed(
                    &lookup,
                    "FETCH_MAX_BODY_BYTES",
                    fetch_defaults.max_body_bytes,
                )?,
                timeout: secs(&lookup, "FETCH_TIMEOUT_SECS", fetch_defaults.timeout)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("REQUEST_TIMEOUT_SECS", self.server.request_timeout),
            ("SHUTDOWN_TIMEOUT_SECS", self.server.shutdown_timeout),
            ("SWEEP_INTERVAL_SECS", self.sessions.sweep_interval),
            ("FETCH_TIMEOUT_SECS", self.fetch.timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.sessions.idle_days == 0 {
            return Err(ConfigError::ValidationError(
                "SESSION_IDLE_DAYS must be greater than zero".to_string(),
            ));
        }
        if self.fetch.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "FETCH_MAX_BODY_BYTES must be greater than zero".to_string(),
            ));
        }
        if self.storage.db_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DB_NAME cannot be empty".to_string(),
            ));
        }

        if self.fetch.timeout > self.server.request_timeout {
            tracing::warn!(
                "FETCH_TIMEOUT_SECS exceeds REQUEST_TIMEOUT_SECS; \
                 fetches will be cut short by the request deadline"
            );
        }

        Ok(())
    }
}

fn parsed<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::ValidationError(format!("{name} has an invalid value: {raw:?}"))
        }),
    }
}

fn secs<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(lookup, name, default.as_secs()).map(Duration::from_secs)
}
