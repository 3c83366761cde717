use crate::pool::PoolConfig;
use crate::utils::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub connector: ConnectorSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub api: ApiSettings,
}

/// Pool options as they appear in the config file. Durations are in
/// milliseconds; zero disables the corresponding timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_pool_name")]
    pub name: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_pool_increment")]
    pub pool_increment: usize,
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
    #[serde(default)]
    pub pool_min: usize,
    #[serde(default = "default_pool_timeout_ms")]
    pub pool_timeout_ms: u64,
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    #[serde(default = "default_queue_requests")]
    pub queue_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSettings {
    #[serde(default = "default_connector_address")]
    pub address: String,
    #[serde(default = "default_connector_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_telemetry_max_events")]
    pub max_events: usize,
    #[serde(default = "default_telemetry_retention_hours")]
    pub retention_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_bind_port")]
    pub bind_port: u16,
}

// Default values
fn default_pool_name() -> String {
    "default".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_pool_increment() -> usize {
    1
}

fn default_pool_max() -> usize {
    4
}

fn default_pool_timeout_ms() -> u64 {
    60_000
}

fn default_terminate_grace_ms() -> u64 {
    60_000
}

fn default_queue_requests() -> bool {
    true
}

fn default_connector_address() -> String {
    "127.0.0.1:5432".to_string()
}

fn default_connector_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_telemetry_max_events() -> usize {
    256
}

fn default_telemetry_retention_hours() -> u64 {
    24
}

fn default_api_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_bind_port() -> u16 {
    9180
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_increment: default_pool_increment(),
            pool_max: default_pool_max(),
            pool_min: 0,
            pool_timeout_ms: default_pool_timeout_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
            queue_requests: default_queue_requests(),
        }
    }
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            address: default_connector_address(),
            connect_timeout_ms: default_connector_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            max_events: default_telemetry_max_events(),
            retention_hours: default_telemetry_retention_hours(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_api_bind_address(),
            bind_port: default_api_bind_port(),
        }
    }
}

impl PoolSettings {
    /// Build the validated pool configuration.
    pub fn to_pool_config(&self) -> Result<PoolConfig> {
        let config = PoolConfig {
            name: self.name.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            pool_increment: self.pool_increment,
            pool_max: self.pool_max,
            pool_min: self.pool_min,
            pool_timeout: Duration::from_millis(self.pool_timeout_ms),
            terminate_grace: Duration::from_millis(self.terminate_grace_ms),
            queue_requests: self.queue_requests,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply a single `key=value` option.
    ///
    /// Accepts the camelCase option names (`connectTimeout`, `poolIncrement`,
    /// `poolMax`, `poolMin`, `poolTimeout`, `terminateGrace`, with durations
    /// in seconds) as well as the config file keys (durations in
    /// milliseconds).
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key.trim() {
            "name" => self.name = value.trim().to_string(),
            "connectTimeout" => self.connect_timeout_ms = parse_seconds(key, value)?,
            "connect_timeout_ms" => self.connect_timeout_ms = parse_count(key, value)? as u64,
            "poolIncrement" | "pool_increment" => self.pool_increment = parse_count(key, value)?,
            "poolMax" | "pool_max" => self.pool_max = parse_count(key, value)?,
            "poolMin" | "pool_min" => self.pool_min = parse_count(key, value)?,
            "poolTimeout" => self.pool_timeout_ms = parse_seconds(key, value)?,
            "pool_timeout_ms" => self.pool_timeout_ms = parse_count(key, value)? as u64,
            "terminateGrace" => self.terminate_grace_ms = parse_seconds(key, value)?,
            "terminate_grace_ms" => self.terminate_grace_ms = parse_count(key, value)? as u64,
            "queueRequests" | "queue_requests" => {
                self.queue_requests = value.trim().parse().map_err(|_| {
                    PoolError::Config(format!("{} must be true or false, got '{}'", key, value))
                })?
            }
            other => {
                return Err(PoolError::Config(format!("Unknown pool option: {}", other)));
            }
        }
        Ok(())
    }

    /// Apply an option written as `key=value`.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            PoolError::Config(format!("Expected KEY=VALUE, got '{}'", assignment))
        })?;
        self.set_option(key, value)
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    let number: f64 = value
        .trim()
        .parse()
        .map_err(|_| PoolError::Config(format!("{} must be a number, got '{}'", key, value)))?;
    if !number.is_finite() || number < 0.0 {
        return Err(PoolError::Config(format!(
            "{} must be a non-negative number, got '{}'",
            key, value
        )));
    }
    Ok(number)
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    let number = parse_number(key, value)?;
    if number.fract() != 0.0 {
        return Err(PoolError::Config(format!(
            "{} must be a whole number, got '{}'",
            key, value
        )));
    }
    Ok(number as usize)
}

/// Seconds (fractional allowed) to milliseconds.
fn parse_seconds(key: &str, value: &str) -> Result<u64> {
    Ok((parse_number(key, value)? * 1000.0).round() as u64)
}

impl ConnectorSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .to_socket_addrs()
            .map_err(|e| {
                PoolError::Config(format!("Invalid connector address '{}': {}", self.address, e))
            })?
            .next()
            .ok_or_else(|| {
                PoolError::Config(format!("Connector address '{}' did not resolve", self.address))
            })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PoolError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| PoolError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.pool.to_pool_config()?;

        if self.connector.address.trim().is_empty() {
            return Err(PoolError::Config(
                "connector address cannot be empty".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(PoolError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        if self.api.enabled && self.api.bind_port == 0 {
            return Err(PoolError::Config(
                "api.bind_port must be set when the API is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[pool]
name = "default"
connect_timeout_ms = 30000   # Max wait for a connection (0 = wait without deadline)
pool_increment = 1           # Connections added per growth event
pool_max = 4                 # Hard capacity ceiling
pool_min = 0                 # Floor kept even when idle
pool_timeout_ms = 60000      # Idle eviction delay (0 = never evict)
terminate_grace_ms = 60000   # Grace period for leases on graceful shutdown
queue_requests = true        # false = fail immediately when the pool is full

[connector]
address = "127.0.0.1:5432"
connect_timeout_ms = 5000

[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "pretty"  # Options: "pretty", "json"

[telemetry]
max_events = 256
retention_hours = 24

[api]
enabled = false
bind_address = "127.0.0.1"
bind_port = 9180
"#;

        std::fs::write(path.as_ref(), example)
            .map_err(|e| PoolError::Config(format!("Failed to write example config: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool.pool_max, 4);
        assert_eq!(config.pool.pool_min, 0);
        assert_eq!(config.pool.connect_timeout_ms, 30_000);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pool.pool_min = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api.enabled = true;
        config.api.bind_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn camel_case_options_take_seconds() {
        let mut settings = PoolSettings::default();
        settings.set_option("connectTimeout", "2.5").unwrap();
        settings.set_option("poolTimeout", "0").unwrap();
        settings.set_option("terminateGrace", "10").unwrap();
        settings.set_option("poolMax", "8").unwrap();

        let config = settings.to_pool_config().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.pool_timeout, Duration::ZERO);
        assert_eq!(config.terminate_grace, Duration::from_secs(10));
        assert_eq!(config.pool_max, 8);
    }

    #[test]
    fn options_reject_negative_and_fractional_counts() {
        let mut settings = PoolSettings::default();
        assert!(settings.set_option("poolMax", "-1").is_err());
        assert!(settings.set_option("poolMin", "1.5").is_err());
        assert!(settings.set_option("connectTimeout", "-0.1").is_err());
        assert!(settings.set_option("poolIncrement", "many").is_err());
        assert!(settings.set_option("poolSize", "3").is_err());
        assert_eq!(settings.pool_max, 4);
    }

    #[test]
    fn assignments_split_on_equals() {
        let mut settings = PoolSettings::default();
        settings.apply_assignment("pool_min=2").unwrap();
        settings.apply_assignment("queueRequests=false").unwrap();
        assert_eq!(settings.pool_min, 2);
        assert!(!settings.queue_requests);
        assert!(settings.apply_assignment("pool_min").is_err());
    }
}
