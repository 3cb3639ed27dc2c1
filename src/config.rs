//! Connection configuration
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. Config file (`.toml`, `.yaml`/`.yml` or `.json`)
//! 3. `AMTRON_*` environment variables (`AMTRON_HOST`, `AMTRON_UNIT_ID`, ...)
//! 4. Caller overrides (command line)
//!
//! ```yaml
//! host: 192.168.1.50
//! port: 502
//! unit_id: 1
//! scan_interval_secs: 10
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};

use crate::client::ModbusTcpClient;
use crate::device_limits::DeviceLimits;
use crate::error::ChargerError;
use crate::protocol::UnitId;
use crate::{DEFAULT_POLL_TIMEOUT_MS, DEFAULT_SETUP_TIMEOUT_MS, DEFAULT_TCP_PORT};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "AMTRON_";

/// Default Modbus unit id
pub const DEFAULT_UNIT_ID: UnitId = 1;

/// Default poll interval in seconds
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;

/// Accepted poll interval range in seconds
pub const MIN_SCAN_INTERVAL_SECS: u64 = 5;
pub const MAX_SCAN_INTERVAL_SECS: u64 = 60;

/// Connection parameters for one charger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerConfig {
    /// Charger IP address or hostname
    pub host: String,
    pub port: u16,
    /// Modbus unit (slave) id, 1-247
    pub unit_id: UnitId,
    pub scan_interval_secs: u64,
    /// Timeout for poll reads and control writes
    pub timeout_ms: u64,
    /// Timeout for the connect-only check during setup
    pub setup_timeout_ms: u64,
    /// Pause between block reads within one cycle
    pub inter_request_delay_ms: u64,
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_TCP_PORT,
            unit_id: DEFAULT_UNIT_ID,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            setup_timeout_ms: DEFAULT_SETUP_TIMEOUT_MS,
            inter_request_delay_ms: 0,
        }
    }
}

impl ChargerConfig {
    /// Defaults for `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Figment with defaults, the optional file and `AMTRON_*` variables
    pub fn figment(path: Option<&Path>) -> Result<Figment, ChargerError> {
        let mut figment = Figment::from(Serialized::defaults(ChargerConfig::default()));

        if let Some(path) = path {
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| ChargerError::Config("Config file must have an extension".to_string()))?;

            figment = match extension {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "json" => figment.merge(Json::file(path)),
                _ => {
                    return Err(ChargerError::Config(format!(
                        "Unsupported config file format: {}",
                        extension
                    )))
                }
            };
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ChargerError> {
        Self::from_figment(Self::figment(path)?)
    }

    /// Load, apply `overrides` on top, and validate
    pub fn load_with<P: Provider>(path: Option<&Path>, overrides: P) -> Result<Self, ChargerError> {
        Self::from_figment(Self::figment(path)?.merge(overrides))
    }

    fn from_figment(figment: Figment) -> Result<Self, ChargerError> {
        let config: Self = figment
            .extract()
            .map_err(|e| ChargerError::Config(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), ChargerError> {
        if self.host.trim().is_empty() {
            return Err(ChargerError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ChargerError::Config("port must not be 0".to_string()));
        }
        if !(1..=247).contains(&self.unit_id) {
            return Err(ChargerError::Config(format!(
                "unit_id {} out of range 1-247",
                self.unit_id
            )));
        }
        if !(MIN_SCAN_INTERVAL_SECS..=MAX_SCAN_INTERVAL_SECS).contains(&self.scan_interval_secs) {
            return Err(ChargerError::Config(format!(
                "scan_interval_secs {} out of range {}-{}",
                self.scan_interval_secs, MIN_SCAN_INTERVAL_SECS, MAX_SCAN_INTERVAL_SECS
            )));
        }
        if self.timeout_ms == 0 || self.setup_timeout_ms == 0 {
            return Err(ChargerError::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    pub fn device_limits(&self) -> DeviceLimits {
        DeviceLimits::new().with_inter_request_delay_ms(self.inter_request_delay_ms)
    }

    /// Client for polling and control, not yet connected
    pub fn build_client(&self) -> ModbusTcpClient {
        ModbusTcpClient::new(&self.host, self.port, self.unit_id, self.timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ChargerConfig::new("10.0.0.7");
        assert_eq!(config.port, 502);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.scan_interval(), Duration::from_secs(10));
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.setup_timeout(), Duration::from_secs(5));
        assert_eq!(config.endpoint(), "10.0.0.7:502");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_bounds() {
        let base = ChargerConfig::new("charger.local");

        assert!(ChargerConfig { host: " ".into(), ..base.clone() }.validate().is_err());
        assert!(ChargerConfig { port: 0, ..base.clone() }.validate().is_err());
        assert!(ChargerConfig { unit_id: 0, ..base.clone() }.validate().is_err());
        assert!(ChargerConfig { unit_id: 248, ..base.clone() }.validate().is_err());
        assert!(ChargerConfig { unit_id: 247, ..base.clone() }.validate().is_ok());
        assert!(ChargerConfig { scan_interval_secs: 4, ..base.clone() }.validate().is_err());
        assert!(ChargerConfig { scan_interval_secs: 5, ..base.clone() }.validate().is_ok());
        assert!(ChargerConfig { scan_interval_secs: 60, ..base.clone() }.validate().is_ok());
        assert!(ChargerConfig { scan_interval_secs: 61, ..base.clone() }.validate().is_err());
        assert!(ChargerConfig { timeout_ms: 0, ..base }.validate().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let file = write_temp(".yaml", "host: 192.168.1.50\nunit_id: 3\nscan_interval_secs: 30\n");
        let config = ChargerConfig::figment(Some(file.path()))
            .unwrap()
            .extract::<ChargerConfig>()
            .unwrap();
        assert_eq!(config.host, "192.168.1.50");
        assert_eq!(config.unit_id, 3);
        assert_eq!(config.scan_interval_secs, 30);
        assert_eq!(config.port, 502);
    }

    #[test]
    fn test_load_toml_with_overrides() {
        let file = write_temp(".toml", "host = \"charger.local\"\nport = 1502\n");
        let config = ChargerConfig::load_with(
            Some(file.path()),
            Serialized::defaults(serde_json::json!({ "port": 502, "unit_id": 2 })),
        )
        .unwrap();
        assert_eq!(config.host, "charger.local");
        assert_eq!(config.port, 502);
        assert_eq!(config.unit_id, 2);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let file = write_temp(".json", r#"{"host": "charger.local", "scan_interval_secs": 2}"#);
        let err = ChargerConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ChargerError::Config(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".ini", "host=x");
        assert!(ChargerConfig::figment(Some(file.path())).is_err());
    }
}
