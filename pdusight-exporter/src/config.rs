//! Configuration for the PDU exporter.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Metrics HTTP endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Base polling interval in seconds. Structural discovery re-runs every
    /// ten intervals.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Metric name prefix (default: "pdu").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Default label policy, overridable per device.
    #[serde(default)]
    pub labels: LabelPolicy,

    /// What to do when a device's first discovery pass fails.
    #[serde(default)]
    pub on_discovery_failure: DiscoveryFailurePolicy,

    /// Devices to poll.
    pub devices: Vec<DeviceConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metrics HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (default: "0.0.0.0:2112").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for the metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:2112".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

fn default_interval() -> u64 {
    10
}

fn default_namespace() -> String {
    "pdu".to_string()
}

/// Which derived attributes become metric labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LabelPolicy {
    /// Label series with the configured device name instead of the name the
    /// device reports.
    #[serde(default)]
    pub use_config_name: bool,

    /// Attach the nameplate serial number.
    #[serde(default = "default_true")]
    pub serial_number: bool,

    /// Attach the SNMP sysName.
    #[serde(default)]
    pub snmp_sys_name: bool,

    /// Attach the SNMP sysLocation.
    #[serde(default)]
    pub snmp_sys_location: bool,

    /// Attach the SNMP sysContact.
    #[serde(default)]
    pub snmp_sys_contact: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            use_config_name: false,
            serial_number: true,
            snmp_sys_name: false,
            snmp_sys_location: false,
            snmp_sys_contact: false,
        }
    }
}

impl LabelPolicy {
    /// SNMP polling is only worth the extra call when some SNMP-derived
    /// label is enabled.
    pub fn wants_snmp(&self) -> bool {
        self.snmp_sys_name || self.snmp_sys_location || self.snmp_sys_contact
    }
}

/// Policy for a device whose very first discovery pass fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryFailurePolicy {
    /// Exit the process. Appropriate for single-device deployments.
    Abort,
    /// Log, keep the device registered with an empty catalog and let the
    /// discovery cadence retry. One unreachable device never blocks a pool.
    #[default]
    Skip,
}

/// Configuration for a single PDU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name, used for endpoint filtering and (by policy) labels.
    pub name: String,

    /// Address of the PDU JSON-RPC endpoint; a bare `host[:port]` is
    /// accepted.
    pub address: String,

    /// Username for PDU access.
    pub username: String,

    /// Password for PDU access.
    pub password: String,

    /// Timeout of PDU RPC requests in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Per-device label policy override.
    #[serde(default)]
    pub labels: Option<LabelPolicy>,
}

fn default_timeout() -> u64 {
    10
}

impl DeviceConfig {
    /// Base URL for the device, defaulting the scheme when the address is a
    /// bare host. A port mentioning 443 implies HTTPS.
    pub fn url(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.clone()
        } else if self.address.contains("443") {
            format!("https://{}", self.address)
        } else {
            format!("http://{}", self.address)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Validation(
                "At least one device must be configured".to_string(),
            ));
        }

        for device in &self.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Device name cannot be empty".to_string(),
                ));
            }

            if device.address.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': address cannot be empty",
                    device.name
                )));
            }

            if device.timeout_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': timeout_secs must be > 0",
                    device.name
                )));
            }

            let duplicates = self
                .devices
                .iter()
                .filter(|d| d.name == device.name)
                .count();
            if duplicates > 1 {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device name '{}'",
                    device.name
                )));
            }
        }

        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "interval_secs must be > 0".to_string(),
            ));
        }

        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.server.listen
            )));
        }

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective label policy for one device.
    pub fn device_labels(&self, device: &DeviceConfig) -> LabelPolicy {
        device.labels.unwrap_or(self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(devices: &str) -> String {
        format!("{{ devices: {devices} }}")
    }

    #[test]
    fn test_parse_minimal_config() {
        let json = minimal(
            r#"[{ name: "east-1", address: "10.0.0.1", username: "admin", password: "pw" }]"#,
        );
        let config = ExporterConfig::parse(&json).unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:2112");
        assert_eq!(config.server.path, "/metrics");
        assert_eq!(config.interval_secs, 10);
        assert_eq!(config.namespace, "pdu");
        assert_eq!(config.on_discovery_failure, DiscoveryFailurePolicy::Skip);
        assert_eq!(config.devices[0].timeout_secs, 10);

        // Default label policy matches the exporter's historical behaviour.
        assert!(!config.labels.use_config_name);
        assert!(config.labels.serial_number);
        assert!(!config.labels.snmp_sys_name);
        assert!(!config.labels.wants_snmp());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            server: { listen: "127.0.0.1:9101", path: "/pdu/metrics" },
            interval_secs: 30,
            namespace: "power",
            on_discovery_failure: "abort",
            labels: { use_config_name: true, serial_number: false, snmp_sys_name: true },
            devices: [
                {
                    name: "east-1",
                    address: "pdu-east-1.example.com",
                    username: "admin",
                    password: "pw",
                    timeout_secs: 5,
                },
                {
                    name: "west-1",
                    address: "https://pdu-west-1.example.com",
                    username: "admin",
                    password: "pw",
                    labels: { snmp_sys_name: false },
                },
            ],
            logging: { level: "debug", format: "json" },
        }"#;

        let config = ExporterConfig::parse(json).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9101");
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.namespace, "power");
        assert_eq!(config.on_discovery_failure, DiscoveryFailurePolicy::Abort);
        assert!(config.labels.use_config_name);
        assert!(config.labels.wants_snmp());
        assert_eq!(config.logging.format, LogFormat::Json);

        // Per-device override replaces the global policy wholesale.
        let west = config.device_labels(&config.devices[1]);
        assert!(!west.use_config_name);
        assert!(west.serial_number);
        assert!(!west.wants_snmp());
    }

    #[test]
    fn test_address_normalization() {
        let device = |address: &str| DeviceConfig {
            name: "d".to_string(),
            address: address.to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 10,
            labels: None,
        };

        assert_eq!(device("10.0.0.1").url(), "http://10.0.0.1");
        assert_eq!(device("10.0.0.1:443").url(), "https://10.0.0.1:443");
        assert_eq!(device("http://10.0.0.1").url(), "http://10.0.0.1");
        assert_eq!(
            device("https://pdu.example.com").url(),
            "https://pdu.example.com"
        );
    }

    #[test]
    fn test_validate_empty_devices() {
        let result = ExporterConfig::parse("{ devices: [] }");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let json = minimal(
            r#"[
                { name: "east-1", address: "a", username: "u", password: "p" },
                { name: "east-1", address: "b", username: "u", password: "p" },
            ]"#,
        );
        let result = ExporterConfig::parse(&json);
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            server: { listen: "not-an-address" },
            devices: [{ name: "d", address: "a", username: "u", password: "p" }],
        }"#;
        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                interval_secs: 15,
                devices: [{{ name: "east-1", address: "10.0.0.1", username: "u", password: "p" }}],
            }}"#
        )
        .unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.interval_secs, 15);
        assert_eq!(config.devices[0].name, "east-1");
    }

    #[test]
    fn test_validate_zero_interval() {
        let json = r#"{
            interval_secs: 0,
            devices: [{ name: "d", address: "a", username: "u", password: "p" }],
        }"#;
        assert!(ExporterConfig::parse(json).is_err());
    }
}
