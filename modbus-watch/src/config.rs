//! Configuration for the Modbus watcher.

use register_watcher::WatcherConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::decode::DataType;
use crate::logging::LoggingConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

/// Complete watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusWatchConfig {
    /// Modbus-specific settings
    pub modbus: ModbusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modbus protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Devices to poll
    pub devices: Vec<DeviceConfig>,
}

/// Configuration for a single Modbus device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name (used in log lines)
    pub name: String,

    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout in milliseconds for connecting and for each read request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Re-report every watched register every N polls
    #[serde(default)]
    pub heartbeat_polls: Option<u64>,

    /// Register ranges to watch
    #[serde(default)]
    pub watches: Vec<WatchConfig>,
}

fn default_unit_id() -> u8 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

/// A contiguous range of registers watched for changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Register type
    #[serde(rename = "type")]
    pub register_type: RegisterType,

    /// Starting address (0-based)
    pub address: u16,

    /// Number of values in the range (default: 1)
    #[serde(default = "default_count")]
    pub count: u16,

    /// Optional name for this range (used in log lines)
    pub name: Option<String>,

    /// Data type interpretation for holding/input registers
    #[serde(default)]
    pub data_type: DataType,

    /// Only report these addresses (default: the whole range)
    #[serde(default)]
    pub only: Option<Vec<u16>>,
}

fn default_count() -> u16 {
    1
}

/// Modbus register types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    /// Discrete output coils (read/write, 1-bit)
    Coil,
    /// Discrete input contacts (read-only, 1-bit)
    Discrete,
    /// Input registers (read-only, 16-bit)
    Input,
    /// Holding registers (read/write, 16-bit)
    Holding,
}

impl RegisterType {
    /// Return the string name for this register type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Coil => "coil",
            RegisterType::Discrete => "discrete",
            RegisterType::Input => "input",
            RegisterType::Holding => "holding",
        }
    }

    /// Whether values of this type are single bits.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::Discrete)
    }
}

impl WatchConfig {
    /// Bytes per value in a snapshot: one per bit, two per 16-bit word.
    pub fn register_size(&self) -> usize {
        if self.register_type.is_bit() {
            1
        } else {
            2 * usize::from(self.data_type.words())
        }
    }

    /// Watcher configuration for this range on the given unit.
    pub fn watcher_config(&self, unit_id: u8) -> WatcherConfig {
        WatcherConfig::new(self.address, self.count, unit_id, self.register_size())
    }

    /// Name used in log lines.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}@{}", self.register_type.as_str(), self.address),
        }
    }

    /// Addresses that get a change callback.
    pub fn watched_addresses(&self) -> Vec<u16> {
        match &self.only {
            Some(only) => only.clone(),
            None => (0..self.count).map(|i| self.address.wrapping_add(i)).collect(),
        }
    }

    /// Decode one value of this range from its raw snapshot bytes.
    pub fn decode(&self, raw: &[u8]) -> Option<f64> {
        if self.register_type.is_bit() {
            match raw {
                [bit] => Some(f64::from(*bit)),
                _ => None,
            }
        } else {
            self.data_type.decode(raw)
        }
    }

    /// One past the last value address.
    fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.count)
    }

    /// Bits or 16-bit words requested on the wire for the whole range.
    fn wire_count(&self) -> u32 {
        if self.register_type.is_bit() {
            u32::from(self.count)
        } else {
            u32::from(self.count) * u32::from(self.data_type.words())
        }
    }
}

impl ModbusWatchConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ModbusWatchConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modbus.devices.is_empty() {
            return Err(ConfigError::Validation(
                "At least one device must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for device in &self.modbus.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Device name cannot be empty".to_string(),
                ));
            }

            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device name '{}'",
                    device.name
                )));
            }

            if device.unit_id == 0 || device.unit_id > 247 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': unit_id must be 1-247",
                    device.name
                )));
            }

            if device.poll_interval_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': poll_interval_ms must be greater than 0",
                    device.name
                )));
            }

            if device.heartbeat_polls == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': heartbeat_polls must be greater than 0",
                    device.name
                )));
            }

            if device.watches.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': must specify at least one watch",
                    device.name
                )));
            }

            for watch in &device.watches {
                validate_watch(&device.name, watch)?;
            }

            // Validate RTU parity
            if let ConnectionConfig::Rtu { parity, .. } = &device.connection {
                match parity.to_lowercase().as_str() {
                    "none" | "even" | "odd" => {}
                    _ => {
                        return Err(ConfigError::Validation(format!(
                            "Device '{}': invalid parity '{}' (use none, even, or odd)",
                            device.name, parity
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Most coils or discrete inputs one Modbus read may request.
const MAX_READ_BITS: u32 = 2000;

/// Most input or holding registers one Modbus read may request.
const MAX_READ_WORDS: u32 = 125;

fn validate_watch(device: &str, watch: &WatchConfig) -> Result<(), ConfigError> {
    if watch.count == 0 {
        return Err(ConfigError::Validation(format!(
            "Device '{}': watch '{}' has a zero count",
            device,
            watch.label()
        )));
    }

    if u32::from(watch.address) + watch.wire_count() > u32::from(u16::MAX) + 1 {
        return Err(ConfigError::Validation(format!(
            "Device '{}': watch '{}' runs past address 65535",
            device,
            watch.label()
        )));
    }

    let limit = if watch.register_type.is_bit() {
        MAX_READ_BITS
    } else {
        MAX_READ_WORDS
    };
    if watch.wire_count() > limit {
        return Err(ConfigError::Validation(format!(
            "Device '{}': watch '{}' reads {} {} in one request (max {})",
            device,
            watch.label(),
            watch.wire_count(),
            if watch.register_type.is_bit() { "bits" } else { "registers" },
            limit
        )));
    }

    if let Some(only) = &watch.only {
        for &address in only {
            if address < watch.address || u32::from(address) >= watch.end() {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': watch '{}' lists address {} outside its range",
                    device,
                    watch.label(),
                    address
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_config() {
        let json = r#"{
            modbus: {
                devices: [
                    {
                        name: "plc01",
                        connection: { type: "tcp", host: "192.168.1.10" },
                        watches: [
                            { type: "holding", address: 0, count: 10 }
                        ]
                    }
                ]
            }
        }"#;

        let config: ModbusWatchConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();
        let device = &config.modbus.devices[0];
        assert_eq!(device.name, "plc01");
        assert_eq!(device.unit_id, 1);
        assert_eq!(device.poll_interval_ms, 1000);
        assert_eq!(device.heartbeat_polls, None);

        if let ConnectionConfig::Tcp { host, port } = &device.connection {
            assert_eq!(host, "192.168.1.10");
            assert_eq!(*port, 502); // default
        } else {
            panic!("Expected TCP connection");
        }
    }

    #[test]
    fn test_parse_rtu_config() {
        let json = r#"{
            modbus: {
                devices: [
                    {
                        name: "sensor01",
                        connection: {
                            type: "rtu",
                            port: "/dev/ttyUSB0",
                            baud_rate: 19200,
                            parity: "even"
                        },
                        unit_id: 5,
                        heartbeat_polls: 30,
                        watches: [
                            { type: "input", address: 0, count: 4, data_type: "f32" }
                        ]
                    }
                ]
            }
        }"#;

        let config: ModbusWatchConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();
        let device = &config.modbus.devices[0];

        assert_eq!(device.unit_id, 5);
        assert_eq!(device.heartbeat_polls, Some(30));
        if let ConnectionConfig::Rtu {
            port,
            baud_rate,
            parity,
            ..
        } = &device.connection
        {
            assert_eq!(port, "/dev/ttyUSB0");
            assert_eq!(*baud_rate, 19200);
            assert_eq!(parity, "even");
        } else {
            panic!("Expected RTU connection");
        }
    }

    fn watch(register_type: RegisterType, address: u16, count: u16) -> WatchConfig {
        WatchConfig {
            register_type,
            address,
            count,
            name: None,
            data_type: DataType::default(),
            only: None,
        }
    }

    #[test]
    fn test_watcher_config_from_watch() {
        let mut holding = watch(RegisterType::Holding, 100, 4);
        assert_eq!(holding.watcher_config(7), WatcherConfig::new(100, 4, 7, 2));

        holding.data_type = DataType::F32;
        assert_eq!(holding.register_size(), 4);

        // Data type is ignored for bit registers.
        let mut coils = watch(RegisterType::Coil, 0, 8);
        coils.data_type = DataType::U32;
        assert_eq!(coils.register_size(), 1);
    }

    #[test]
    fn test_watched_addresses_and_label() {
        let mut range = watch(RegisterType::Input, 10, 3);
        assert_eq!(range.watched_addresses(), vec![10, 11, 12]);
        assert_eq!(range.label(), "input@10");

        range.only = Some(vec![12]);
        range.name = Some("pressure".to_string());
        assert_eq!(range.watched_addresses(), vec![12]);
        assert_eq!(range.label(), "pressure");
    }

    #[test]
    fn test_decode_bit_values() {
        let coils = watch(RegisterType::Coil, 0, 2);
        assert_eq!(coils.decode(&[1]), Some(1.0));
        assert_eq!(coils.decode(&[0]), Some(0.0));
        assert_eq!(coils.decode(&[0, 1]), None);
    }

    fn single_device(watches: &str) -> ModbusWatchConfig {
        let json = format!(
            r#"{{
                modbus: {{
                    devices: [
                        {{
                            name: "plc01",
                            connection: {{ type: "tcp", host: "127.0.0.1" }},
                            watches: {}
                        }}
                    ]
                }}
            }}"#,
            watches
        );
        json5::from_str(&json).unwrap()
    }

    #[test]
    fn test_validate_empty_devices() {
        let config: ModbusWatchConfig = json5::from_str("{ modbus: { devices: [] } }").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_watches() {
        assert!(single_device("[]").validate().is_err());
    }

    #[test]
    fn test_validate_zero_count() {
        let config = single_device(r#"[{ type: "holding", address: 0, count: 0 }]"#);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_range_overflow() {
        let config = single_device(r#"[{ type: "holding", address: 65535, count: 2 }]"#);
        assert!(config.validate().is_err());

        let config = single_device(r#"[{ type: "holding", address: 65535, count: 1 }]"#);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_multi_word_values_stay_in_address_space() {
        // One f32 at 65535 needs words 65535 and 65536.
        let config = single_device(
            r#"[{ type: "holding", address: 65535, count: 1, data_type: "f32" }]"#,
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("runs past address 65535"));

        let config = single_device(
            r#"[{ type: "input", address: 65534, count: 1, data_type: "u32le" }]"#,
        );
        assert!(config.validate().is_ok());

        // Bit registers are one address per value whatever the data type.
        let config = single_device(
            r#"[{ type: "coil", address: 65535, count: 1, data_type: "f32" }]"#,
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_request_limits() {
        let config = single_device(r#"[{ type: "holding", address: 0, count: 125 }]"#);
        assert!(config.validate().is_ok());

        let config = single_device(
            r#"[{ type: "holding", address: 0, count: 63, data_type: "i32" }]"#,
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reads 126 registers in one request (max 125)"));

        let config = single_device(r#"[{ type: "discrete", address: 0, count: 2000 }]"#);
        assert!(config.validate().is_ok());

        let config = single_device(r#"[{ type: "coil", address: 0, count: 2001 }]"#);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_only_outside_range() {
        let config = single_device(r#"[{ type: "coil", address: 8, count: 4, only: [12] }]"#);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("address 12 outside its range"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let json = r#"{
            modbus: {
                devices: [
                    { name: "a", connection: { type: "tcp", host: "10.0.0.1" },
                      watches: [{ type: "coil", address: 0 }] },
                    { name: "a", connection: { type: "tcp", host: "10.0.0.2" },
                      watches: [{ type: "coil", address: 0 }] }
                ]
            }
        }"#;

        let config: ModbusWatchConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: ModbusWatchConfig =
            json5::from_str(include_str!("../modbus-watch.json5")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.modbus.devices.len(), 2);
        assert_eq!(config.modbus.devices[1].watches[0].register_size(), 4);
    }

    #[test]
    fn test_validate_bad_parity() {
        let json = r#"{
            modbus: {
                devices: [
                    {
                        name: "sensor01",
                        connection: { type: "rtu", port: "/dev/ttyUSB0", parity: "mark" },
                        watches: [{ type: "input", address: 0 }]
                    }
                ]
            }
        }"#;

        let config: ModbusWatchConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }
}
