//! Watcher configuration.

use serde::{Deserialize, Serialize};

/// The register range a [`RegisterWatcher`](crate::RegisterWatcher) polls.
///
/// Values are not validated. A zero quantity or register size is accepted and
/// simply produces empty snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// First register address of the range.
    pub address: u16,

    /// Number of registers in the range.
    #[serde(default = "default_quantity")]
    pub quantity: u16,

    /// Modbus unit/slave id passed to the reader.
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,

    /// Width of one register in bytes.
    #[serde(default = "default_register_size")]
    pub register_size: usize,
}

fn default_quantity() -> u16 {
    1
}

fn default_slave_id() -> u8 {
    1
}

fn default_register_size() -> usize {
    2
}

impl WatcherConfig {
    /// Create a new configuration.
    pub fn new(address: u16, quantity: u16, slave_id: u8, register_size: usize) -> Self {
        Self {
            address,
            quantity,
            slave_id,
            register_size,
        }
    }

    /// Number of bytes a successful read must return.
    pub fn expected_len(&self) -> usize {
        usize::from(self.quantity).saturating_mul(self.register_size)
    }

    /// One past the last address dispatched by a poll.
    pub fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.quantity)
    }

    /// Whether `address` is one of the registers dispatched by a poll.
    pub fn contains(&self, address: u16) -> bool {
        address >= self.address && u32::from(address) < self.end()
    }

    /// Byte offset of `address` within a snapshot.
    pub(crate) fn offset_of(&self, address: u16) -> usize {
        usize::from(address - self.address) * self.register_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{ address: 100, quantity: 4, slave_id: 3, register_size: 4 }"#;

        let config: WatcherConfig = json5::from_str(json).unwrap();
        assert_eq!(config, WatcherConfig::new(100, 4, 3, 4));
        assert_eq!(config.expected_len(), 16);
    }

    #[test]
    fn test_config_defaults() {
        let config: WatcherConfig = json5::from_str("{ address: 0 }").unwrap();
        assert_eq!(config.quantity, 1);
        assert_eq!(config.slave_id, 1);
        assert_eq!(config.register_size, 2);
    }

    #[test]
    fn test_contains() {
        let config = WatcherConfig::new(100, 2, 1, 2);
        assert!(!config.contains(99));
        assert!(config.contains(100));
        assert!(config.contains(101));
        assert!(!config.contains(102));
    }

    #[test]
    fn test_range_end_does_not_overflow() {
        let config = WatcherConfig::new(u16::MAX, 2, 1, 2);
        assert_eq!(config.end(), 65537);
        assert!(config.contains(u16::MAX));
        assert_eq!(config.offset_of(u16::MAX), 0);
    }
}
