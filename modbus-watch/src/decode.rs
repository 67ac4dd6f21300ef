//! Interpretation of raw register bytes.

use serde::{Deserialize, Serialize};

/// Data type interpretation for 16-bit registers.
///
/// Words arrive big-endian on the wire. The `*Le` variants only swap the
/// order of the two words of a 32-bit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 16-bit integer (default)
    #[default]
    U16,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 32-bit integer (2 registers, big-endian)
    U32,
    /// Signed 32-bit integer (2 registers, big-endian)
    I32,
    /// 32-bit float (2 registers, big-endian)
    F32,
    /// Unsigned 32-bit integer (2 registers, little-endian word order)
    U32Le,
    /// Signed 32-bit integer (2 registers, little-endian word order)
    I32Le,
    /// 32-bit float (2 registers, little-endian word order)
    F32Le,
}

impl DataType {
    /// Number of 16-bit words per value.
    pub fn words(&self) -> u16 {
        match self {
            DataType::U16 | DataType::I16 => 1,
            _ => 2,
        }
    }

    /// Decode one value from its big-endian register bytes.
    ///
    /// Returns `None` if `raw` is not exactly `2 * words()` bytes long.
    pub fn decode(&self, raw: &[u8]) -> Option<f64> {
        if raw.len() != 2 * usize::from(self.words()) {
            return None;
        }

        let word = |i: usize| u16::from_be_bytes([raw[2 * i], raw[2 * i + 1]]);

        let value = match self {
            DataType::U16 => f64::from(word(0)),
            DataType::I16 => f64::from(word(0) as i16),
            DataType::U32 => f64::from(join(word(0), word(1))),
            DataType::I32 => f64::from(join(word(0), word(1)) as i32),
            DataType::F32 => f64::from(f32::from_bits(join(word(0), word(1)))),
            DataType::U32Le => f64::from(join(word(1), word(0))),
            DataType::I32Le => f64::from(join(word(1), word(0)) as i32),
            DataType::F32Le => f64::from(f32::from_bits(join(word(1), word(0)))),
        };

        Some(value)
    }
}

fn join(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// Flatten 16-bit words into big-endian bytes.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

/// One byte per bit, `0` or `1`.
pub fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    bits.iter().map(|&bit| u8::from(bit)).collect()
}

/// Lowercase hex rendering of raw bytes, e.g. `00ff`.
pub fn hex(raw: &[u8]) -> String {
    raw.iter().map(|byte| format!("{:02x}", byte)).collect()
}
