//! Single-bit boolean fields

use super::buffer::SiStorage;
use super::error::StorageError;
use super::field::SiField;

/// A flag stored as one bit of a byte
#[derive(Debug, Clone, Copy)]
pub struct SiBool {
    byte_offset: usize,
    bit_offset: u8,
}

impl SiBool {
    /// A flag at bit `bit_offset` of the byte at `byte_offset`
    pub fn new(byte_offset: usize, bit_offset: u8) -> Self {
        debug_assert!(bit_offset < 8);
        SiBool {
            byte_offset,
            bit_offset,
        }
    }
}

impl SiField for SiBool {
    type Value = bool;

    fn is_value_valid(&self, _value: &Self::Value) -> bool {
        true
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        Ok(if *value { "true" } else { "false" }.to_string())
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        match string.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(StorageError::ValueFromString {
                input: other.to_string(),
            }),
        }
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        let byte = storage.byte(self.byte_offset)?;
        Some((byte >> self.bit_offset) & 0x01 == 0x01)
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        let current = storage
            .byte(self.byte_offset)
            .ok_or(StorageError::ModifyUnknown)?;
        let bit = 1u8 << self.bit_offset;
        let updated = if *value { current | bit } else { current & !bit };
        storage.set_byte(self.byte_offset, updated)
    }
}
