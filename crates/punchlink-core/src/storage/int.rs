//! Unsigned integer fields
//!
//! An integer may be scattered across whole bytes and partial bit ranges.
//! Parts are declared most significant first; each part contributes the
//! bits `start_bit..end_bit` of its byte.

use super::buffer::SiStorage;
use super::error::StorageError;
use super::field::SiField;

/// One contiguous bit range of an integer field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntPart {
    /// Byte offset within the storage
    pub byte_offset: usize,
    /// First bit (inclusive), 0 = least significant
    pub start_bit: u8,
    /// Last bit (exclusive)
    pub end_bit: u8,
}

impl IntPart {
    /// A part covering all 8 bits of a byte
    pub fn whole_byte(byte_offset: usize) -> Self {
        IntPart {
            byte_offset,
            start_bit: 0,
            end_bit: 8,
        }
    }

    /// A part covering bits `start_bit..end_bit` of a byte
    pub fn bits(byte_offset: usize, start_bit: u8, end_bit: u8) -> Self {
        debug_assert!(start_bit < end_bit && end_bit <= 8);
        IntPart {
            byte_offset,
            start_bit,
            end_bit,
        }
    }

    fn width(&self) -> u8 {
        self.end_bit - self.start_bit
    }

    fn mask(&self) -> u8 {
        ((1u16 << self.width()) - 1) as u8
    }
}

/// An unsigned integer field assembled from bit parts
#[derive(Debug, Clone)]
pub struct SiInt {
    parts: Vec<IntPart>,
}

impl SiInt {
    /// An integer field over `parts`, most significant part first
    pub fn new(parts: Vec<IntPart>) -> Self {
        SiInt { parts }
    }

    /// A field of consecutive whole bytes, most significant first
    pub fn from_offsets(offsets: &[usize]) -> Self {
        SiInt {
            parts: offsets.iter().map(|&o| IntPart::whole_byte(o)).collect(),
        }
    }
}

impl SiField for SiInt {
    type Value = u64;

    fn is_value_valid(&self, _value: &Self::Value) -> bool {
        true
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        Ok(value.to_string())
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        string
            .trim()
            .parse()
            .map_err(|_| StorageError::ValueFromString {
                input: string.to_string(),
            })
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        let mut value: u64 = 0;
        for part in &self.parts {
            let byte = storage.byte(part.byte_offset)?;
            let bits = (byte >> part.start_bit) & part.mask();
            value = (value << part.width()) | u64::from(bits);
        }
        Some(value)
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        // Partial-bit writes merge with existing content, so every touched
        // byte must be known before anything is written.
        for part in &self.parts {
            if !storage.is_known(part.byte_offset) {
                return Err(StorageError::ModifyUnknown);
            }
        }
        let mut remaining = *value;
        for part in self.parts.iter().rev() {
            let bits = (remaining as u8) & part.mask();
            remaining >>= part.width();
            let current = storage.byte(part.byte_offset).ok_or(StorageError::ModifyUnknown)?;
            let cleared = current & !(part.mask() << part.start_bit);
            storage.set_byte(part.byte_offset, cleared | (bits << part.start_bit))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_whole_byte_extraction_is_big_endian() {
        let field = SiInt::from_offsets(&[0, 1]);
        let storage = SiStorage::from_bytes(&[0xab, 0xcd]);
        assert_eq!(field.extract_value(&storage), Some(0xabcd));
    }

    #[test]
    fn test_partial_bit_extraction() {
        // High part is bits 4..8 of byte 1, low part all of byte 0.
        let field = SiInt::new(vec![IntPart::bits(1, 4, 8), IntPart::whole_byte(0)]);
        let storage = SiStorage::from_bytes(&[0xab, 0xcd]);
        assert_eq!(field.extract_value(&storage), Some(0xcab));
    }

    #[test]
    fn test_update_preserves_outside_bits() {
        let field = SiInt::new(vec![IntPart::bits(0, 2, 6)]);
        let mut storage = SiStorage::from_bytes(&[0b1000_0001]);
        field.update_value(&mut storage, &0b1111).unwrap();
        assert_eq!(storage.byte(0), Some(0b1011_1101));
        assert_eq!(field.extract_value(&storage), Some(0b1111));
    }

    #[test]
    fn test_update_roundtrip_multi_part() {
        let field = SiInt::new(vec![
            IntPart::bits(2, 0, 4),
            IntPart::whole_byte(0),
            IntPart::bits(1, 3, 7),
        ]);
        let mut storage = SiStorage::from_bytes(&[0, 0, 0]);
        for value in [0u64, 1, 0x7ff, 0xabc, 0xfff] {
            field.update_value(&mut storage, &value).unwrap();
            assert_eq!(field.extract_value(&storage), Some(value));
        }
    }

    #[test]
    fn test_update_unknown_byte_fails_before_writing() {
        let field = SiInt::from_offsets(&[0, 1]);
        let mut storage = SiStorage::new(2);
        storage.set_byte(0, 0x11).unwrap();
        assert_eq!(
            field.update_value(&mut storage, &0x2233),
            Err(StorageError::ModifyUnknown)
        );
        assert_eq!(storage.byte(0), Some(0x11));
    }

    #[test]
    fn test_extract_unknown_byte_is_none() {
        let field = SiInt::from_offsets(&[0, 1]);
        let mut storage = SiStorage::new(2);
        storage.set_byte(1, 0xff).unwrap();
        assert_eq!(field.extract_value(&storage), None);
    }
}
