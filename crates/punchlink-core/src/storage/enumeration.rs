//! Enumerated fields
//!
//! An enum field decodes an underlying integer into a named variant. The
//! raw integer can hold values outside the variant set; those extract as
//! `None` rather than failing, since stations in the field do report
//! unassigned codes.

use super::buffer::SiStorage;
use super::error::StorageError;
use super::field::SiField;
use super::int::SiInt;

/// A named-variant view over an integer field
#[derive(Debug, Clone)]
pub struct SiEnum {
    int: SiInt,
    variants: Vec<(u64, &'static str)>,
}

impl SiEnum {
    /// An enum over `int` with the given value-to-name mapping
    pub fn new(int: SiInt, variants: Vec<(u64, &'static str)>) -> Self {
        SiEnum { int, variants }
    }

    fn name_of(&self, raw: u64) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(value, _)| *value == raw)
            .map(|(_, name)| *name)
    }

    fn value_of(&self, name: &str) -> Option<u64> {
        self.variants
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(value, _)| *value)
    }
}

impl SiField for SiEnum {
    type Value = &'static str;

    fn is_value_valid(&self, value: &Self::Value) -> bool {
        self.value_of(value).is_some()
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        Ok((*value).to_string())
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        self.variants
            .iter()
            .find(|(_, name)| *name == string.trim())
            .map(|(_, name)| *name)
            .ok_or_else(|| StorageError::UnknownVariant(string.to_string()))
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        let raw = self.int.extract_value(storage)?;
        self.name_of(raw)
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        let raw = self
            .value_of(value)
            .ok_or_else(|| StorageError::UnknownVariant((*value).to_string()))?;
        self.int.update_value(storage, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mode_enum() -> SiEnum {
        SiEnum::new(
            SiInt::from_offsets(&[0]),
            vec![(0x02, "Control"), (0x04, "Finish")],
        )
    }

    #[test]
    fn test_extract_known_variant() {
        let field = mode_enum();
        let storage = SiStorage::from_bytes(&[0x04]);
        assert_eq!(field.extract_value(&storage), Some("Finish"));
    }

    #[test]
    fn test_extract_unmapped_raw_is_none() {
        let field = mode_enum();
        let storage = SiStorage::from_bytes(&[0x7f]);
        assert_eq!(field.extract_value(&storage), None);
    }

    #[test]
    fn test_update_by_name() {
        let field = mode_enum();
        let mut storage = SiStorage::from_bytes(&[0x00]);
        field.update_value(&mut storage, &"Control").unwrap();
        assert_eq!(storage.byte(0), Some(0x02));
        assert_eq!(
            field.update_value(&mut storage, &"Start"),
            Err(StorageError::UnknownVariant("Start".to_string()))
        );
    }
}
