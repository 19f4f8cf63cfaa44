//! Field descriptor trait
//!
//! A field describes where a typed value lives inside an [`SiStorage`] and
//! how to move it in and out. Descriptors are plain values; the same
//! descriptor can be applied to any number of storages.

use std::fmt;

use super::buffer::SiStorage;
use super::error::StorageError;

/// A typed view onto a region of an [`SiStorage`]
pub trait SiField {
    /// The decoded value type
    type Value: Clone + fmt::Debug;

    /// Whether `value` can be represented by this field
    fn is_value_valid(&self, value: &Self::Value) -> bool;

    /// Format `value` for display
    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError>;

    /// Parse a value from its display form
    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError>;

    /// Read the value out of `storage`, `None` when required bytes are unknown
    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value>;

    /// Write `value` into `storage` without validity checking
    fn update_value(&self, storage: &mut SiStorage, value: &Self::Value)
        -> Result<(), StorageError>;

    /// Read the value paired with its descriptor
    fn extract<'a>(&'a self, storage: &SiStorage) -> Option<FieldValue<'a, Self>>
    where
        Self: Sized,
    {
        self.extract_value(storage).map(|value| FieldValue {
            field: self,
            value,
        })
    }

    /// Validate and write `value` into `storage`
    fn update(&self, storage: &mut SiStorage, value: &Self::Value) -> Result<(), StorageError> {
        if !self.is_value_valid(value) {
            return Err(StorageError::InvalidValue(format!("{:?}", value)));
        }
        self.update_value(storage, value)
    }
}

/// A value coupled with the field it was read through
#[derive(Debug, Clone)]
pub struct FieldValue<'a, F: SiField> {
    /// The descriptor the value was extracted with
    pub field: &'a F,
    /// The decoded value
    pub value: F::Value,
}

impl<F: SiField> fmt::Display for FieldValue<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field.value_to_string(&self.value) {
            Ok(string) => f.write_str(&string),
            Err(_) => Ok(()),
        }
    }
}

/// Object-safe access to a field through its string representation.
///
/// Station layouts hold heterogeneous descriptors behind this trait so that
/// values can be listed and edited by name.
pub trait ErasedField: Send + Sync {
    /// Read the value as a display string, `None` when bytes are unknown
    fn extract_string(&self, storage: &SiStorage) -> Option<Result<String, StorageError>>;

    /// Parse `input` and write the resulting value
    fn update_string(&self, storage: &mut SiStorage, input: &str) -> Result<(), StorageError>;
}

impl<F: SiField + Send + Sync> ErasedField for F {
    fn extract_string(&self, storage: &SiStorage) -> Option<Result<String, StorageError>> {
        self.extract_value(storage)
            .map(|value| self.value_to_string(&value))
    }

    fn update_string(&self, storage: &mut SiStorage, input: &str) -> Result<(), StorageError> {
        let value = self.value_from_string(input)?;
        self.update(storage, &value)
    }
}
