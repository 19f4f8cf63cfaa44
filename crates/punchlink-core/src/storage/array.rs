//! Repeated fields
//!
//! An array field applies a generated per-index descriptor a fixed number
//! of times. Extraction never fails as a whole: indices whose bytes are
//! unknown come back as `None` inside the vector.

use super::buffer::SiStorage;
use super::error::StorageError;
use super::field::SiField;

/// A fixed-length sequence of values of one field type
pub struct SiArray<F: SiField> {
    length: usize,
    field_at: Box<dyn Fn(usize) -> F + Send + Sync>,
}

impl<F: SiField> SiArray<F> {
    /// An array of `length` elements whose descriptors come from `field_at`
    pub fn new(length: usize, field_at: impl Fn(usize) -> F + Send + Sync + 'static) -> Self {
        SiArray {
            length,
            field_at: Box::new(field_at),
        }
    }

    /// Number of elements
    pub fn length(&self) -> usize {
        self.length
    }
}

impl<F: SiField> std::fmt::Debug for SiArray<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiArray").field("length", &self.length).finish()
    }
}

impl<F: SiField> SiField for SiArray<F> {
    type Value = Vec<Option<F::Value>>;

    fn is_value_valid(&self, value: &Self::Value) -> bool {
        value.len() == self.length
            && value.iter().enumerate().all(|(index, element)| {
                element
                    .as_ref()
                    .map_or(true, |element| (self.field_at)(index).is_value_valid(element))
            })
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        let mut parts = Vec::with_capacity(value.len());
        for (index, element) in value.iter().enumerate() {
            match element {
                None => parts.push("?".to_string()),
                Some(element) => parts.push((self.field_at)(index).value_to_string(element)?),
            }
        }
        Ok(parts.join(", "))
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        let parts: Vec<&str> = string.split(", ").collect();
        if parts.len() != self.length {
            return Err(StorageError::ValueFromString {
                input: string.to_string(),
            });
        }
        parts
            .iter()
            .enumerate()
            .map(|(index, part)| {
                if *part == "?" {
                    Ok(None)
                } else {
                    (self.field_at)(index).value_from_string(part).map(Some)
                }
            })
            .collect()
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        Some(
            (0..self.length)
                .map(|index| (self.field_at)(index).extract_value(storage))
                .collect(),
        )
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        for (index, element) in value.iter().enumerate() {
            if let Some(element) = element {
                (self.field_at)(index).update_value(storage, element)?;
            }
        }
        Ok(())
    }
}
