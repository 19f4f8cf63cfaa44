//! Keyed field groups
//!
//! A dict field bundles named subfields of one type into a single value.
//! Like arrays, extraction succeeds as a whole with unknown entries mapped
//! to `None`.

use std::collections::BTreeMap;

use super::buffer::SiStorage;
use super::error::StorageError;
use super::field::SiField;

/// A group of named subfields read and written together
#[derive(Debug)]
pub struct SiDict<F: SiField> {
    fields: Vec<(String, F)>,
}

impl<F: SiField> SiDict<F> {
    /// A dict over named subfields, in display order
    pub fn new(fields: Vec<(String, F)>) -> Self {
        SiDict { fields }
    }

    /// The names of the subfields, in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl<F: SiField> SiField for SiDict<F> {
    type Value = BTreeMap<String, Option<F::Value>>;

    fn is_value_valid(&self, value: &Self::Value) -> bool {
        self.fields.iter().all(|(name, field)| {
            value.get(name).map_or(true, |element| {
                element
                    .as_ref()
                    .map_or(true, |element| field.is_value_valid(element))
            })
        })
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for (name, field) in &self.fields {
            let formatted = match value.get(name) {
                Some(Some(element)) => field.value_to_string(element)?,
                _ => "?".to_string(),
            };
            parts.push(format!("{}: {}", name, formatted));
        }
        Ok(parts.join(", "))
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        let err = || StorageError::ValueFromString {
            input: string.to_string(),
        };
        let mut value = BTreeMap::new();
        for part in string.split(", ") {
            let (name, formatted) = part.split_once(": ").ok_or_else(err)?;
            let (_, field) = self
                .fields
                .iter()
                .find(|(candidate, _)| candidate == name)
                .ok_or_else(err)?;
            let element = if formatted == "?" {
                None
            } else {
                Some(field.value_from_string(formatted)?)
            };
            value.insert(name.to_string(), element);
        }
        Ok(value)
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        Some(
            self.fields
                .iter()
                .map(|(name, field)| (name.clone(), field.extract_value(storage)))
                .collect(),
        )
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        for (name, field) in &self.fields {
            if let Some(Some(element)) = value.get(name) {
                field.update_value(storage, element)?;
            }
        }
        Ok(())
    }
}
