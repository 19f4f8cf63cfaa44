//! Partially-known byte storage
//!
//! A station's configuration memory is read in pieces, so any byte may be
//! unknown at a given moment. `SiStorage` models this directly: every byte
//! is `Option<u8>`, and unknown bytes flow through field extraction as
//! `None` instead of turning into errors.

use super::error::StorageError;
use super::field::{FieldValue, SiField};

/// A fixed-size buffer of possibly-unknown bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiStorage {
    data: Vec<Option<u8>>,
}

impl SiStorage {
    /// A storage of `size` bytes, all unknown
    pub fn new(size: usize) -> Self {
        SiStorage {
            data: vec![None; size],
        }
    }

    /// A storage where every byte is known
    pub fn from_bytes(bytes: &[u8]) -> Self {
        SiStorage {
            data: bytes.iter().copied().map(Some).collect(),
        }
    }

    /// Total size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the storage has zero size
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The byte at `offset`, `None` if unknown or out of bounds
    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied().flatten()
    }

    /// Whether the byte at `offset` holds a known value
    pub fn is_known(&self, offset: usize) -> bool {
        self.byte(offset).is_some()
    }

    /// Set the byte at `offset`
    pub fn set_byte(&mut self, offset: usize, value: u8) -> Result<(), StorageError> {
        let size = self.data.len();
        match self.data.get_mut(offset) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(StorageError::OutOfBounds { offset, size }),
        }
    }

    /// Mark the byte at `offset` as unknown
    pub fn clear_byte(&mut self, offset: usize) -> Result<(), StorageError> {
        let size = self.data.len();
        match self.data.get_mut(offset) {
            Some(slot) => {
                *slot = None;
                Ok(())
            }
            None => Err(StorageError::OutOfBounds { offset, size }),
        }
    }

    /// Replace `remove_len` bytes starting at `offset` with known values.
    ///
    /// The storage size never changes, so `remove_len` must equal
    /// `new.len()` and the range must lie within the storage; a splice that
    /// would grow, shrink or run past the end fails and leaves the storage
    /// untouched.
    pub fn splice(
        &mut self,
        offset: usize,
        remove_len: usize,
        new: &[u8],
    ) -> Result<(), StorageError> {
        if remove_len != new.len() {
            return Err(StorageError::SpliceLengthMismatch {
                remove_len,
                new_len: new.len(),
            });
        }
        let end = offset
            .checked_add(new.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(StorageError::OutOfBounds {
                offset,
                size: self.data.len(),
            })?;
        for (slot, &byte) in self.data[offset..end].iter_mut().zip(new.iter()) {
            *slot = Some(byte);
        }
        Ok(())
    }

    /// Extract a field's value together with its descriptor
    pub fn get<'a, F: SiField>(&self, field: &'a F) -> Option<FieldValue<'a, F>> {
        field.extract(self)
    }

    /// Write a field's value
    pub fn set<F: SiField>(&mut self, field: &F, value: &F::Value) -> Result<(), StorageError> {
        field.update(self, value)
    }

    /// The raw byte slots
    pub fn bytes(&self) -> &[Option<u8>] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_is_all_unknown() {
        let storage = SiStorage::new(4);
        assert_eq!(storage.len(), 4);
        assert!((0..4).all(|offset| storage.byte(offset).is_none()));
    }

    #[test]
    fn test_byte_out_of_bounds_is_none() {
        let storage = SiStorage::from_bytes(&[1, 2, 3]);
        assert_eq!(storage.byte(2), Some(3));
        assert_eq!(storage.byte(3), None);
    }

    #[test]
    fn test_set_byte_out_of_bounds_fails() {
        let mut storage = SiStorage::new(2);
        assert_eq!(
            storage.set_byte(2, 0xff),
            Err(StorageError::OutOfBounds { offset: 2, size: 2 })
        );
    }

    #[test]
    fn test_splice_preserves_size() {
        let mut storage = SiStorage::new(6);
        storage.splice(2, 2, &[0xaa, 0xbb]).unwrap();
        assert_eq!(storage.len(), 6);
        assert_eq!(storage.byte(1), None);
        assert_eq!(storage.byte(2), Some(0xaa));
        assert_eq!(storage.byte(3), Some(0xbb));
        assert_eq!(storage.byte(4), None);
    }

    #[test]
    fn test_splice_length_mismatch_leaves_storage_untouched() {
        let mut storage = SiStorage::from_bytes(&[1, 2, 3, 4]);
        let before = storage.clone();
        assert_eq!(
            storage.splice(1, 3, &[9, 9]),
            Err(StorageError::SpliceLengthMismatch {
                remove_len: 3,
                new_len: 2,
            })
        );
        assert_eq!(storage, before);
    }

    #[test]
    fn test_splice_past_end_leaves_storage_untouched() {
        let mut storage = SiStorage::from_bytes(&[1, 2, 3]);
        let before = storage.clone();
        assert!(storage.splice(2, 2, &[9, 9]).is_err());
        assert_eq!(storage, before);
    }
}
