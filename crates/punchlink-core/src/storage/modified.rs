//! Derived fields
//!
//! A modified field wraps an inner field and presents a transformed value.
//! The forward transform can reject raw values by returning `None`; without
//! an inverse the field is read-only.

use std::fmt;

use super::buffer::SiStorage;
use super::error::StorageError;
use super::field::SiField;

type Transform<I, O> = Box<dyn Fn(I) -> Option<O> + Send + Sync>;
type Validator<U> = Box<dyn Fn(&U) -> bool + Send + Sync>;
type ToString<U> = Box<dyn Fn(&U) -> Result<String, StorageError> + Send + Sync>;
type FromString<U> = Box<dyn Fn(&str) -> Result<U, StorageError> + Send + Sync>;

/// A field whose value is derived from an inner field's value
pub struct SiModified<F: SiField, U: Clone + fmt::Debug> {
    inner: F,
    modify: Transform<F::Value, U>,
    unmodify: Option<Transform<U, F::Value>>,
    validate: Option<Validator<U>>,
    to_string: Option<ToString<U>>,
    from_string: Option<FromString<U>>,
}

impl<F: SiField, U: Clone + fmt::Debug> SiModified<F, U> {
    /// A read-only derived field over `inner`
    pub fn new(inner: F, modify: impl Fn(F::Value) -> Option<U> + Send + Sync + 'static) -> Self {
        SiModified {
            inner,
            modify: Box::new(modify),
            unmodify: None,
            validate: None,
            to_string: None,
            from_string: None,
        }
    }

    /// Make the field writable through `unmodify`
    pub fn with_inverse(
        mut self,
        unmodify: impl Fn(U) -> Option<F::Value> + Send + Sync + 'static,
    ) -> Self {
        self.unmodify = Some(Box::new(unmodify));
        self
    }

    /// Override the validity check for derived values
    pub fn with_validator(mut self, validate: impl Fn(&U) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Some(Box::new(validate));
        self
    }

    /// Override display formatting
    pub fn with_to_string(
        mut self,
        to_string: impl Fn(&U) -> Result<String, StorageError> + Send + Sync + 'static,
    ) -> Self {
        self.to_string = Some(Box::new(to_string));
        self
    }

    /// Override parsing from the display form
    pub fn with_from_string(
        mut self,
        from_string: impl Fn(&str) -> Result<U, StorageError> + Send + Sync + 'static,
    ) -> Self {
        self.from_string = Some(Box::new(from_string));
        self
    }
}

impl<F: SiField, U: Clone + fmt::Debug> fmt::Debug for SiModified<F, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiModified")
            .field("writable", &self.unmodify.is_some())
            .finish()
    }
}

impl<F: SiField, U: Clone + fmt::Debug> SiField for SiModified<F, U> {
    type Value = U;

    fn is_value_valid(&self, value: &Self::Value) -> bool {
        match &self.validate {
            Some(validate) => validate(value),
            None => true,
        }
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        match &self.to_string {
            Some(to_string) => to_string(value),
            None => Ok(format!("{:?}", value)),
        }
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        match &self.from_string {
            Some(from_string) => from_string(string),
            None => Err(StorageError::ValueFromString {
                input: string.to_string(),
            }),
        }
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        let raw = self.inner.extract_value(storage)?;
        (self.modify)(raw)
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        let unmodify = self.unmodify.as_ref().ok_or(StorageError::ReadOnlyField)?;
        let raw = unmodify(value.clone()).ok_or_else(|| {
            StorageError::InvalidValue(format!("{:?}", value))
        })?;
        self.inner.update_value(storage, &raw)
    }
}
