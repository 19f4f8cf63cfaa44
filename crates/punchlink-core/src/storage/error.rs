use thiserror::Error;

/// Errors from field extraction and update operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The value fails the field's validity check
    #[error("invalid value for field: {0}")]
    InvalidValue(String),

    /// The field has no inverse transformation and cannot be written
    #[error("field is read-only")]
    ReadOnlyField,

    /// An update would write through bytes whose content is unknown
    #[error("cannot modify a field with unknown bytes")]
    ModifyUnknown,

    /// An access fell outside the storage buffer
    #[error("offset 0x{offset:02x} out of bounds for storage of size 0x{size:02x}")]
    OutOfBounds {
        /// Offending byte offset
        offset: usize,
        /// Total storage size
        size: usize,
    },

    /// A splice would change the storage size
    #[error("splice of {new_len} bytes cannot replace {remove_len} bytes")]
    SpliceLengthMismatch {
        /// Number of bytes being replaced
        remove_len: usize,
        /// Number of replacement bytes
        new_len: usize,
    },

    /// A string does not parse as a value of the field's type
    #[error("cannot parse {input:?} as a field value")]
    ValueFromString {
        /// The rejected input
        input: String,
    },

    /// A value cannot be formatted as a string
    #[error("cannot format value as a string: {0}")]
    ValueToString(String),

    /// An enum field was given a name outside its variant set
    #[error("unknown variant {0:?}")]
    UnknownVariant(String),
}
