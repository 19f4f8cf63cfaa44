//! Declarative field storage
//!
//! Station and card memory is described by field descriptors laid over a
//! buffer of possibly-unknown bytes. Descriptors compose: integers build
//! enums, arrays and dicts group them, and modified fields derive values.

pub mod array;
pub mod boolean;
mod buffer;
pub mod dict;
pub mod enumeration;
mod error;
mod field;
pub mod int;
pub mod modified;

pub use array::SiArray;
pub use boolean::SiBool;
pub use buffer::SiStorage;
pub use dict::SiDict;
pub use enumeration::SiEnum;
pub use error::StorageError;
pub use field::{ErasedField, FieldValue, SiField};
pub use int::{IntPart, SiInt};
pub use modified::SiModified;
