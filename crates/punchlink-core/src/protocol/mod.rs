//! SI wire protocol
//!
//! Framing, checksums and the value encodings shared by every station
//! conversation: messages, CRC16, packed dates and card numbers.

pub mod card_number;
pub mod consts;
pub mod crc;
pub mod datetime;
mod error;
pub mod message;

pub use card_number::{arr2card_number, card_number2arr, CardModel, CardNumberRangeRegistry};
pub use crc::crc16;
pub use datetime::{arr2date, date2arr, SiDateField, SiTimeField, SiTimestamp};
pub use error::ProtocolError;
pub use message::{parse, parse_all, render, SiMessage};
