//! # PunchLink Core Library
//!
//! Core functionality for communicating with SportIdent timing hardware.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - SI extended protocol framing, CRC and parsing
//! - A declarative bit/byte field codec for device memory images
//! - Serial device transport over tokio
//! - A target multiplexer arbitrating one link between coupled stations
//! - Station sessions: configuration access, clock, backup log retrieval
//!
//! ## Example
//!
//! ```rust,ignore
//! use punchlink_core::prelude::*;
//!
//! // Open the USB station and talk to the coupled station behind it
//! let device = SerialSiDevice::open("/dev/ttyUSB0")?;
//! let mux = SiTargetMultiplexer::new(device);
//! let station = SiStation::remote(mux);
//!
//! // Drain its backup log
//! let records = station.read_backup().await?;
//! for record in &records {
//!     println!("{:?} punched at {:?}", record.card_number, record.date);
//! }
//! ```

pub mod device;
pub mod protocol;
pub mod station;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{DeviceError, DeviceState, SerialSiDevice, SiDevice};
    pub use crate::protocol::{
        arr2card_number, arr2date, card_number2arr, date2arr, CardModel,
        CardNumberRangeRegistry, ProtocolError, SiMessage,
    };
    pub use crate::station::{
        BackupProgress, BackupReadOptions, BackupRecord, LinkError, SiStation,
        SiTargetMultiplexer, StationError, StationLayout, Target,
    };
    pub use crate::storage::{
        ErasedField, FieldValue, SiArray, SiBool, SiDict, SiEnum, SiField, SiInt, SiModified,
        SiStorage, StorageError,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
