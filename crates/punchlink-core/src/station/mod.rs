//! Station communication
//!
//! Request queueing and target arbitration over one device, plus the
//! station session built on top of them: system value access, clock
//! operations, and backup log retrieval.

pub mod backup;
mod error;
pub mod multiplexer;
pub mod send_task;
#[allow(clippy::module_inception)]
pub mod station;

pub use backup::{
    BackupProgress, BackupReadOptions, BackupRecord, BACKUP_BASE_ADDRESS, BACKUP_BLOCK_SIZE,
    BACKUP_MAX_ADDRESS,
};
pub use error::{LinkError, StationError};
pub use multiplexer::{SiTargetMultiplexer, Target};
pub use send_task::{SendTask, SendTaskState};
pub use station::{SiStation, StationLayout, DEFAULT_SEND_TIMEOUT, STORAGE_SIZE};
