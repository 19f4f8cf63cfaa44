//! Protocol errors

use thiserror::Error;

/// Errors that can occur when rendering or interpreting protocol messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The mode byte has no single-byte wire representation.
    #[error("cannot render a mode message with mode 0x{mode:02x}")]
    UnrenderableMode {
        /// The rejected mode byte
        mode: u8,
    },
}
