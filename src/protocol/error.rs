//! MDP frame error types

use thiserror::Error;

/// Errors raised while laying out or parsing MDP frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Type tag is not a known frame type
    #[error("invalid MDP frame type: {type_word:#x}")]
    InvalidFrameType {
        /// Raw type-and-flags word
        type_word: u32,
    },

    /// Frame is shorter than its type requires
    #[error("truncated frame: expected {needed} bytes, received only {got}")]
    Truncated {
        /// Minimal length for the frame's type
        needed: usize,
        /// Bytes actually present
        got: usize,
    },

    /// Datagram is longer than any frame can be
    #[error("oversized frame: {len} bytes (max {max})")]
    Oversized {
        /// Datagram length
        len: usize,
        /// Fixed frame size
        max: usize,
    },

    /// TX payload does not fit in one frame
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Address list does not fit in one frame
    #[error("too many addresses in frame: {count} (max {max})")]
    TooManyAddresses {
        /// Declared count
        count: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Address list mode is not recognised
    #[error("invalid address list mode: {mode}")]
    InvalidAddrListMode {
        /// Raw mode value
        mode: u32,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
