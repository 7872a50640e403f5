//! Overlay addressing error types

use thiserror::Error;

use super::{Sid, SubscriberId, VarintError};

/// Address codec failures.
///
/// Any decode failure leaves the link's cache out of step with the sender's;
/// the link must be torn down rather than continue decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input ended before the address was complete
    #[error("truncated address: need {needed} more bytes, {remaining} remaining")]
    Truncated {
        /// Bytes still required
        needed: usize,
        /// Bytes left in the input
        remaining: usize,
    },

    /// Index field could not be decoded
    #[error("bad address index: {0}")]
    Index(#[from] VarintError),

    /// Code byte is unassigned
    #[error("unknown address code: {code:#04x}")]
    UnknownCode {
        /// Code byte
        code: u8,
    },

    /// Code byte is assigned but this codec does not read it
    #[error("unsupported address code: {code:#04x}")]
    UnsupportedCode {
        /// Code byte
        code: u8,
    },

    /// Index has not been assigned on this link
    #[error("unknown address index {index} (link holds {len})")]
    UnknownIndex {
        /// Index read from the wire
        index: u64,
        /// Entries in the link cache
        len: usize,
    },

    /// No previous address has been seen on this link
    #[error("no previous address on this link")]
    NoPrevious,

    /// Self code received before the link's sender was known
    #[error("self address referenced before the sender is known")]
    UnknownSender,

    /// Prefix matches no known subscriber
    #[error("no known address starts with {prefix} ({nibbles} nibbles)")]
    UnknownPrefix {
        /// Prefix bytes in hex
        prefix: String,
        /// Prefix length in nibbles
        nibbles: usize,
    },

    /// Prefix matches more than one known subscriber
    #[error("{matches} known addresses start with {prefix} ({nibbles} nibbles)")]
    AmbiguousAddress {
        /// Prefix bytes in hex
        prefix: String,
        /// Prefix length in nibbles
        nibbles: usize,
        /// How many subscribers matched
        matches: usize,
    },

    /// Address was expected to be a subscriber but is a broadcast
    #[error("unexpected broadcast address")]
    UnexpectedBroadcast,

    /// Registry lookup failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Subscriber registry failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No subscriber with that address
    #[error("subscriber {sid} not found")]
    NotFound {
        /// Requested address
        sid: Sid,
    },

    /// Handle does not belong to this registry
    #[error("invalid subscriber handle {0:?}")]
    InvalidHandle(SubscriberId),

    /// Attachment does not match the subscriber's reachability
    #[error("subscriber {sid} is {state}, cannot set {attachment}")]
    WrongReachability {
        /// Subscriber address
        sid: Sid,
        /// Current reachability
        state: &'static str,
        /// Attachment that was rejected
        attachment: &'static str,
    },
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, AddressError>;
