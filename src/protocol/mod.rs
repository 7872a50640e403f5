//! MDP frame model
//!
//! This module provides the frame variants exchanged with the daemon and the
//! minimal-length rule that decides how many bytes of a frame go on the wire.

mod error;
mod frame;
mod types;

pub use error::{Error, Result};
pub use frame::{
    AddrList, ErrorFrame, Frame, FrameBody, FrameBuf, MdpAddr, TxFrame, minimal_length,
};
pub use types::{AddrListMode, Flags, FrameType};

/// Size of the type-and-flags word that starts every frame
pub const HEADER_SIZE: usize = 4;

/// Size of an MDP socket address on the wire (sid + port)
pub const MDP_ADDR_SIZE: usize = crate::overlay::SID_SIZE + 4;

/// Largest TX payload carried by one frame
pub const MDP_MTU: usize = 1200;

/// Largest number of addresses in one `ADDRLIST` page
pub const MAX_SIDS_PER_FRAME: usize = 36;

/// Bytes reserved for an `ERROR` message, including its NUL
pub const ERROR_MESSAGE_SIZE: usize = 128;

/// Fixed size of the in-memory frame structure
pub const FRAME_SIZE: usize = HEADER_SIZE + 2 * MDP_ADDR_SIZE + 2 + MDP_MTU;
