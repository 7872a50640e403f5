//! Client transport and session error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::{Error as FrameError, FrameType};

/// Errors raised while talking to the daemon
#[derive(Error, Debug)]
pub enum MdpError {
    /// Client socket could not be created, configured or read
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Frame could not be handed to the daemon socket
    #[error("error sending frame to MDP server: {0}")]
    Send(#[source] io::Error),

    /// Frame is not valid for its type
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),

    /// Reply came from somewhere other than the daemon socket
    #[error("reply did not come from server: {from:?}")]
    SpoofedReply {
        /// Sender path, if the sender was bound to one
        from: Option<PathBuf>,
    },

    /// Reply was shorter than its type requires
    #[error("expected packet length of {needed}, received only {got} bytes")]
    TruncatedReply {
        /// Minimal length for the reply's type
        needed: usize,
        /// Bytes received
        got: usize,
    },

    /// No valid reply arrived in time
    #[error("timeout waiting for reply to MDP packet after {timeout_ms} ms")]
    TimedOut {
        /// Timeout the request was given
        timeout_ms: i64,
    },

    /// Daemon answered with an error frame
    #[error("MDP server error #{code}: '{message}'")]
    Server {
        /// Error code from the reply
        code: i32,
        /// Error message from the reply
        message: String,
    },

    /// Daemon answered with a frame of the wrong type
    #[error("expected {expected} reply, got {got}")]
    UnexpectedReply {
        /// Type the request calls for
        expected: FrameType,
        /// Type that arrived
        got: FrameType,
    },

    /// Address list reply carried no addresses
    #[error("no address at index {index}")]
    NoAddress {
        /// Requested index
        index: u32,
    },

    /// Endpoint has no open socket
    #[error("client endpoint is not open")]
    NotOpen,
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, MdpError>;
