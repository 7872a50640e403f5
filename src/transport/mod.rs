//! Local daemon transport
//!
//! Applications talk to the mesh daemon over a Unix datagram socket. Each
//! client binds a private socket in the daemon's instance directory and
//! exchanges MDP frames with the daemon's well-known socket.

mod client;
mod config;
mod endpoint;
mod error;
#[allow(unsafe_code)]
mod socket;

pub use client::{MdpClient, SEND_FAILED_MESSAGE, TIMEOUT_MESSAGE};
pub use config::{
    DEFAULT_DAEMON_SOCKET_NAME, DEFAULT_RECV_BUFFER_SIZE, DEFAULT_REQUEST_TIMEOUT,
    INSTANCE_PATH_ENV, MdpConfig,
};
pub use endpoint::{Datagram, Endpoint};
pub use error::{MdpError, Result};
pub use socket::SocketBinding;
