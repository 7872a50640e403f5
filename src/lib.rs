//! MDP (Mesh Datagram Protocol) - client side of the local mesh daemon link
//!
//! This library lets an application exchange MDP frames with a mesh daemon
//! running on the same host, and implements the abbreviated subscriber
//! address codec used on mesh links.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mdp::{Frame, MdpAddr, MdpClient, MdpConfig};
//!
//! let mut client = MdpClient::new(MdpConfig::default());
//! let me = client.get_self_addresses(0)?;
//! client.bind(&me, 7)?;
//!
//! let mut frame = Frame::tx(MdpAddr::new(me, 7), MdpAddr::new(me, 8), &b"hello"[..]);
//! client.send(&mut frame, false, 0)?;
//! # Ok::<(), mdp::MdpError>(())
//! ```
//!
//! # Modules
//!
//! - [`protocol`] - frame model and the minimal-length rule
//! - [`transport`] - client socket, request/reply session, configuration
//! - [`overlay`] - subscriber registry, address abbreviation codec, broadcast ids

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod overlay;
pub mod protocol;
#[cfg(unix)]
pub mod transport;

pub use overlay::{Address, AddressCache, AddressError, BroadcastId, Sid, SubscriberRegistry};
pub use protocol::{Error as FrameError, Flags, Frame, FrameBody, FrameType, MdpAddr};
#[cfg(unix)]
pub use transport::{Endpoint, MdpClient, MdpConfig, MdpError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
