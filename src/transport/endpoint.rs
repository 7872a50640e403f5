//! Client endpoint bound to a private socket next to the daemon's.

use std::fs;
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use rand_core::{OsRng, RngCore};
use tracing::{debug, instrument, warn};

use super::config::MdpConfig;
use super::error::{MdpError, Result};
use super::socket::SocketBinding;
use crate::protocol::{FRAME_SIZE, Frame};

/// One datagram read from the client socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Received bytes
    pub bytes: Bytes,
    /// Path of the sending socket, `None` for unnamed senders
    pub sender: Option<PathBuf>,
    /// Inbound TTL when the transport exposes one; Unix sockets never do
    pub ttl: Option<u8>,
}

/// Caller-owned client socket.
///
/// The socket is opened lazily by [`Endpoint::ensure_open`] and released by
/// [`Endpoint::close`] or on drop.
#[derive(Debug)]
pub struct Endpoint {
    config: MdpConfig,
    socket: Option<SocketBinding>,
}

impl Endpoint {
    /// Create an unopened endpoint
    #[must_use]
    pub fn new(config: MdpConfig) -> Self {
        Self {
            config,
            socket: None,
        }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &MdpConfig {
        &self.config
    }

    /// Whether a socket is currently open
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Path the open socket is bound to
    #[must_use]
    pub fn local_path(&self) -> Option<PathBuf> {
        self.socket
            .as_ref()
            .and_then(|socket| socket.local_path().ok().flatten())
    }

    fn socket(&self) -> Result<&SocketBinding> {
        self.socket.as_ref().ok_or(MdpError::NotOpen)
    }

    /// Open the client socket if it is not open yet.
    ///
    /// A failed bind leaves the endpoint unopened, so calling again is safe.
    #[instrument(level = "debug", skip(self))]
    pub fn ensure_open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let path = self
            .config
            .client_socket_path(std::process::id(), OsRng.next_u32());

        let socket = SocketBinding::bind(&path)?;
        if let Err(err) = socket.set_recv_buffer_size(self.config.recv_buffer_size) {
            warn!(
                error = %err,
                size = self.config.recv_buffer_size,
                "could not size receive buffer"
            );
        }
        debug!(path = %path.display(), "client socket open");
        self.socket = Some(socket);
        Ok(())
    }

    /// Transmit `bytes` to the daemon socket without blocking
    #[instrument(level = "trace", skip(self, bytes), fields(len = bytes.len()))]
    pub fn send_to_daemon(&self, bytes: &[u8]) -> Result<usize> {
        let socket = self.socket()?;
        let daemon = self.config.daemon_socket_path();
        socket.set_nonblocking(true).map_err(MdpError::Send)?;
        let sent = socket.send_to(bytes, &daemon);
        socket.set_nonblocking(false)?;
        sent.map_err(MdpError::Send)
    }

    /// Wait for a datagram to become readable.
    ///
    /// `None` waits forever. A negative timeout is treated as zero, so the
    /// call only checks whether data is already queued.
    #[instrument(level = "trace", skip(self))]
    pub fn poll(&self, timeout_ms: Option<i64>) -> Result<bool> {
        let socket = self.socket()?;
        let timeout = match timeout_ms {
            None => -1,
            Some(ms) => libc::c_int::try_from(ms.max(0)).unwrap_or(libc::c_int::MAX),
        };
        Ok(socket.poll_readable(timeout)?)
    }

    /// Read one queued datagram without blocking; `None` when nothing is queued
    #[instrument(level = "trace", skip(self))]
    pub fn receive(&self) -> Result<Option<Datagram>> {
        let socket = self.socket()?;
        let mut buf = BytesMut::zeroed(FRAME_SIZE);
        socket.set_nonblocking(true)?;
        let received = socket.recv_from(&mut buf);
        socket.set_nonblocking(false)?;
        match received {
            Ok((len, sender)) => {
                buf.truncate(len);
                Ok(Some(Datagram {
                    bytes: buf.freeze(),
                    sender,
                    ttl: None,
                }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Tell the daemon to release our bindings, then close and unlink the socket.
    ///
    /// Does nothing when already closed.
    #[instrument(level = "debug", skip(self))]
    pub fn close(&mut self) {
        if self.socket.is_none() {
            return;
        }
        match Frame::goodbye().to_wire() {
            Ok(goodbye) => {
                if let Err(err) = self.send_to_daemon(&goodbye) {
                    debug!(error = %err, "goodbye not delivered");
                }
            }
            Err(err) => debug!(error = %err, "goodbye not encoded"),
        }

        if let Some(socket) = self.socket.take() {
            match socket.local_path() {
                Ok(Some(path)) => {
                    if let Err(err) = fs::remove_file(&path) {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "could not unlink client socket"
                        );
                    }
                    debug!(path = %path.display(), "client socket closed");
                }
                Ok(None) => debug!("unnamed client socket closed"),
                Err(err) => warn!(error = %err, "could not read client socket name"),
            }
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}
