//! Request/reply session with the local daemon.

use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::config::MdpConfig;
use super::endpoint::{Datagram, Endpoint};
use super::error::{MdpError, Result};
use crate::overlay::Sid;
use crate::protocol::{
    AddrList, AddrListMode, Error as FrameError, Flags, Frame, FrameBody, FrameBuf, FrameType,
    MAX_SIDS_PER_FRAME, MdpAddr,
};

/// Message left in the frame when it could not be sent
pub const SEND_FAILED_MESSAGE: &str = "Error sending frame to MDP server.";

/// Message left in the frame when no reply arrived in time
pub const TIMEOUT_MESSAGE: &str =
    "Timeout waiting for reply to MDP packet (packet was successfully sent).";

/// Client session with the daemon.
///
/// # Example
///
/// ```rust,no_run
/// use mdp::overlay::Sid;
/// use mdp::transport::{MdpClient, MdpConfig};
///
/// let mut client = MdpClient::new(MdpConfig::default());
/// let me: Sid = client.get_self_addresses(0)?;
/// client.bind(&me, 7)?;
/// # Ok::<(), mdp::transport::MdpError>(())
/// ```
#[derive(Debug)]
pub struct MdpClient {
    endpoint: Endpoint,
}

impl MdpClient {
    /// Create a client; the socket is opened on first use
    #[must_use]
    pub fn new(config: MdpConfig) -> Self {
        Self {
            endpoint: Endpoint::new(config),
        }
    }

    /// Underlying endpoint
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Underlying endpoint, mutable
    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    /// Send `frame` to the daemon, optionally waiting for the reply.
    ///
    /// On success the frame holds the reply and the return value is the
    /// reply's error code (0 for anything other than `ERROR`). On failure the
    /// frame is overwritten with an `ERROR` describing it. A negative
    /// `timeout_ms` waits forever.
    #[instrument(level = "debug", skip(self, frame), fields(frame_type = %frame.frame_type()))]
    pub fn send(&mut self, frame: &mut Frame, await_reply: bool, timeout_ms: i64) -> Result<i32> {
        self.endpoint.ensure_open()?;

        let mut buf = FrameBuf::new();
        frame.write_into(&mut buf)?;
        if let Err(err) = self.endpoint.send_to_daemon(buf.wire_bytes()?) {
            *frame = Frame::error(1, SEND_FAILED_MESSAGE);
            return Err(err);
        }
        if !await_reply {
            return Ok(0);
        }

        let port = match &frame.body {
            FrameBody::Tx(tx) if tx.src.port > 0 => Some(tx.src.port),
            _ => None,
        };
        let deadline = u64::try_from(timeout_ms)
            .ok()
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        // Read at least once, then stop as soon as the deadline has passed
        // even if more datagrams are queued.
        let mut waited = false;
        loop {
            let remaining = deadline.map(|deadline| {
                let left = deadline.saturating_duration_since(Instant::now());
                i64::try_from(left.as_millis()).unwrap_or(i64::MAX)
            });
            if waited && remaining == Some(0) {
                break;
            }
            if !self.endpoint.poll(remaining)? {
                break;
            }
            waited = true;
            let Some(datagram) = self.endpoint.receive()? else {
                continue;
            };
            match self.check_reply(&datagram, port) {
                Ok(Some(reply)) => {
                    let code = reply.as_error().map_or(0, |err| err.code);
                    *frame = reply;
                    return Ok(code);
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "ignoring reply"),
            }
        }

        *frame = Frame::error(1, TIMEOUT_MESSAGE);
        Err(MdpError::TimedOut { timeout_ms })
    }

    /// Validate a received datagram as the reply to a request.
    ///
    /// `Ok(None)` means the datagram is a `TX` delivery for another port.
    fn check_reply(&self, datagram: &Datagram, port: Option<u32>) -> Result<Option<Frame>> {
        match &datagram.sender {
            Some(path) if self.endpoint.config().is_daemon(path) => {}
            other => {
                return Err(MdpError::SpoofedReply {
                    from: other.clone(),
                });
            }
        }

        let reply = Frame::parse(&datagram.bytes).map_err(|err| match err {
            FrameError::Truncated { needed, got } => MdpError::TruncatedReply { needed, got },
            other => MdpError::InvalidFrame(other),
        })?;

        if let (Some(port), FrameBody::Tx(tx)) = (port, &reply.body) {
            if tx.dst.port != port {
                warn!(port = tx.dst.port, expected = port, "ignoring packet for port");
                return Ok(None);
            }
        }
        Ok(Some(reply))
    }

    /// Reserve `port` on the local address `sid`
    #[instrument(level = "debug", skip(self))]
    pub fn bind(&mut self, sid: &Sid, port: u32) -> Result<()> {
        let mut frame =
            Frame::bind(MdpAddr::new(*sid, port)).with_flags(Flags::new().with(Flags::FORCE));
        let timeout = self.endpoint.config().request_timeout_ms();
        match self.send(&mut frame, true, timeout) {
            Ok(0) => Ok(()),
            Ok(code) => {
                let message = frame
                    .as_error()
                    .map(|err| err.message.clone())
                    .unwrap_or_default();
                warn!(port, code, %message, "could not bind to MDP port");
                Err(MdpError::Server { code, message })
            }
            Err(err) => {
                match frame.as_error() {
                    Some(reply) => warn!(
                        port,
                        code = reply.code,
                        message = %reply.message,
                        "could not bind to MDP port"
                    ),
                    None => warn!(port, "could not bind to MDP port (no reason given)"),
                }
                Err(err)
            }
        }
    }

    /// Fetch one page of addresses known to the daemon, starting at `first`
    #[instrument(level = "debug", skip(self))]
    pub fn get_addresses(&mut self, mode: AddrListMode, first: u32) -> Result<AddrList> {
        let request = AddrList::request(mode, first, u32::MAX, MAX_SIDS_PER_FRAME as u32);
        let mut frame = Frame::new(FrameBody::GetAddrs(request));
        let timeout = self.endpoint.config().request_timeout_ms();
        self.send(&mut frame, true, timeout)?;
        match frame.body {
            FrameBody::AddrList(list) => Ok(list),
            FrameBody::Error(err) => {
                debug!(code = err.code, message = %err.message, "MDP server error");
                Err(MdpError::Server {
                    code: err.code,
                    message: err.message,
                })
            }
            other => Err(MdpError::UnexpectedReply {
                expected: FrameType::AddrList,
                got: Frame::new(other).frame_type(),
            }),
        }
    }

    /// Local identity at `index` in the daemon's keyring
    pub fn get_self_addresses(&mut self, index: u32) -> Result<Sid> {
        let page = self.get_addresses(AddrListMode::SelfIdentities, index)?;
        page.sids.first().copied().ok_or(MdpError::NoAddress { index })
    }

    /// Say goodbye to the daemon and release the client socket
    pub fn close(&mut self) {
        self.endpoint.close();
    }
}
