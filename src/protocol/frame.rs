//! MDP frame layout
//!
//! Frames travel between clients and the daemon as the raw fixed-size layout
//! below, truncated to the bytes that carry meaning for the frame's type.
//!
//! ```text
//! 0        4                                                        FRAME_SIZE
//! +--------+-----------------------------------------------------------+
//! | type + |  body (one of)                                            |
//! | flags  |  TX       src addr(36) | dst addr(36) | len(2) | payload  |
//! |  (4)   |  BIND     addr(36)                                        |
//! |        |  ADDRLIST mode | first | last | count | server | sids...  |
//! |        |  SCAN     ipv4(4)                                         |
//! |        |  ERROR    code(4) | NUL-terminated message (<=128)        |
//! +--------+-----------------------------------------------------------+
//! ```
//!
//! All integers are little-endian. An MDP address is a 32-byte sid followed
//! by a 4-byte port.

use std::fmt;
use std::net::Ipv4Addr;

use bytes::Bytes;
use tracing::debug;

use super::{
    AddrListMode, ERROR_MESSAGE_SIZE, Error, FRAME_SIZE, Flags, FrameType, HEADER_SIZE,
    MAX_SIDS_PER_FRAME, MDP_ADDR_SIZE, MDP_MTU, Result,
};
use crate::overlay::{SID_SIZE, Sid};

const TX_SRC: usize = HEADER_SIZE;
const TX_DST: usize = TX_SRC + MDP_ADDR_SIZE;
const TX_PAYLOAD_LEN: usize = TX_DST + MDP_ADDR_SIZE;
const TX_PAYLOAD: usize = TX_PAYLOAD_LEN + 2;

const ADDRLIST_MODE: usize = HEADER_SIZE;
const ADDRLIST_FIRST: usize = ADDRLIST_MODE + 4;
const ADDRLIST_LAST: usize = ADDRLIST_FIRST + 4;
const ADDRLIST_FRAME_COUNT: usize = ADDRLIST_LAST + 4;
const ADDRLIST_SERVER_COUNT: usize = ADDRLIST_FRAME_COUNT + 4;
const ADDRLIST_SIDS: usize = ADDRLIST_SERVER_COUNT + 4;

const SCAN_ADDR: usize = HEADER_SIZE;
const SCAN_SIZE: usize = 4;

const ERROR_CODE: usize = HEADER_SIZE;
const ERROR_MESSAGE: usize = ERROR_CODE + 4;

// Every body must fit behind the header.
const _: () = assert!(ADDRLIST_SIDS + MAX_SIDS_PER_FRAME * SID_SIZE <= FRAME_SIZE);
const _: () = assert!(ERROR_MESSAGE + ERROR_MESSAGE_SIZE <= FRAME_SIZE);
const _: () = assert!(TX_PAYLOAD + MDP_MTU == FRAME_SIZE);

/// Socket address on the mesh: a subscriber id plus a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MdpAddr {
    /// Subscriber id
    pub sid: Sid,
    /// Port number
    pub port: u32,
}

impl MdpAddr {
    /// Create an address
    #[must_use]
    pub const fn new(sid: Sid, port: u32) -> Self {
        Self { sid, port }
    }

    fn write(&self, bytes: &mut [u8], offset: usize) {
        bytes[offset..offset + SID_SIZE].copy_from_slice(self.sid.as_bytes());
        write_u32(bytes, offset + SID_SIZE, self.port);
    }

    fn read(bytes: &[u8], offset: usize) -> Self {
        Self {
            sid: read_sid(bytes, offset),
            port: read_u32(bytes, offset + SID_SIZE),
        }
    }
}

impl fmt::Display for MdpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sid, self.port)
    }
}

/// Fixed-size in-memory frame buffer.
///
/// Bytes past [`minimal_length`] are never meaningful and must never be sent.
#[derive(Clone)]
pub struct FrameBuf {
    bytes: [u8; FRAME_SIZE],
}

impl FrameBuf {
    /// Create a zeroed buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; FRAME_SIZE],
        }
    }

    /// Copy a received datagram into a zeroed buffer
    pub fn from_datagram(datagram: &[u8]) -> Result<Self> {
        if datagram.len() > FRAME_SIZE {
            return Err(Error::Oversized {
                len: datagram.len(),
                max: FRAME_SIZE,
            });
        }
        let mut buf = Self::new();
        buf.bytes[..datagram.len()].copy_from_slice(datagram);
        Ok(buf)
    }

    /// Raw type-and-flags word
    #[must_use]
    pub fn type_word(&self) -> u32 {
        read_u32(&self.bytes, 0)
    }

    /// Overwrite the type-and-flags word
    pub fn set_type_word(&mut self, word: u32) {
        write_u32(&mut self.bytes, 0, word);
    }

    /// Whole fixed-size buffer
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whole fixed-size buffer, mutable
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// The prefix of the buffer that may be transmitted
    pub fn wire_bytes(&self) -> Result<&[u8]> {
        let len = minimal_length(self)?;
        Ok(&self.bytes[..len])
    }
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuf")
            .field("type_word", &format_args!("{:#x}", self.type_word()))
            .finish_non_exhaustive()
    }
}

/// Number of meaningful bytes in `buf` for its frame type.
///
/// This is the only length that may be put on the wire for a frame.
pub fn minimal_length(buf: &FrameBuf) -> Result<usize> {
    let bytes = buf.as_bytes();
    let type_word = buf.type_word();
    let frame_type = FrameType::from_word(type_word).ok_or(Error::InvalidFrameType { type_word })?;

    let len = match frame_type {
        FrameType::RoutingTable | FrameType::Goodbye => HEADER_SIZE,
        FrameType::AddrList => {
            let count = read_u32(bytes, ADDRLIST_FRAME_COUNT) as usize;
            if count > MAX_SIDS_PER_FRAME {
                return Err(Error::TooManyAddresses {
                    count,
                    max: MAX_SIDS_PER_FRAME,
                });
            }
            ADDRLIST_SIDS + count * SID_SIZE
        }
        FrameType::GetAddrs => ADDRLIST_SIDS,
        FrameType::Tx => {
            let payload_len = usize::from(read_u16(bytes, TX_PAYLOAD_LEN));
            if payload_len > MDP_MTU {
                return Err(Error::PayloadTooLarge {
                    size: payload_len,
                    max: MDP_MTU,
                });
            }
            TX_PAYLOAD + payload_len
        }
        FrameType::Bind => HEADER_SIZE + MDP_ADDR_SIZE,
        FrameType::Scan => HEADER_SIZE + SCAN_SIZE,
        FrameType::Error => {
            // Stop at the NUL so nothing after the message is ever copied out.
            let message = error_message_bytes(bytes);
            let code = read_i32(bytes, ERROR_CODE);
            if code != 0 {
                debug!(code, message = %String::from_utf8_lossy(message), "mdp return/error code");
            }
            ERROR_MESSAGE + message.len() + 1
        }
    };
    Ok(len)
}

/// `GETADDRS` request / `ADDRLIST` reply body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrList {
    /// Which addresses to enumerate
    pub mode: AddrListMode,
    /// Index of the first address in this page
    pub first_sid: u32,
    /// Index after which enumeration stops
    pub last_sid: u32,
    /// Requested page size (request) or addresses carried (reply)
    pub frame_sid_count: u32,
    /// Total addresses the daemon holds for this mode
    pub server_sid_count: u32,
    /// Addresses carried by a reply
    pub sids: Vec<Sid>,
}

impl AddrList {
    /// Build a request for up to `count` addresses starting at `first_sid`
    #[must_use]
    pub fn request(mode: AddrListMode, first_sid: u32, last_sid: u32, count: u32) -> Self {
        Self {
            mode,
            first_sid,
            last_sid,
            frame_sid_count: count,
            server_sid_count: 0,
            sids: Vec::new(),
        }
    }

    /// Build a reply page
    #[must_use]
    pub fn page(mode: AddrListMode, first_sid: u32, server_sid_count: u32, sids: Vec<Sid>) -> Self {
        let count = u32::try_from(sids.len()).unwrap_or(u32::MAX);
        Self {
            mode,
            first_sid,
            last_sid: first_sid.saturating_add(count).saturating_sub(1),
            frame_sid_count: count,
            server_sid_count,
            sids,
        }
    }

    fn write(&self, bytes: &mut [u8], with_sids: bool) -> Result<()> {
        write_u32(bytes, ADDRLIST_MODE, self.mode.as_u32());
        write_u32(bytes, ADDRLIST_FIRST, self.first_sid);
        write_u32(bytes, ADDRLIST_LAST, self.last_sid);
        write_u32(bytes, ADDRLIST_SERVER_COUNT, self.server_sid_count);
        if !with_sids {
            write_u32(bytes, ADDRLIST_FRAME_COUNT, self.frame_sid_count);
            return Ok(());
        }
        if self.sids.len() > MAX_SIDS_PER_FRAME {
            return Err(Error::TooManyAddresses {
                count: self.sids.len(),
                max: MAX_SIDS_PER_FRAME,
            });
        }
        write_u32(bytes, ADDRLIST_FRAME_COUNT, self.sids.len() as u32);
        for (idx, sid) in self.sids.iter().enumerate() {
            let offset = ADDRLIST_SIDS + idx * SID_SIZE;
            bytes[offset..offset + SID_SIZE].copy_from_slice(sid.as_bytes());
        }
        Ok(())
    }

    fn read(bytes: &[u8], with_sids: bool) -> Result<Self> {
        let raw_mode = read_u32(bytes, ADDRLIST_MODE);
        let mode =
            AddrListMode::from_u32(raw_mode).ok_or(Error::InvalidAddrListMode { mode: raw_mode })?;
        let frame_sid_count = read_u32(bytes, ADDRLIST_FRAME_COUNT);
        let sids = if with_sids {
            (0..frame_sid_count as usize)
                .map(|idx| read_sid(bytes, ADDRLIST_SIDS + idx * SID_SIZE))
                .collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            mode,
            first_sid: read_u32(bytes, ADDRLIST_FIRST),
            last_sid: read_u32(bytes, ADDRLIST_LAST),
            frame_sid_count,
            server_sid_count: read_u32(bytes, ADDRLIST_SERVER_COUNT),
            sids,
        })
    }
}

/// `TX` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    /// Sending socket address
    pub src: MdpAddr,
    /// Receiving socket address
    pub dst: MdpAddr,
    /// Application payload
    pub payload: Bytes,
}

/// `ERROR` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    /// Numeric code, 0 for plain success
    pub code: i32,
    /// Human-readable message, at most `ERROR_MESSAGE_SIZE - 1` bytes
    pub message: String,
}

/// Logical content of a frame, one variant per frame type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// Payload send or delivery
    Tx(TxFrame),
    /// Port reservation request
    Bind(MdpAddr),
    /// Address enumeration request
    GetAddrs(AddrList),
    /// Address enumeration reply
    AddrList(AddrList),
    /// Routing table request
    RoutingTable,
    /// Release all bindings
    Goodbye,
    /// Probe a network address for peers
    Scan(Ipv4Addr),
    /// Error or status
    Error(ErrorFrame),
}

/// One MDP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Flags carried beside the type
    pub flags: Flags,
    /// Type-specific content
    pub body: FrameBody,
}

impl Frame {
    /// Wrap a body with no flags
    #[must_use]
    pub const fn new(body: FrameBody) -> Self {
        Self {
            flags: Flags::new(),
            body,
        }
    }

    /// Build a `TX` frame
    pub fn tx(src: MdpAddr, dst: MdpAddr, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameBody::Tx(TxFrame {
            src,
            dst,
            payload: payload.into(),
        }))
    }

    /// Build a `BIND` request
    #[must_use]
    pub const fn bind(addr: MdpAddr) -> Self {
        Self::new(FrameBody::Bind(addr))
    }

    /// Build a `GOODBYE` frame
    #[must_use]
    pub const fn goodbye() -> Self {
        Self::new(FrameBody::Goodbye)
    }

    /// Build an `ERROR` frame
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::new(FrameBody::Error(ErrorFrame {
            code,
            message: message.into(),
        }))
    }

    /// Add flags
    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Frame type
    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        match self.body {
            FrameBody::Tx(_) => FrameType::Tx,
            FrameBody::Bind(_) => FrameType::Bind,
            FrameBody::GetAddrs(_) => FrameType::GetAddrs,
            FrameBody::AddrList(_) => FrameType::AddrList,
            FrameBody::RoutingTable => FrameType::RoutingTable,
            FrameBody::Goodbye => FrameType::Goodbye,
            FrameBody::Scan(_) => FrameType::Scan,
            FrameBody::Error(_) => FrameType::Error,
        }
    }

    /// Type-and-flags word as laid out on the wire
    #[must_use]
    pub fn type_word(&self) -> u32 {
        u32::from(self.frame_type().as_u8()) | self.flags.bits()
    }

    /// Error body, if this is an `ERROR` frame
    #[must_use]
    pub fn as_error(&self) -> Option<&ErrorFrame> {
        match &self.body {
            FrameBody::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Lay the frame out in `buf`.
    ///
    /// Bytes beyond the frame's minimal length are left untouched.
    pub fn write_into(&self, buf: &mut FrameBuf) -> Result<()> {
        buf.set_type_word(self.type_word());
        let bytes = buf.as_mut_bytes();
        match &self.body {
            FrameBody::Tx(tx) => {
                if tx.payload.len() > MDP_MTU {
                    return Err(Error::PayloadTooLarge {
                        size: tx.payload.len(),
                        max: MDP_MTU,
                    });
                }
                tx.src.write(bytes, TX_SRC);
                tx.dst.write(bytes, TX_DST);
                write_u16(bytes, TX_PAYLOAD_LEN, tx.payload.len() as u16);
                bytes[TX_PAYLOAD..TX_PAYLOAD + tx.payload.len()].copy_from_slice(&tx.payload);
            }
            FrameBody::Bind(addr) => addr.write(bytes, HEADER_SIZE),
            FrameBody::GetAddrs(list) => list.write(bytes, false)?,
            FrameBody::AddrList(list) => list.write(bytes, true)?,
            FrameBody::RoutingTable | FrameBody::Goodbye => {}
            FrameBody::Scan(addr) => {
                bytes[SCAN_ADDR..SCAN_ADDR + SCAN_SIZE].copy_from_slice(&addr.octets());
            }
            FrameBody::Error(err) => {
                write_i32(bytes, ERROR_CODE, err.code);
                let message = truncate_message(&err.message);
                bytes[ERROR_MESSAGE..ERROR_MESSAGE + message.len()]
                    .copy_from_slice(message.as_bytes());
                bytes[ERROR_MESSAGE + message.len()] = 0;
            }
        }
        Ok(())
    }

    /// Read the logical frame held in `buf`
    pub fn read_from(buf: &FrameBuf) -> Result<Self> {
        let type_word = buf.type_word();
        let frame_type =
            FrameType::from_word(type_word).ok_or(Error::InvalidFrameType { type_word })?;
        let flags = Flags::from_word(type_word);
        let bytes = buf.as_bytes();

        let body = match frame_type {
            FrameType::Tx => {
                let payload_len = usize::from(read_u16(bytes, TX_PAYLOAD_LEN));
                if payload_len > MDP_MTU {
                    return Err(Error::PayloadTooLarge {
                        size: payload_len,
                        max: MDP_MTU,
                    });
                }
                FrameBody::Tx(TxFrame {
                    src: MdpAddr::read(bytes, TX_SRC),
                    dst: MdpAddr::read(bytes, TX_DST),
                    payload: Bytes::copy_from_slice(&bytes[TX_PAYLOAD..TX_PAYLOAD + payload_len]),
                })
            }
            FrameType::Bind => FrameBody::Bind(MdpAddr::read(bytes, HEADER_SIZE)),
            FrameType::GetAddrs => FrameBody::GetAddrs(AddrList::read(bytes, false)?),
            FrameType::AddrList => {
                minimal_length(buf)?;
                FrameBody::AddrList(AddrList::read(bytes, true)?)
            }
            FrameType::RoutingTable => FrameBody::RoutingTable,
            FrameType::Goodbye => FrameBody::Goodbye,
            FrameType::Scan => {
                let mut octets = [0u8; SCAN_SIZE];
                octets.copy_from_slice(&bytes[SCAN_ADDR..SCAN_ADDR + SCAN_SIZE]);
                FrameBody::Scan(Ipv4Addr::from(octets))
            }
            FrameType::Error => FrameBody::Error(ErrorFrame {
                code: read_i32(bytes, ERROR_CODE),
                message: String::from_utf8_lossy(error_message_bytes(bytes)).into_owned(),
            }),
        };
        Ok(Self { flags, body })
    }

    /// Parse a received datagram, rejecting it if shorter than its type requires
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        let buf = FrameBuf::from_datagram(datagram)?;
        let needed = minimal_length(&buf)?;
        if datagram.len() < needed {
            return Err(Error::Truncated {
                needed,
                got: datagram.len(),
            });
        }
        Self::read_from(&buf)
    }

    /// Exactly the bytes that would be transmitted for this frame
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        let mut buf = FrameBuf::new();
        self.write_into(&mut buf)?;
        Ok(buf.wire_bytes()?.to_vec())
    }
}

fn error_message_bytes(bytes: &[u8]) -> &[u8] {
    let area = &bytes[ERROR_MESSAGE..ERROR_MESSAGE + ERROR_MESSAGE_SIZE - 1];
    let len = area.iter().position(|&b| b == 0).unwrap_or(area.len());
    &area[..len]
}

fn truncate_message(message: &str) -> &str {
    let message = message.split('\0').next().unwrap_or_default();
    if message.len() < ERROR_MESSAGE_SIZE {
        return message;
    }
    let mut end = ERROR_MESSAGE_SIZE - 1;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&bytes[offset..offset + 2]);
    u16::from_le_bytes(raw)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

fn read_sid(bytes: &[u8], offset: usize) -> Sid {
    let mut raw = [0u8; SID_SIZE];
    raw.copy_from_slice(&bytes[offset..offset + SID_SIZE]);
    Sid::new(raw)
}

fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_i32(bytes: &mut [u8], offset: usize, value: i32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
