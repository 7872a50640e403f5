//! MDP frame types and flags

use std::fmt;

/// MDP frame types, stored in the low byte of the type-and-flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Payload send (outbound) or delivery (inbound)
    Tx = 0x01,
    /// Port reservation request
    Bind = 0x03,
    /// Error or status reply
    Error = 0x04,
    /// Address enumeration request
    GetAddrs = 0x05,
    /// Address enumeration reply
    AddrList = 0x06,
    /// Routing table dump request
    RoutingTable = 0x07,
    /// Release all bindings held by the sending client
    Goodbye = 0x08,
    /// Ask the daemon to probe a network address for peers
    Scan = 0x09,
}

impl FrameType {
    /// Mask selecting the type bits of the type-and-flags word
    pub const MASK: u32 = 0xff;

    /// Convert from byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Tx),
            0x03 => Some(Self::Bind),
            0x04 => Some(Self::Error),
            0x05 => Some(Self::GetAddrs),
            0x06 => Some(Self::AddrList),
            0x07 => Some(Self::RoutingTable),
            0x08 => Some(Self::Goodbye),
            0x09 => Some(Self::Scan),
            _ => None,
        }
    }

    /// Extract the frame type from a raw type-and-flags word
    #[must_use]
    pub fn from_word(word: u32) -> Option<Self> {
        Self::from_u8((word & Self::MASK) as u8)
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tx => "TX",
            Self::Bind => "BIND",
            Self::Error => "ERROR",
            Self::GetAddrs => "GETADDRS",
            Self::AddrList => "ADDRLIST",
            Self::RoutingTable => "ROUTING_TABLE",
            Self::Goodbye => "GOODBYE",
            Self::Scan => "SCAN",
        };
        write!(f, "{name}")
    }
}

/// Frame flags, stored above the type byte of the type-and-flags word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Flags(u32);

impl Flags {
    /// Valid flag bits mask
    pub const VALID_MASK: u32 = Self::NOCRYPT | Self::NOSIGN | Self::FORCE;
    /// Send the payload unencrypted
    pub const NOCRYPT: u32 = 0x1_0000;
    /// Send the payload unsigned
    pub const NOSIGN: u32 = 0x2_0000;
    /// Take over a binding even if another client holds it
    pub const FORCE: u32 = 0x8_0000;

    /// Create empty flags
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Extract the flags from a raw type-and-flags word, ignoring unknown bits
    #[must_use]
    pub const fn from_word(word: u32) -> Self {
        Self(word & Self::VALID_MASK)
    }

    /// Raw flag bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Set a flag
    #[must_use]
    pub const fn with(mut self, flag: u32) -> Self {
        debug_assert!(flag & !Self::VALID_MASK == 0, "invalid flag bit");
        self.0 |= flag;
        self
    }

    /// Check if flag is set
    #[must_use]
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Check if forced
    #[must_use]
    pub const fn is_force(self) -> bool {
        self.has(Self::FORCE)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.has(Self::NOCRYPT) {
            parts.push("NOCRYPT");
        }
        if self.has(Self::NOSIGN) {
            parts.push("NOSIGN");
        }
        if self.has(Self::FORCE) {
            parts.push("FORCE");
        }
        if parts.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}

/// Which addresses a `GETADDRS` request enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AddrListMode {
    /// Identities unlocked in the local keyring
    SelfIdentities = 1,
    /// Peers the daemon currently has a route to
    RoutablePeers = 2,
    /// Every subscriber the daemon knows about
    AllPeers = 3,
}

impl AddrListMode {
    /// Convert from the wire value
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::SelfIdentities),
            2 => Some(Self::RoutablePeers),
            3 => Some(Self::AllPeers),
            _ => None,
        }
    }

    /// Convert to the wire value
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}
