//! Mesh participants and how to reach them

use std::fmt;
use std::net::SocketAddr;

use super::Sid;

/// Non-owning handle to a subscriber held by a [`SubscriberRegistry`](super::SubscriberRegistry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u32);

impl SubscriberId {
    /// Position in the owning registry
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque handle to a network interface owned by the routing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u32);

/// Where to send packets for a directly reachable subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectRoute {
    /// Interface the peer was heard on
    pub interface: InterfaceId,
    /// Unicast address, or `None` for the interface's broadcast address
    pub address: Option<SocketAddr>,
}

/// Result of routing calculations for one subscriber.
///
/// The attachment lives inside the state that uses it, so a next hop can only
/// exist for `Indirect` and an interface only for `Direct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
    /// Not reachable
    #[default]
    None,
    /// Immediate neighbour
    Direct(DirectRoute),
    /// Packets must be routed through another subscriber
    Indirect {
        /// Next hop towards this subscriber
        next_hop: SubscriberId,
    },
    /// Probably reachable by flooding with a small TTL, pending path discovery
    Broadcast,
    /// An identity held in the local keyring
    SelfNode,
}

impl Reachability {
    /// Short state name for logs and errors
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Direct(_) => "DIRECT",
            Self::Indirect { .. } => "INDIRECT",
            Self::Broadcast => "BROADCAST",
            Self::SelfNode => "SELF",
        }
    }

    /// Next hop, when routed indirectly
    #[must_use]
    pub const fn next_hop(&self) -> Option<SubscriberId> {
        match self {
            Self::Indirect { next_hop } => Some(*next_hop),
            _ => None,
        }
    }

    /// Interface attachment, when a direct neighbour
    #[must_use]
    pub const fn direct(&self) -> Option<&DirectRoute> {
        match self {
            Self::Direct(route) => Some(route),
            _ => None,
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One known mesh participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub(crate) sid: Sid,
    pub(crate) abbreviate_len: usize,
    pub(crate) send_full: bool,
    pub(crate) reachability: Reachability,
}

impl Subscriber {
    pub(crate) const fn new(sid: Sid) -> Self {
        Self {
            sid,
            abbreviate_len: 1,
            send_full: true,
            reachability: Reachability::None,
        }
    }

    /// Full address
    #[must_use]
    pub const fn sid(&self) -> &Sid {
        &self.sid
    }

    /// Fewest leading nibbles that tell this address apart from every other
    /// known address
    #[must_use]
    pub const fn abbreviate_len(&self) -> usize {
        self.abbreviate_len
    }

    /// Whether the next reference must carry the full address
    #[must_use]
    pub const fn send_full(&self) -> bool {
        self.send_full
    }

    /// Routing state
    #[must_use]
    pub const fn reachability(&self) -> &Reachability {
        &self.reachability
    }

    /// Whether this subscriber is a local identity
    #[must_use]
    pub const fn is_self(&self) -> bool {
        matches!(self.reachability, Reachability::SelfNode)
    }
}
