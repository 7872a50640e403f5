//! Abbreviated subscriber addresses.
//!
//! Each end of a link keeps an [`AddressCache`] per direction. Both caches
//! see the same sequence of addresses, so an address already exchanged on the
//! link can be named by a small index, by the "previous" slot, or by a short
//! prefix of nibbles instead of its full 32 bytes.
//!
//! # Wire Format
//!
//! ```text
//! 0x00              self (the sender of the frame)
//! 0x01 <varint>     cached index
//! 0x03              previous address on this link
//! 0x05..0x07 <pfx>  3 / 7 / 11 nibble prefix
//! 0x08 <32 bytes>   full address, appended to the cache
//! 0x09..0x0b <pfx>  3 / 7 / 11 nibble prefix, appended to the cache
//! 0x0d              11 nibble prefix, two cache slots (not supported)
//! 0x0e              full address, two cache slots (not supported)
//! 0x0f <8 bytes>    broadcast id
//! 0x10..0xff        first byte of a full address (31 bytes follow)
//! ```
//!
//! 0x02, 0x04 and 0x0c are unassigned. Unsupported and unassigned codes are
//! rejected on decode.
//!
//! Frames on one link must be decoded in the order they were encoded; a
//! decode error means the two caches no longer agree and the link has to be
//! reset.

use std::collections::HashMap;

use bytes::{Buf, BufMut};
use tracing::trace;

use super::error::{AddressError, Result};
use super::registry::PrefixMatch;
use super::varint::{get_varint, put_varint};
use super::{BROADCAST_LEN, BroadcastId, SID_SIZE, Sid, SubscriberRegistry};

/// The frame's sender
pub const CODE_SELF: u8 = 0x00;
/// Index into the link cache
pub const CODE_INDEX: u8 = 0x01;
/// Same address as the last one on this link
pub const CODE_PREVIOUS: u8 = 0x03;
/// 3-nibble prefix
pub const CODE_PREFIX3: u8 = 0x05;
/// 7-nibble prefix
pub const CODE_PREFIX7: u8 = 0x06;
/// 11-nibble prefix
pub const CODE_PREFIX11: u8 = 0x07;
/// Full address, appended to the link cache
pub const CODE_FULL_INDEX1: u8 = 0x08;
/// 3-nibble prefix, appended to the link cache
pub const CODE_PREFIX3_INDEX1: u8 = 0x09;
/// 7-nibble prefix, appended to the link cache
pub const CODE_PREFIX7_INDEX1: u8 = 0x0a;
/// 11-nibble prefix, appended to the link cache
pub const CODE_PREFIX11_INDEX1: u8 = 0x0b;
/// 11-nibble prefix taking two cache slots; never written, rejected on decode
pub const CODE_PREFIX11_INDEX2: u8 = 0x0d;
/// Full address taking two cache slots; never written, rejected on decode
pub const CODE_FULL_INDEX2: u8 = 0x0e;
/// Broadcast id follows
pub const CODE_BROADCAST: u8 = 0x0f;
/// Lowest first byte of an address written in full without a code
pub const CODE_IMPLICIT_FULL: u8 = 0x10;

/// Prefix lengths in nibbles with their plain and cache-appending codes
const PREFIXES: [(usize, u8, u8); 3] = [
    (3, CODE_PREFIX3, CODE_PREFIX3_INDEX1),
    (7, CODE_PREFIX7, CODE_PREFIX7_INDEX1),
    (11, CODE_PREFIX11, CODE_PREFIX11_INDEX1),
];

/// Address read from the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// A mesh participant
    Subscriber(Sid),
    /// A flooded transmission
    Broadcast(BroadcastId),
}

/// Addressing state for one direction of one link
#[derive(Debug, Clone, Default)]
pub struct AddressCache {
    entries: Vec<Sid>,
    positions: HashMap<Sid, u64>,
    previous: Option<Sid>,
    sender: Option<Sid>,
}

impl AddressCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every address exchanged on the link
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.previous = None;
    }

    /// Set the peer whose frames this cache decodes; the self code resolves to it
    pub fn set_sender(&mut self, sid: Sid) {
        self.sender = Some(sid);
    }

    /// Peer whose frames this cache decodes
    #[must_use]
    pub const fn sender(&self) -> Option<&Sid> {
        self.sender.as_ref()
    }

    /// Last address encoded or decoded
    #[must_use]
    pub const fn previous(&self) -> Option<&Sid> {
        self.previous.as_ref()
    }

    /// Addresses in index order
    #[must_use]
    pub fn entries(&self) -> &[Sid] {
        &self.entries
    }

    /// Index assigned to `sid` on this link
    #[must_use]
    pub fn index_of(&self, sid: &Sid) -> Option<u64> {
        self.positions.get(sid).copied()
    }

    /// Number of indexed addresses
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no address has been indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(&mut self, sid: Sid) {
        if !self.positions.contains_key(&sid) {
            self.positions.insert(sid, self.entries.len() as u64);
            self.entries.push(sid);
        }
        self.previous = Some(sid);
    }

    /// Write the shortest form of `sid` the receiver can rebuild.
    ///
    /// Unknown addresses are added to `registry`.
    pub fn encode(
        &mut self,
        buf: &mut impl BufMut,
        registry: &SubscriberRegistry,
        sid: &Sid,
    ) -> Result<()> {
        if registry.self_sid().as_ref() == Some(sid) {
            buf.put_u8(CODE_SELF);
            return Ok(());
        }

        if self.previous.as_ref() == Some(sid) {
            buf.put_u8(CODE_PREVIOUS);
            return Ok(());
        }

        if let Some(index) = self.index_of(sid) {
            buf.put_u8(CODE_INDEX);
            put_varint(buf, index);
            self.previous = Some(*sid);
            return Ok(());
        }

        let id = registry.find_or_create(sid, true)?;
        let subscriber = registry.get(id)?;
        if !subscriber.send_full() {
            let shortest = PREFIXES
                .iter()
                .find(|(nibbles, ..)| *nibbles >= subscriber.abbreviate_len());
            if let Some(&(nibbles, _, code)) = shortest {
                trace!(%sid, nibbles, index = self.entries.len(), "sending prefix");
                buf.put_u8(code);
                buf.put_slice(&sid.prefix_bytes(nibbles));
                self.append(*sid);
                return Ok(());
            }
        }

        trace!(%sid, index = self.entries.len(), "sending full address");
        buf.put_u8(CODE_FULL_INDEX1);
        buf.put_slice(sid.as_bytes());
        self.append(*sid);
        registry.clear_send_full(id)?;
        Ok(())
    }

    /// Write a broadcast address. Broadcasts are never cached.
    pub fn encode_broadcast(buf: &mut impl BufMut, id: &BroadcastId) {
        buf.put_u8(CODE_BROADCAST);
        buf.put_slice(id.as_bytes());
    }

    /// Read one address, updating the cache the same way the sender did
    pub fn decode(&mut self, buf: &mut impl Buf, registry: &SubscriberRegistry) -> Result<Address> {
        need(buf, 1)?;
        let code = buf.get_u8();
        let sid = match code {
            CODE_SELF => {
                return self
                    .sender
                    .map(Address::Subscriber)
                    .ok_or(AddressError::UnknownSender);
            }
            CODE_PREVIOUS => {
                return self.previous.map(Address::Subscriber).ok_or(AddressError::NoPrevious);
            }
            CODE_BROADCAST => {
                need(buf, BROADCAST_LEN)?;
                let mut id = [0u8; BROADCAST_LEN];
                buf.copy_to_slice(&mut id);
                return Ok(Address::Broadcast(BroadcastId::new(id)));
            }
            CODE_INDEX => {
                let index = get_varint(buf)?;
                let sid = usize::try_from(index)
                    .ok()
                    .and_then(|idx| self.entries.get(idx))
                    .copied()
                    .ok_or(AddressError::UnknownIndex {
                        index,
                        len: self.entries.len(),
                    })?;
                self.previous = Some(sid);
                sid
            }
            CODE_PREFIX3 | CODE_PREFIX7 | CODE_PREFIX11 => {
                let sid = read_prefix(buf, registry, prefix_nibbles(code))?;
                self.previous = Some(sid);
                sid
            }
            CODE_PREFIX3_INDEX1 | CODE_PREFIX7_INDEX1 | CODE_PREFIX11_INDEX1 => {
                let sid = read_prefix(buf, registry, prefix_nibbles(code))?;
                self.append(sid);
                sid
            }
            CODE_FULL_INDEX1 => {
                need(buf, SID_SIZE)?;
                let mut bytes = [0u8; SID_SIZE];
                buf.copy_to_slice(&mut bytes);
                let sid = Sid::new(bytes);
                registry.find_or_create(&sid, true)?;
                self.append(sid);
                sid
            }
            CODE_IMPLICIT_FULL..=u8::MAX => {
                need(buf, SID_SIZE - 1)?;
                let mut bytes = [0u8; SID_SIZE];
                bytes[0] = code;
                buf.copy_to_slice(&mut bytes[1..]);
                let sid = Sid::new(bytes);
                registry.find_or_create(&sid, true)?;
                self.previous = Some(sid);
                sid
            }
            CODE_PREFIX11_INDEX2 | CODE_FULL_INDEX2 => {
                return Err(AddressError::UnsupportedCode { code });
            }
            code => return Err(AddressError::UnknownCode { code }),
        };
        Ok(Address::Subscriber(sid))
    }

    /// Read one address that must name a subscriber
    pub fn decode_subscriber(
        &mut self,
        buf: &mut impl Buf,
        registry: &SubscriberRegistry,
    ) -> Result<Sid> {
        match self.decode(buf, registry)? {
            Address::Subscriber(sid) => Ok(sid),
            Address::Broadcast(_) => Err(AddressError::UnexpectedBroadcast),
        }
    }
}

fn prefix_nibbles(code: u8) -> usize {
    PREFIXES
        .iter()
        .find(|(_, plain, indexed)| *plain == code || *indexed == code)
        .map_or(0, |(nibbles, ..)| *nibbles)
}

fn need(buf: &impl Buf, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(AddressError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn read_prefix(buf: &mut impl Buf, registry: &SubscriberRegistry, nibbles: usize) -> Result<Sid> {
    let len = nibbles.div_ceil(2);
    need(buf, len)?;
    let mut prefix = vec![0u8; len];
    buf.copy_to_slice(&mut prefix);
    match registry.lookup_prefix(&prefix, nibbles) {
        PrefixMatch::One(sid) => Ok(sid),
        PrefixMatch::None => Err(AddressError::UnknownPrefix {
            prefix: hex::encode_upper(&prefix),
            nibbles,
        }),
        PrefixMatch::Many(matches) => Err(AddressError::AmbiguousAddress {
            prefix: hex::encode_upper(&prefix),
            nibbles,
            matches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(prefix: &[u8]) -> Sid {
        let mut bytes = [0x5Au8; SID_SIZE];
        bytes[..prefix.len()].copy_from_slice(prefix);
        Sid::new(bytes)
    }

    struct Link {
        sender_registry: SubscriberRegistry,
        receiver_registry: SubscriberRegistry,
        tx: AddressCache,
        rx: AddressCache,
    }

    impl Link {
        fn new() -> Self {
            let local = sid(&[0xE1]);
            let remote = sid(&[0xE2]);
            let sender_registry = SubscriberRegistry::new();
            sender_registry.set_self(&local);
            sender_registry.find_or_create(&remote, true).unwrap();
            let receiver_registry = SubscriberRegistry::new();
            receiver_registry.set_self(&remote);
            receiver_registry.find_or_create(&local, true).unwrap();
            let mut rx = AddressCache::new();
            rx.set_sender(local);
            Self {
                sender_registry,
                receiver_registry,
                tx: AddressCache::new(),
                rx,
            }
        }

        fn send(&mut self, target: &Sid) -> Vec<u8> {
            let mut wire = Vec::new();
            self.tx
                .encode(&mut wire, &self.sender_registry, target)
                .unwrap();
            let mut input = wire.as_slice();
            let decoded = self
                .rx
                .decode_subscriber(&mut input, &self.receiver_registry)
                .unwrap();
            assert_eq!(&decoded, target);
            assert!(input.is_empty());
            assert_eq!(self.tx.entries(), self.rx.entries());
            assert_eq!(self.tx.previous(), self.rx.previous());
            wire
        }
    }

    #[test]
    fn self_is_one_byte() {
        let mut link = Link::new();
        let local = sid(&[0xE1]);
        assert_eq!(link.send(&local), vec![CODE_SELF]);
    }

    #[test]
    fn first_contact_is_full_then_previous() {
        let mut link = Link::new();
        let peer = sid(&[0x42]);
        let first = link.send(&peer);
        assert_eq!(first[0], CODE_FULL_INDEX1);
        assert_eq!(first.len(), 1 + SID_SIZE);

        assert_eq!(link.send(&peer), vec![CODE_PREVIOUS]);
    }

    #[test]
    fn cached_address_uses_index() {
        let mut link = Link::new();
        let a = sid(&[0x42]);
        let b = sid(&[0x43]);
        link.send(&a);
        link.send(&b);
        assert_eq!(link.send(&a), vec![CODE_INDEX, 0x00]);
        assert_eq!(link.send(&b), vec![CODE_INDEX, 0x01]);
    }

    #[test]
    fn known_address_on_new_link_uses_prefix() {
        let mut first = Link::new();
        let peer = sid(&[0x42, 0x10]);
        first.receiver_registry.find_or_create(&peer, true).unwrap();
        first.send(&peer);

        // Same sender, fresh link caches.
        first.tx = AddressCache::new();
        first.rx = AddressCache::new();
        first.rx.set_sender(sid(&[0xE1]));
        let wire = first.send(&peer);
        assert_eq!(wire, vec![CODE_PREFIX3_INDEX1, 0x42, 0x10]);
        assert_eq!(first.rx.index_of(&peer), Some(0));
    }

    #[test]
    fn prefix_grows_until_unambiguous() {
        let mut link = Link::new();
        let a = sid(&[0x42, 0x10, 0x00]);
        let b = sid(&[0x42, 0x1F, 0x00]);
        for registry in [&link.sender_registry, &link.receiver_registry] {
            registry.find_or_create(&a, true).unwrap();
            registry.find_or_create(&b, true).unwrap();
        }
        link.sender_registry
            .clear_send_full(link.sender_registry.find(&a).unwrap())
            .unwrap();

        let wire = link.send(&a);
        assert_eq!(wire[0], CODE_PREFIX7_INDEX1);
        assert_eq!(wire.len(), 1 + 4);
    }

    #[test]
    fn ambiguous_prefix_is_rejected() {
        let registry = SubscriberRegistry::new();
        registry.find_or_create(&sid(&[0x42, 0x10]), true).unwrap();
        registry.find_or_create(&sid(&[0x42, 0x1F]), true).unwrap();

        let mut rx = AddressCache::new();
        let mut input: &[u8] = &[CODE_PREFIX3_INDEX1, 0x42, 0x10];
        assert!(matches!(
            rx.decode(&mut input, &registry),
            Err(AddressError::AmbiguousAddress {
                nibbles: 3,
                matches: 2,
                ..
            })
        ));
        assert!(rx.is_empty());
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        let registry = SubscriberRegistry::new();
        let mut rx = AddressCache::new();
        let mut input: &[u8] = &[CODE_PREFIX7, 0x12, 0x34, 0x56, 0x70];
        assert!(matches!(
            rx.decode(&mut input, &registry),
            Err(AddressError::UnknownPrefix { nibbles: 7, .. })
        ));
    }

    #[test]
    fn broadcast_passes_verbatim() {
        let registry = SubscriberRegistry::new();
        let id = BroadcastId::new([1, 2, 3, 4, 5, 6, 7, 8]);
        let mut wire = Vec::new();
        AddressCache::encode_broadcast(&mut wire, &id);
        assert_eq!(wire.len(), 1 + BROADCAST_LEN);

        let mut rx = AddressCache::new();
        let mut input = wire.as_slice();
        assert_eq!(rx.decode(&mut input, &registry), Ok(Address::Broadcast(id)));
        assert!(rx.previous().is_none());
    }

    #[test]
    fn implicit_full_address_is_accepted() {
        let registry = SubscriberRegistry::new();
        let peer = sid(&[0x99]);
        let mut rx = AddressCache::new();
        let mut input: &[u8] = peer.as_bytes();
        assert_eq!(rx.decode_subscriber(&mut input, &registry), Ok(peer));
        assert_eq!(rx.previous(), Some(&peer));
        assert!(rx.is_empty());
        assert!(registry.find(&peer).is_some());
    }

    #[test]
    fn malformed_input_is_rejected() {
        let registry = SubscriberRegistry::new();
        let mut rx = AddressCache::new();

        let mut reserved: &[u8] = &[0x02];
        assert_eq!(
            rx.decode(&mut reserved, &registry),
            Err(AddressError::UnknownCode { code: 0x02 })
        );

        for code in [CODE_PREFIX11_INDEX2, CODE_FULL_INDEX2] {
            let mut input: &[u8] = &[code, 0x12, 0x34, 0x56];
            assert_eq!(
                rx.decode(&mut input, &registry),
                Err(AddressError::UnsupportedCode { code })
            );
        }
        assert!(rx.entries().is_empty());

        let mut short: &[u8] = &[CODE_FULL_INDEX1, 0x11, 0x22];
        assert!(matches!(
            rx.decode(&mut short, &registry),
            Err(AddressError::Truncated { .. })
        ));

        let mut index: &[u8] = &[CODE_INDEX, 0x05];
        assert_eq!(
            rx.decode(&mut index, &registry),
            Err(AddressError::UnknownIndex { index: 5, len: 0 })
        );

        let mut cut_index: &[u8] = &[CODE_INDEX, 0x80];
        assert!(matches!(
            rx.decode(&mut cut_index, &registry),
            Err(AddressError::Index(_))
        ));

        let mut previous: &[u8] = &[CODE_PREVIOUS];
        assert_eq!(rx.decode(&mut previous, &registry), Err(AddressError::NoPrevious));

        let mut own: &[u8] = &[CODE_SELF];
        assert_eq!(rx.decode(&mut own, &registry), Err(AddressError::UnknownSender));
    }

    #[test]
    fn clear_resets_link_state() {
        let mut link = Link::new();
        link.send(&sid(&[0x42]));
        link.tx.clear();
        assert!(link.tx.is_empty());
        assert!(link.tx.previous().is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any reference sequence decodes to itself and keeps
            /// both caches in step
            #[test]
            fn prop_sequence_roundtrip(
                peers in prop::collection::vec(any::<[u8; SID_SIZE]>(), 1..12),
                picks in prop::collection::vec(any::<prop::sample::Index>(), 1..64),
            ) {
                let mut link = Link::new();
                let peers: Vec<Sid> = peers.into_iter().map(Sid::new).collect();
                for pick in picks {
                    let target = peers[pick.index(peers.len())];
                    link.send(&target);
                }
            }
        }
    }
}
