//! Process-wide set of known subscribers.
//!
//! The registry owns every [`Subscriber`]; everything else refers to them by
//! [`SubscriberId`]. A single mutex guards creation, lookup and reachability
//! updates so that concurrent links never create the same subscriber twice or
//! observe a half-updated route.

use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::error::RegistryError;
use super::{DirectRoute, Reachability, Sid, Subscriber, SubscriberId};

/// Public identity produced by the keyring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringIdentity {
    /// Public address
    pub sid: Sid,
    /// Display name, if one is registered
    pub name: Option<String>,
}

/// Keyring collaborator: yields the identities currently unlocked on this node
pub trait Keyring {
    /// Public addresses and display names of every unlocked identity
    fn identities(&self) -> Vec<KeyringIdentity>;
}

/// Outcome of resolving an abbreviated address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMatch {
    /// No known address has the prefix
    None,
    /// Exactly one known address has the prefix
    One(Sid),
    /// This many known addresses share the prefix
    Many(usize),
}

#[derive(Debug, Default)]
struct Inner {
    subscribers: Vec<Subscriber>,
    by_sid: BTreeMap<Sid, SubscriberId>,
    self_id: Option<SubscriberId>,
}

impl Inner {
    fn get(&self, id: SubscriberId) -> Result<&Subscriber, RegistryError> {
        self.subscribers
            .get(id.index())
            .ok_or(RegistryError::InvalidHandle(id))
    }

    fn get_mut(&mut self, id: SubscriberId) -> Result<&mut Subscriber, RegistryError> {
        self.subscribers
            .get_mut(id.index())
            .ok_or(RegistryError::InvalidHandle(id))
    }

    fn insert(&mut self, sid: Sid) -> SubscriberId {
        let id = SubscriberId(self.subscribers.len() as u32);
        let mut subscriber = Subscriber::new(sid);

        // The longest shared prefix with any known address is always shared
        // with one of the two sorted neighbours.
        let before = self.by_sid.range(..sid).next_back().map(|(_, id)| *id);
        let after = self
            .by_sid
            .range((Bound::Excluded(sid), Bound::Unbounded))
            .next()
            .map(|(_, id)| *id);
        for neighbour in [before, after].into_iter().flatten() {
            let other = &mut self.subscribers[neighbour.index()];
            let needed = (sid.common_prefix_nibbles(&other.sid) + 1).min(super::SID_NIBBLES);
            other.abbreviate_len = other.abbreviate_len.max(needed);
            subscriber.abbreviate_len = subscriber.abbreviate_len.max(needed);
        }

        self.subscribers.push(subscriber);
        self.by_sid.insert(sid, id);
        id
    }
}

/// Owner of every known subscriber
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    inner: Mutex<Inner>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("subscriber registry mutex poisoned")
    }

    /// Look a subscriber up by full address, creating it when `create` is set
    pub fn find_or_create(&self, sid: &Sid, create: bool) -> Result<SubscriberId, RegistryError> {
        let mut inner = self.lock();
        if let Some(id) = inner.by_sid.get(sid) {
            return Ok(*id);
        }
        if !create {
            return Err(RegistryError::NotFound { sid: *sid });
        }
        let id = inner.insert(*sid);
        debug!(%sid, ?id, "new subscriber");
        Ok(id)
    }

    /// Look a subscriber up by full address
    #[must_use]
    pub fn find(&self, sid: &Sid) -> Option<SubscriberId> {
        self.lock().by_sid.get(sid).copied()
    }

    /// Snapshot of one subscriber
    pub fn get(&self, id: SubscriberId) -> Result<Subscriber, RegistryError> {
        self.lock().get(id).cloned()
    }

    /// Number of known subscribers
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Whether no subscriber is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit subscribers in address order, starting at `start` (inclusive).
    ///
    /// Returns the address the visitor stopped at, so a later call can resume
    /// from it. The registry stays locked while the visitor runs; the visitor
    /// must not call back into the registry.
    pub fn enumerate<F>(&self, start: Option<&Sid>, mut visitor: F) -> Option<Sid>
    where
        F: FnMut(&Subscriber) -> ControlFlow<()>,
    {
        let inner = self.lock();
        let lower = start.map_or(Bound::Unbounded, |sid| Bound::Included(*sid));
        for (sid, id) in inner.by_sid.range((lower, Bound::Unbounded)) {
            if visitor(&inner.subscribers[id.index()]).is_break() {
                return Some(*sid);
            }
        }
        None
    }

    /// Make `sid` the local node's primary identity
    pub fn set_self(&self, sid: &Sid) -> SubscriberId {
        let mut inner = self.lock();
        let id = match inner.by_sid.get(sid) {
            Some(id) => *id,
            None => inner.insert(*sid),
        };
        let subscriber = &mut inner.subscribers[id.index()];
        subscriber.reachability = Reachability::SelfNode;
        subscriber.send_full = false;
        inner.self_id = Some(id);
        debug!(%sid, "local address set");
        id
    }

    /// Address of the local node, if set
    #[must_use]
    pub fn self_sid(&self) -> Option<Sid> {
        let inner = self.lock();
        inner.self_id.map(|id| inner.subscribers[id.index()].sid)
    }

    /// Mark every unlocked keyring identity as local.
    ///
    /// The first identity becomes the primary one unless a primary is already
    /// set. Returns how many identities were loaded.
    pub fn load_identities<K: Keyring + ?Sized>(&self, keyring: &K) -> usize {
        let identities = keyring.identities();
        for identity in &identities {
            if self.self_sid().is_none() {
                self.set_self(&identity.sid);
            } else {
                let mut inner = self.lock();
                let id = match inner.by_sid.get(&identity.sid) {
                    Some(id) => *id,
                    None => inner.insert(identity.sid),
                };
                let subscriber = &mut inner.subscribers[id.index()];
                subscriber.reachability = Reachability::SelfNode;
                subscriber.send_full = false;
            }
            debug!(sid = %identity.sid, name = ?identity.name, "loaded local identity");
        }
        identities.len()
    }

    /// Replace a subscriber's routing state
    pub fn set_reachability(
        &self,
        id: SubscriberId,
        reachability: Reachability,
    ) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if let Reachability::Indirect { next_hop } = reachability {
            inner.get(next_hop)?;
        }
        inner.get_mut(id)?.reachability = reachability;
        Ok(())
    }

    /// Change the next hop of an indirectly reachable subscriber
    pub fn set_next_hop(&self, id: SubscriberId, hop: SubscriberId) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        inner.get(hop)?;
        let subscriber = inner.get_mut(id)?;
        match &mut subscriber.reachability {
            Reachability::Indirect { next_hop } => {
                *next_hop = hop;
                Ok(())
            }
            other => Err(RegistryError::WrongReachability {
                sid: subscriber.sid,
                state: other.name(),
                attachment: "next hop",
            }),
        }
    }

    /// Change the interface attachment of a directly reachable subscriber
    pub fn set_direct_route(
        &self,
        id: SubscriberId,
        route: DirectRoute,
    ) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let subscriber = inner.get_mut(id)?;
        match &mut subscriber.reachability {
            Reachability::Direct(current) => {
                *current = route;
                Ok(())
            }
            other => Err(RegistryError::WrongReachability {
                sid: subscriber.sid,
                state: other.name(),
                attachment: "interface",
            }),
        }
    }

    /// Force the next reference to `id` on any link to carry the full address
    pub fn request_send_full(&self, id: SubscriberId) -> Result<(), RegistryError> {
        self.lock().get_mut(id)?.send_full = true;
        Ok(())
    }

    pub(crate) fn clear_send_full(&self, id: SubscriberId) -> Result<(), RegistryError> {
        self.lock().get_mut(id)?.send_full = false;
        Ok(())
    }

    /// Resolve the leading `nibbles` of `prefix` against every known address
    #[must_use]
    pub fn lookup_prefix(&self, prefix: &[u8], nibbles: usize) -> PrefixMatch {
        let (low, high) = Sid::prefix_range(prefix, nibbles);
        let inner = self.lock();
        let mut matches = inner.by_sid.range(low..=high).map(|(sid, _)| *sid);
        match (matches.next(), matches.next()) {
            (None, _) => PrefixMatch::None,
            (Some(sid), None) => PrefixMatch::One(sid),
            (Some(_), Some(_)) => PrefixMatch::Many(2 + matches.count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{InterfaceId, SID_SIZE};

    fn sid(prefix: &[u8]) -> Sid {
        let mut bytes = [0u8; SID_SIZE];
        bytes[..prefix.len()].copy_from_slice(prefix);
        Sid::new(bytes)
    }

    struct FixedKeyring(Vec<KeyringIdentity>);

    impl Keyring for FixedKeyring {
        fn identities(&self) -> Vec<KeyringIdentity> {
            self.0.clone()
        }
    }

    #[test]
    fn find_or_create_is_unique_per_address() {
        let registry = SubscriberRegistry::new();
        let a = registry.find_or_create(&sid(&[1]), true).unwrap();
        let again = registry.find_or_create(&sid(&[1]), true).unwrap();
        assert_eq!(a, again);
        assert_eq!(registry.len(), 1);

        let fresh = registry.get(a).unwrap();
        assert_eq!(fresh.reachability(), &Reachability::None);
        assert!(fresh.send_full());
    }

    #[test]
    fn concurrent_creation_yields_one_subscriber() {
        let registry = SubscriberRegistry::new();
        let peer = sid(&[0x42]);
        let shared = &registry;
        let ids: Vec<SubscriberId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(move || shared.find_or_create(&peer, true).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find(&peer), Some(ids[0]));
    }

    #[test]
    fn lookup_without_create_fails() {
        let registry = SubscriberRegistry::new();
        assert_eq!(
            registry.find_or_create(&sid(&[9]), false),
            Err(RegistryError::NotFound { sid: sid(&[9]) })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn abbreviation_grows_with_shared_prefixes() {
        let registry = SubscriberRegistry::new();
        let a = registry.find_or_create(&sid(&[0xAB, 0xC0]), true).unwrap();
        assert_eq!(registry.get(a).unwrap().abbreviate_len(), 1);

        let b = registry.find_or_create(&sid(&[0xAB, 0xD0]), true).unwrap();
        assert_eq!(registry.get(a).unwrap().abbreviate_len(), 3);
        assert_eq!(registry.get(b).unwrap().abbreviate_len(), 3);

        let c = registry.find_or_create(&sid(&[0xAB, 0xC1]), true).unwrap();
        assert_eq!(registry.get(a).unwrap().abbreviate_len(), 4);
        assert_eq!(registry.get(c).unwrap().abbreviate_len(), 4);
        assert_eq!(registry.get(b).unwrap().abbreviate_len(), 3);
    }

    #[test]
    fn enumerate_is_sorted_and_resumable() {
        let registry = SubscriberRegistry::new();
        for first in [0x30, 0x10, 0x20, 0x40] {
            registry.find_or_create(&sid(&[first]), true).unwrap();
        }

        let mut seen = Vec::new();
        let stopped = registry.enumerate(None, |s| {
            seen.push(s.sid().as_bytes()[0]);
            if seen.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, vec![0x10, 0x20]);
        assert_eq!(stopped, Some(sid(&[0x20])));

        let mut rest = Vec::new();
        let stopped = registry.enumerate(stopped.as_ref(), |s| {
            rest.push(s.sid().as_bytes()[0]);
            ControlFlow::Continue(())
        });
        assert_eq!(rest, vec![0x20, 0x30, 0x40]);
        assert_eq!(stopped, None);
    }

    #[test]
    fn attachment_must_match_state() {
        let registry = SubscriberRegistry::new();
        let peer = registry.find_or_create(&sid(&[1]), true).unwrap();
        let hop = registry.find_or_create(&sid(&[2]), true).unwrap();
        let route = DirectRoute {
            interface: InterfaceId(3),
            address: None,
        };

        assert!(matches!(
            registry.set_next_hop(peer, hop),
            Err(RegistryError::WrongReachability { state: "NONE", .. })
        ));

        registry
            .set_reachability(peer, Reachability::Indirect { next_hop: hop })
            .unwrap();
        assert!(matches!(
            registry.set_direct_route(peer, route),
            Err(RegistryError::WrongReachability { state: "INDIRECT", .. })
        ));
        let other_hop = registry.find_or_create(&sid(&[3]), true).unwrap();
        registry.set_next_hop(peer, other_hop).unwrap();
        assert_eq!(
            registry.get(peer).unwrap().reachability().next_hop(),
            Some(other_hop)
        );

        registry
            .set_reachability(peer, Reachability::Direct(route))
            .unwrap();
        let moved = DirectRoute {
            interface: InterfaceId(4),
            address: Some("10.0.0.1:4110".parse().unwrap()),
        };
        registry.set_direct_route(peer, moved).unwrap();
        assert_eq!(registry.get(peer).unwrap().reachability().direct(), Some(&moved));
    }

    #[test]
    fn next_hop_must_exist() {
        let registry = SubscriberRegistry::new();
        let peer = registry.find_or_create(&sid(&[1]), true).unwrap();
        assert_eq!(
            registry.set_reachability(peer, Reachability::Indirect { next_hop: SubscriberId(7) }),
            Err(RegistryError::InvalidHandle(SubscriberId(7)))
        );
    }

    #[test]
    fn prefix_lookup_counts_matches() {
        let registry = SubscriberRegistry::new();
        registry.find_or_create(&sid(&[0xAB, 0xC0]), true).unwrap();
        registry.find_or_create(&sid(&[0xAB, 0xC1]), true).unwrap();
        registry.find_or_create(&sid(&[0xAB, 0xD0]), true).unwrap();

        assert_eq!(registry.lookup_prefix(&[0xAB, 0xC0], 3), PrefixMatch::Many(2));
        assert_eq!(
            registry.lookup_prefix(&[0xAB, 0xD0], 3),
            PrefixMatch::One(sid(&[0xAB, 0xD0]))
        );
        assert_eq!(registry.lookup_prefix(&[0xEE, 0x00], 3), PrefixMatch::None);
    }

    #[test]
    fn keyring_identities_become_self() {
        let registry = SubscriberRegistry::new();
        let keyring = FixedKeyring(vec![
            KeyringIdentity {
                sid: sid(&[5]),
                name: Some("alice".into()),
            },
            KeyringIdentity {
                sid: sid(&[6]),
                name: None,
            },
        ]);

        assert_eq!(registry.load_identities(&keyring), 2);
        assert_eq!(registry.self_sid(), Some(sid(&[5])));
        let second = registry.find(&sid(&[6])).unwrap();
        assert!(registry.get(second).unwrap().is_self());
        assert!(!registry.get(second).unwrap().send_full());
    }
}
