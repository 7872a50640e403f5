//! Overlay addressing
//!
//! This module provides subscriber identities, the process-wide subscriber
//! registry and the per-link abbreviated address codec.

mod broadcast;
mod codec;
mod error;
mod registry;
mod sid;
mod subscriber;
mod varint;

pub use broadcast::{BROADCAST_LEN, BroadcastFilter, BroadcastId, DEFAULT_BROADCAST_HISTORY};
pub use codec::{
    Address, AddressCache, CODE_BROADCAST, CODE_FULL_INDEX1, CODE_FULL_INDEX2,
    CODE_IMPLICIT_FULL, CODE_INDEX, CODE_PREFIX3, CODE_PREFIX3_INDEX1, CODE_PREFIX7,
    CODE_PREFIX7_INDEX1, CODE_PREFIX11, CODE_PREFIX11_INDEX1, CODE_PREFIX11_INDEX2, CODE_PREVIOUS,
    CODE_SELF,
};
pub use error::{AddressError, RegistryError, Result};
pub use registry::{Keyring, KeyringIdentity, PrefixMatch, SubscriberRegistry};
pub use sid::{SID_NIBBLES, SID_SIZE, Sid};
pub use subscriber::{DirectRoute, InterfaceId, Reachability, Subscriber, SubscriberId};
pub use varint::{MAX_VARINT_LEN, VarintError, get_varint, put_varint};
