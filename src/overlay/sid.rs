//! Subscriber ids

use std::fmt;
use std::str::FromStr;

/// Size of a subscriber id in bytes
pub const SID_SIZE: usize = 32;

/// Number of 4-bit nibbles in a subscriber id
pub const SID_NIBBLES: usize = SID_SIZE * 2;

/// Public-key-derived address of one mesh participant.
///
/// Ordering is byte-wise, which is also nibble-wise, so sorted collections of
/// sids keep addresses with common prefixes adjacent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sid([u8; SID_SIZE]);

impl Sid {
    /// Wrap raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; SID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SID_SIZE] {
        &self.0
    }

    /// Nibble at `index`, most significant first
    #[must_use]
    pub const fn nibble(&self, index: usize) -> u8 {
        let byte = self.0[index / 2];
        if index % 2 == 0 { byte >> 4 } else { byte & 0x0f }
    }

    /// Number of leading nibbles shared with `other`
    #[must_use]
    pub fn common_prefix_nibbles(&self, other: &Self) -> usize {
        for (idx, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let diff = a ^ b;
            if diff != 0 {
                return idx * 2 + usize::from(diff & 0xf0 == 0);
            }
        }
        SID_NIBBLES
    }

    /// Leading `nibbles` packed into bytes, with the unused low nibble of an
    /// odd-length prefix zeroed.
    #[must_use]
    pub fn prefix_bytes(&self, nibbles: usize) -> Vec<u8> {
        let mut bytes = self.0[..nibbles.div_ceil(2)].to_vec();
        if nibbles % 2 == 1 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xf0;
            }
        }
        bytes
    }

    /// Smallest and largest sids starting with `prefix`, for range scans
    #[must_use]
    pub fn prefix_range(prefix: &[u8], nibbles: usize) -> (Self, Self) {
        let mut low = [0u8; SID_SIZE];
        let mut high = [0xffu8; SID_SIZE];
        let whole = nibbles / 2;
        low[..whole].copy_from_slice(&prefix[..whole]);
        high[..whole].copy_from_slice(&prefix[..whole]);
        if nibbles % 2 == 1 {
            low[whole] = prefix[whole] & 0xf0;
            high[whole] = prefix[whole] | 0x0f;
        }
        (Self(low), Self(high))
    }

    /// Upper-case hex rendering
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Abbreviated the way operators read sids in logs.
        write!(f, "Sid({}*)", &self.to_hex()[..16])
    }
}

impl FromStr for Sid {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; SID_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; SID_SIZE]> for Sid {
    fn from(bytes: [u8; SID_SIZE]) -> Self {
        Self(bytes)
    }
}
