//! Variable-width unsigned integers.
//!
//! Seven value bits per byte, least significant group first, with the high
//! bit set on every byte except the last.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Longest encoding of a `u64`
pub const MAX_VARINT_LEN: usize = 10;

/// Varint decoding failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Input ended in the middle of a value
    #[error("truncated varint")]
    Truncated,
    /// Value does not fit in 64 bits
    #[error("varint overflows u64")]
    Overflow,
}

/// Append `value` to `buf`
pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Consume one value from the front of `buf`.
///
/// On failure `buf` may have been partly consumed.
pub fn get_varint(buf: &mut impl Buf) -> Result<u64, VarintError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(VarintError::Truncated);
        }
        let byte = buf.get_u8();
        let bits = u64::from(byte & 0x7f);
        if shift == 63 && bits > 1 {
            return Err(VarintError::Overflow);
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(VarintError::Overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, value);
        out
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_truncated_is_distinguishable() {
        let mut input: &[u8] = &[0x80, 0x80];
        assert_eq!(get_varint(&mut input), Err(VarintError::Truncated));

        let mut empty: &[u8] = &[];
        assert_eq!(get_varint(&mut empty), Err(VarintError::Truncated));
    }

    #[test]
    fn test_overflow() {
        let mut input: &[u8] = &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert_eq!(get_varint(&mut input), Err(VarintError::Overflow));

        let mut eleven: &[u8] = &[0x80; 11];
        assert_eq!(get_varint(&mut eleven), Err(VarintError::Overflow));
    }

    #[test]
    fn test_leaves_trailing_bytes() {
        let mut input: &[u8] = &[0x05, 0xAA];
        assert_eq!(get_varint(&mut input), Ok(5));
        assert_eq!(input, &[0xAA]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every u64 survives within the length bound
            #[test]
            fn prop_varint_roundtrip(value in any::<u64>()) {
                let bytes = encode(value);
                prop_assert!(!bytes.is_empty() && bytes.len() <= MAX_VARINT_LEN);

                let mut input = bytes.as_slice();
                prop_assert_eq!(get_varint(&mut input), Ok(value));
                prop_assert!(input.is_empty());
            }

            /// Property: any strict prefix of an encoding is reported as truncated
            #[test]
            fn prop_prefix_is_truncated(value in any::<u64>(), cut in 0usize..MAX_VARINT_LEN) {
                let bytes = encode(value);
                let cut = cut.min(bytes.len() - 1);
                let mut input = &bytes[..cut];
                prop_assert_eq!(get_varint(&mut input), Err(VarintError::Truncated));
            }
        }
    }
}
