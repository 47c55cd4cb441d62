use num_traits::{WrappingAdd, WrappingNeg, WrappingSub, Zero};
use serde::{Deserialize, Serialize};
use std::{fmt, hash::Hash};

/// Unsigned integer acting as the ring Z/2^k. Every operation wraps.
pub trait IntRing2k:
    fmt::Display
    + fmt::Debug
    + Serialize
    + for<'a> Deserialize<'a>
    + Default
    + WrappingAdd
    + WrappingSub
    + WrappingNeg
    + Zero
    + Eq
    + Hash
    + Ord
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Encoded width in bytes.
    const BYTES: usize;

    fn put_le(self, out: &mut Vec<u8>);

    /// `None` unless `bytes` is exactly `BYTES` long.
    fn from_le(bytes: &[u8]) -> Option<Self>;
}

macro_rules! int_ring {
    ($($t:ty),*) => {$(
        impl IntRing2k for $t {
            const BYTES: usize = std::mem::size_of::<$t>();

            fn put_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn from_le(bytes: &[u8]) -> Option<Self> {
                bytes.try_into().ok().map(<$t>::from_le_bytes)
            }
        }
    )*};
}

int_ring!(u32, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_width() {
        let mut out = Vec::new();
        0x0102_u32.put_le(&mut out);
        assert_eq!(out, vec![2, 1, 0, 0]);
        assert_eq!(<u32 as IntRing2k>::from_le(&out), Some(0x0102));
        assert_eq!(<u64 as IntRing2k>::from_le(&out), None);
    }
}
