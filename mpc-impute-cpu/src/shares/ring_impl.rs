use super::int_ring::IntRing2k;
use num_traits::Zero;
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

/// Element of Z/2^k, `k` being the bit width of `T`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound = "")]
#[repr(transparent)]
pub struct RingElement<T: IntRing2k>(pub T);

impl<T: IntRing2k> RingElement<T> {
    pub fn convert(self) -> T {
        self.0
    }
}

impl<T: IntRing2k> fmt::Display for RingElement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<T: IntRing2k> Add for RingElement<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(&rhs.0))
    }
}

impl<T: IntRing2k> Add<&Self> for RingElement<T> {
    type Output = Self;

    fn add(self, rhs: &Self) -> Self {
        self + *rhs
    }
}

impl<T: IntRing2k> AddAssign for RingElement<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: IntRing2k> Sub for RingElement<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(&rhs.0))
    }
}

impl<T: IntRing2k> SubAssign for RingElement<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: IntRing2k> Neg for RingElement<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl<T: IntRing2k> Zero for RingElement<T> {
    fn zero() -> Self {
        Self(T::zero())
    }

    fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl<T: IntRing2k> Sum for RingElement<T> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<T: IntRing2k> Distribution<RingElement<T>> for Standard
where
    Standard: Distribution<T>,
{
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> RingElement<T> {
        RingElement(rng.gen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_wrapping_arithmetic() {
        let max = RingElement(u64::MAX);
        assert_eq!(max + RingElement(1), RingElement(0));
        assert_eq!(RingElement(0_u64) - RingElement(1), max);
        assert_eq!(-RingElement(1_u32), RingElement(u32::MAX));
    }

    #[test]
    fn test_random_masks_cancel() {
        let mut rng = StdRng::seed_from_u64(0xdeadbeef);
        for _ in 0..100 {
            let x: RingElement<u64> = rng.gen();
            let r: RingElement<u64> = rng.gen();
            assert_eq!((x + r) - r, x);
            let parts = [x, r, -(x + r)];
            assert!(parts.into_iter().sum::<RingElement<u64>>().is_zero());
        }
    }
}
