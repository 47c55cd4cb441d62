use super::{int_ring::IntRing2k, ring_impl::RingElement};
use crate::execution::player::Role;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::{
    iter::Sum,
    ops::{Add, AddAssign, Sub},
};

/// Replicated additive share: party `i` holds `a = x_i` and `b = x_{i-1}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Share<T: IntRing2k> {
    pub a: RingElement<T>,
    pub b: RingElement<T>,
}

impl<T: IntRing2k> Share<T> {
    pub fn new(a: RingElement<T>, b: RingElement<T>) -> Self {
        Self { a, b }
    }

    /// Trivial sharing of a public constant: `x_0 = value`, the other pieces
    /// are zero.
    pub fn from_const(value: T, role: Role) -> Self {
        let value = RingElement(value);
        match role {
            Role::First => Self::new(value, RingElement::zero()),
            Role::Second => Self::new(RingElement::zero(), value),
            Role::Third => Self::zero(),
        }
    }
}

impl<T: IntRing2k> Add for Share<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.a + rhs.a, self.b + rhs.b)
    }
}

impl<T: IntRing2k> Add<&Self> for Share<T> {
    type Output = Self;

    fn add(self, rhs: &Self) -> Self {
        self + *rhs
    }
}

impl<T: IntRing2k> AddAssign for Share<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: IntRing2k> Sub for Share<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.a - rhs.a, self.b - rhs.b)
    }
}

impl<T: IntRing2k> Zero for Share<T> {
    fn zero() -> Self {
        Self::new(RingElement::zero(), RingElement::zero())
    }

    fn is_zero(&self) -> bool {
        self.a.is_zero() && self.b.is_zero()
    }
}

impl<T: IntRing2k> Sum for Share<T> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a, T: IntRing2k> Sum<&'a Share<T>> for Share<T> {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc + x)
    }
}
