//! Plaintext representations carried by the ring Z/2^64.
//!
//! Integers are embedded in two's complement. Reals use a signed fixed-point
//! encoding with `D` fractional bits, so sums of encodings decode to the sum
//! of the reals as long as no intermediate leaves the i64 range.

use super::ring_impl::RingElement;

pub trait RingEncoding: Sized + Copy {
    fn encode(self) -> RingElement<u64>;
    fn decode(element: RingElement<u64>) -> Self;
}

impl RingEncoding for i64 {
    fn encode(self) -> RingElement<u64> {
        RingElement(self as u64)
    }

    fn decode(element: RingElement<u64>) -> Self {
        element.convert() as i64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct FixedPoint<const D: u32>(pub f64);

/// Fixed point with 16 fractional bits.
pub type FixedD16 = FixedPoint<16>;

impl<const D: u32> FixedPoint<D> {
    const SCALE: f64 = (1_u64 << D) as f64;

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl<const D: u32> RingEncoding for FixedPoint<D> {
    fn encode(self) -> RingElement<u64> {
        RingElement((self.0 * Self::SCALE).round() as i64 as u64)
    }

    fn decode(element: RingElement<u64>) -> Self {
        FixedPoint(element.convert() as i64 as f64 / Self::SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(100)]
    #[case(-7)]
    #[case(i64::MIN)]
    fn test_integer_embedding(#[case] value: i64) {
        assert_eq!(i64::decode(value.encode()), value);
    }

    #[rstest]
    #[case(0.0)]
    #[case(2.5)]
    #[case(-1.25)]
    #[case(1234.0625)]
    fn test_fixed_point_exact_values(#[case] value: f64) {
        assert_eq!(FixedD16::decode(FixedD16::new(value).encode()).value(), value);
    }

    #[test]
    fn test_fixed_point_sums_in_ring() {
        let sum = [1.5, -0.25, 3.0]
            .into_iter()
            .map(|v| FixedD16::new(v).encode())
            .sum();
        assert_eq!(FixedD16::decode(sum).value(), 4.25);

        let third = FixedD16::decode(FixedD16::new(1.0 / 3.0).encode()).value();
        assert!((third - 1.0 / 3.0).abs() < 1.0 / 65536.0);
    }
}
