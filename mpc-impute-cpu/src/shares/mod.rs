pub mod fixed;
pub(crate) mod int_ring;
pub(crate) mod ring_impl;
pub mod share;

pub use fixed::{FixedPoint, FixedD16, RingEncoding};
pub use int_ring::IntRing2k;
pub use ring_impl::RingElement;
pub use share::Share;
