pub mod ops;
pub mod prf;
