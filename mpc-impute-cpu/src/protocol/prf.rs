use crate::shares::{IntRing2k, RingElement};
use rand::{distributions::Standard, prelude::Distribution, rngs::OsRng, Rng, RngCore, SeedableRng};

pub use rand_chacha::ChaCha20Rng as PrfRng;

pub type PrfSeed = <PrfRng as SeedableRng>::Seed;

/// Pair of correlated generators: `my_prf` is shared with the next party,
/// `prev_prf` with the previous one.
#[derive(Clone, Debug)]
pub struct Prf {
    pub my_prf:   PrfRng,
    pub prev_prf: PrfRng,
}

impl Prf {
    pub fn new(my_key: PrfSeed, prev_key: PrfSeed) -> Self {
        Self {
            my_prf:   PrfRng::from_seed(my_key),
            prev_prf: PrfRng::from_seed(prev_key),
        }
    }

    pub fn gen_seed() -> PrfSeed {
        let mut seed = PrfSeed::default();
        OsRng.fill_bytes(&mut seed);
        seed
    }

    pub fn gen_rands<T>(&mut self) -> (T, T)
    where
        Standard: Distribution<T>,
    {
        let a = self.my_prf.gen::<T>();
        let b = self.prev_prf.gen::<T>();
        (a, b)
    }

    /// Additive share of zero. Summed over the three parties the draws cancel.
    pub fn gen_zero_share<T: IntRing2k>(&mut self) -> RingElement<T>
    where
        Standard: Distribution<T>,
    {
        let (a, b) = self.gen_rands::<RingElement<T>>();
        a - b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_shares_cancel() {
        let seeds = [[1_u8; 32], [2_u8; 32], [3_u8; 32]];
        let mut prfs: Vec<Prf> = (0..3).map(|i| Prf::new(seeds[i], seeds[(i + 2) % 3])).collect();
        for _ in 0..16 {
            let sum: RingElement<u64> = prfs.iter_mut().map(|p| p.gen_zero_share()).sum();
            assert_eq!(sum, RingElement(0));
        }
    }

    #[test]
    fn test_fresh_seeds_differ() {
        assert_ne!(Prf::gen_seed(), Prf::gen_seed());
    }
}
