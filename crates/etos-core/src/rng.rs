//! Deterministic random number generator
//!
//! A PCG generator seeded from the configured `u64` seed. The seed is
//! expanded through `SeedableRng::seed_from_u64`, so nearby seeds give
//! unrelated streams. The same seed always produces the same simulation run.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A deterministic random number generator
///
/// Never use thread-local or OS randomness inside the kernel; every draw
/// goes through the simulation's `SimRng`.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: Pcg64Mcg,
}

impl SimRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Generate the next raw u64 value
    pub fn next_u64(&mut self) -> u64 {
        self.inner.gen()
    }

    /// Generate a random f64 in range [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen()
    }

    /// Generate a random f64 in range [min, max); `min` when the range is empty
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        if min < max {
            self.inner.gen_range(min..max)
        } else {
            min
        }
    }

    /// Generate a random bool with given probability of true
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Draw from any `rand_distr` distribution
    pub fn sample<D: rand_distr::Distribution<f64>>(&mut self, dist: D) -> f64 {
        dist.sample(&mut self.inner)
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(12345)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut rng1 = SimRng::new(42);
        let mut rng2 = SimRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_small_seeds_spread() {
        for seed in [0, 1, 7, 42, 2024] {
            let mut rng = SimRng::new(seed);
            let first = rng.next_f64();
            assert!(first > 1e-3, "seed {seed} drew {first}");
        }
        let mut a = SimRng::new(1);
        let mut b = SimRng::new(2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_first_draws_cover_unit_interval() {
        // First draw of many consecutive seeds should look uniform
        let firsts: Vec<f64> = (0..1000).map(|s| SimRng::new(s).next_f64()).collect();
        let mean = firsts.iter().sum::<f64>() / firsts.len() as f64;
        assert!((mean - 0.5).abs() < 0.05);
        assert!(firsts.iter().filter(|x| **x < 0.1).count() < 200);
    }

    #[test]
    fn test_range() {
        let mut rng = SimRng::new(42);
        for _ in 0..1000 {
            let f = rng.next_f64();
            assert!((0.0..1.0).contains(&f));
            let r = rng.range_f64(10.0, 20.0);
            assert!((10.0..20.0).contains(&r));
        }
        assert_eq!(rng.range_f64(3.0, 3.0), 3.0);
    }

    #[test]
    fn test_chance_extremes() {
        let mut rng = SimRng::new(5);
        for _ in 0..100 {
            assert!(rng.chance(1.0));
            assert!(!rng.chance(0.0));
        }
    }
}
