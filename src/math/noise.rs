//! Discrete Gaussian noise
//!
//! Encryption, relinearisation and key switching each leave a small error in
//! every slot. The reference backend reproduces that error with a seeded
//! discrete Gaussian over Z, expressed in units of the ciphertext's least
//! significant fixed-point bit.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default Gaussian standard deviation
pub const DEFAULT_SIGMA: f64 = 3.2;

/// Discrete Gaussian sampler over Z using rejection sampling
#[derive(Clone)]
pub struct NoiseSampler {
    sigma: f64,
    /// Samples beyond this magnitude are rejected (6σ)
    tailcut: i64,
    rng: ChaCha20Rng,
}

impl NoiseSampler {
    /// Sampler seeded from the OS
    pub fn new(sigma: f64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::from_entropy())
    }

    /// Deterministic sampler
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::seed_from_u64(seed))
    }

    fn from_rng(sigma: f64, rng: ChaCha20Rng) -> Self {
        Self {
            sigma,
            tailcut: (sigma * 6.0).ceil() as i64,
            rng,
        }
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Sample a single value from D_σ
    pub fn sample(&mut self) -> i64 {
        if self.tailcut == 0 {
            return 0;
        }
        let two_sigma_sq = 2.0 * self.sigma * self.sigma;

        loop {
            let x = self.rng.gen_range(-self.tailcut..=self.tailcut);
            let prob = (-((x * x) as f64) / two_sigma_sq).exp();
            let u: f64 = self.rng.gen();
            if u < prob {
                return x;
            }
        }
    }

    /// Add one fresh sample to every slot
    pub fn perturb(&mut self, slots: &mut [i128]) {
        for v in slots.iter_mut() {
            *v += self.sample() as i128;
        }
    }
}

impl std::fmt::Debug for NoiseSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseSampler")
            .field("sigma", &self.sigma)
            .field("tailcut", &self.tailcut)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_within_tailcut() {
        let mut sampler = NoiseSampler::with_seed(DEFAULT_SIGMA, 7);
        let bound = (DEFAULT_SIGMA * 6.0).ceil() as i64;
        for _ in 0..2000 {
            assert!(sampler.sample().abs() <= bound);
        }
    }

    #[test]
    fn test_empirical_moments() {
        let mut sampler = NoiseSampler::with_seed(DEFAULT_SIGMA, 42);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| sampler.sample() as f64).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.2, "mean {}", mean);
        assert!((var.sqrt() - DEFAULT_SIGMA).abs() < 0.3, "std {}", var.sqrt());
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let mut a = NoiseSampler::with_seed(3.2, 99);
        let mut b = NoiseSampler::with_seed(3.2, 99);
        let va: Vec<i64> = (0..32).map(|_| a.sample()).collect();
        let vb: Vec<i64> = (0..32).map(|_| b.sample()).collect();
        assert_eq!(va, vb);
    }

    #[test]
    fn test_zero_sigma_is_noiseless() {
        let mut sampler = NoiseSampler::with_seed(0.0, 1);
        let mut slots = vec![5i128; 8];
        sampler.perturb(&mut slots);
        assert!(slots.iter().all(|&v| v == 5));
    }
}
