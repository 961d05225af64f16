//! Reference backend: a transparent simulator of the leveled scheme.
//!
//! Slots are stored in the clear as `i128` fixed-point values. Everything the
//! engine can observe behaves like an RNS CKKS implementation: levels are
//! consumed by rescales, rescales round, operands must agree on level and
//! scale, rotations need keys, and encryption, relinearisation and key
//! switching add discrete Gaussian noise.

use std::sync::Mutex;

use crate::error::{config_err, HeError, Result};
use crate::math::NoiseSampler;
use crate::params::{SchemeParams, MAX_PRODUCT_BITS};

use super::galois::RotationKeys;
use super::types::{SimCiphertext, SimPlaintext};
use super::{Leveled, Scheme};

/// Simulated scheme instance (parameters, rotation keys, noise source).
#[derive(Debug)]
pub struct SimScheme {
    params: SchemeParams,
    rotation_keys: RotationKeys,
    sampler: Mutex<NoiseSampler>,
}

impl SimScheme {
    /// Generate a scheme with power-of-two rotation keys.
    pub fn new(params: SchemeParams) -> Result<Self> {
        params
            .validate()
            .map_err(|e| config_err!("invalid scheme parameters: {}", e))?;

        let sampler = match params.seed {
            Some(seed) => NoiseSampler::with_seed(params.sigma, seed),
            None => NoiseSampler::new(params.sigma),
        };

        Ok(Self {
            rotation_keys: RotationKeys::power_of_two(params.slots()),
            sampler: Mutex::new(sampler),
            params,
        })
    }

    pub fn params(&self) -> &SchemeParams {
        &self.params
    }

    pub fn rotation_keys(&self) -> &RotationKeys {
        &self.rotation_keys
    }

    /// Generate an extra key for a direct left rotation by `offset`
    pub fn add_rotation_key(&mut self, offset: usize) {
        self.rotation_keys.insert(offset);
    }

    /// Encrypt at an explicit level (used to start a run below the top level).
    pub fn encrypt_at(&self, values: &[f64], scale_bits: u32, level: usize) -> Result<SimCiphertext> {
        if level > self.params.top_level {
            return Err(HeError::LevelMismatch {
                left: level,
                right: self.params.top_level,
            });
        }
        let mut slots = self.encode_slots(values, scale_bits)?;
        self.add_noise(&mut slots);
        Ok(SimCiphertext {
            slots,
            level,
            scale_bits,
        })
    }

    fn add_noise(&self, slots: &mut [i128]) {
        let mut sampler = self
            .sampler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sampler.perturb(slots);
    }

    fn encode_slots(&self, values: &[f64], scale_bits: u32) -> Result<Vec<i128>> {
        let n = self.slots();
        if values.len() > n {
            return Err(config_err!(
                "{} values do not fit {} slots",
                values.len(),
                n
            ));
        }
        let mut slots = vec![0i128; n];
        for (slot, &v) in slots.iter_mut().zip(values) {
            *slot = to_fixed(v, scale_bits)?;
        }
        Ok(slots)
    }

    fn check_aligned(a: &SimCiphertext, b: &SimCiphertext) -> Result<()> {
        if a.level != b.level {
            return Err(HeError::LevelMismatch {
                left: a.level,
                right: b.level,
            });
        }
        if a.scale_bits != b.scale_bits {
            return Err(HeError::ScaleMismatch {
                left: a.scale_bits,
                right: b.scale_bits,
            });
        }
        Ok(())
    }

    fn product_scale(a: u32, b: u32) -> Result<u32> {
        let bits = a + b;
        if bits > MAX_PRODUCT_BITS {
            return Err(HeError::ScaleOverflow { scale_bits: bits });
        }
        Ok(bits)
    }

    fn zip_with<F>(a: &[i128], b: &[i128], scale_bits: u32, op: F) -> Result<Vec<i128>>
    where
        F: Fn(i128, i128) -> Option<i128>,
    {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| op(x, y).ok_or(HeError::ScaleOverflow { scale_bits }))
            .collect()
    }
}

/// round(v · 2^bits)
fn to_fixed(v: f64, bits: u32) -> Result<i128> {
    if bits > MAX_PRODUCT_BITS {
        return Err(HeError::ScaleOverflow { scale_bits: bits });
    }
    let scaled = (v * 2f64.powi(bits as i32)).round();
    if !scaled.is_finite() || scaled.abs() >= 2f64.powi(126) {
        return Err(HeError::ScaleOverflow { scale_bits: bits });
    }
    Ok(scaled as i128)
}

/// Rounded division by 2^bits (round half up)
#[inline]
fn shift_round(v: i128, bits: u32) -> i128 {
    if bits == 0 {
        return v;
    }
    let half = 1i128 << (bits - 1);
    (v + half) >> bits
}

impl Scheme for SimScheme {
    type Ciphertext = SimCiphertext;
    type Plaintext = SimPlaintext;

    fn slots(&self) -> usize {
        self.params.slots()
    }

    fn top_level(&self) -> usize {
        self.params.top_level
    }

    fn encrypt(&self, values: &[f64], scale_bits: u32) -> Result<SimCiphertext> {
        self.encrypt_at(values, scale_bits, self.params.top_level)
    }

    fn decrypt(&self, ct: &SimCiphertext) -> Vec<f64> {
        let scale = 2f64.powi(ct.scale_bits as i32);
        ct.slots.iter().map(|&v| v as f64 / scale).collect()
    }

    fn encode(&self, values: &[f64], scale_bits: u32) -> Result<SimPlaintext> {
        Ok(SimPlaintext {
            slots: self.encode_slots(values, scale_bits)?,
            scale_bits,
        })
    }

    fn add(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        Self::check_aligned(a, b)?;
        Ok(SimCiphertext {
            slots: Self::zip_with(&a.slots, &b.slots, a.scale_bits, i128::checked_add)?,
            level: a.level,
            scale_bits: a.scale_bits,
        })
    }

    fn sub(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        Self::check_aligned(a, b)?;
        Ok(SimCiphertext {
            slots: Self::zip_with(&a.slots, &b.slots, a.scale_bits, i128::checked_sub)?,
            level: a.level,
            scale_bits: a.scale_bits,
        })
    }

    fn add_const(&self, a: &SimCiphertext, c: f64) -> Result<SimCiphertext> {
        let k = to_fixed(c, a.scale_bits)?;
        let slots = a
            .slots
            .iter()
            .map(|&v| v.checked_add(k).ok_or(HeError::ScaleOverflow { scale_bits: a.scale_bits }))
            .collect::<Result<Vec<_>>>()?;
        Ok(SimCiphertext {
            slots,
            level: a.level,
            scale_bits: a.scale_bits,
        })
    }

    fn multiply(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        if a.level != b.level {
            return Err(HeError::LevelMismatch {
                left: a.level,
                right: b.level,
            });
        }
        let scale_bits = Self::product_scale(a.scale_bits, b.scale_bits)?;
        let mut slots = Self::zip_with(&a.slots, &b.slots, scale_bits, i128::checked_mul)?;
        // relinearisation
        self.add_noise(&mut slots);
        Ok(SimCiphertext {
            slots,
            level: a.level,
            scale_bits,
        })
    }

    fn multiply_plain(&self, a: &SimCiphertext, p: &SimPlaintext) -> Result<SimCiphertext> {
        if p.slots.len() != a.slots.len() {
            return Err(config_err!(
                "plaintext has {} slots, ciphertext has {}",
                p.slots.len(),
                a.slots.len()
            ));
        }
        let scale_bits = Self::product_scale(a.scale_bits, p.scale_bits)?;
        Ok(SimCiphertext {
            slots: Self::zip_with(&a.slots, &p.slots, scale_bits, i128::checked_mul)?,
            level: a.level,
            scale_bits,
        })
    }

    fn multiply_const(&self, a: &SimCiphertext, c: f64, scale_bits: u32) -> Result<SimCiphertext> {
        let out_bits = Self::product_scale(a.scale_bits, scale_bits)?;
        let k = to_fixed(c, scale_bits)?;
        let slots = a
            .slots
            .iter()
            .map(|&v| v.checked_mul(k).ok_or(HeError::ScaleOverflow { scale_bits: out_bits }))
            .collect::<Result<Vec<_>>>()?;
        Ok(SimCiphertext {
            slots,
            level: a.level,
            scale_bits: out_bits,
        })
    }

    fn rotate(&self, a: &SimCiphertext, offset: isize) -> Result<SimCiphertext> {
        let n = a.slots.len();
        let left = offset.rem_euclid(n as isize) as usize;
        let steps = self.rotation_keys.decompose(left)?;

        let mut slots = a.slots.clone();
        for step in steps {
            slots.rotate_left(step);
            // key switching
            self.add_noise(&mut slots);
        }
        Ok(SimCiphertext {
            slots,
            level: a.level,
            scale_bits: a.scale_bits,
        })
    }

    fn rescale_by(&self, a: &SimCiphertext, bits: u32) -> Result<SimCiphertext> {
        if a.level == 0 {
            return Err(HeError::DepthExhausted {
                required: 1,
                available: 0,
            });
        }
        if bits > a.scale_bits {
            return Err(HeError::ScaleMismatch {
                left: a.scale_bits,
                right: bits,
            });
        }
        Ok(SimCiphertext {
            slots: a.slots.iter().map(|&v| shift_round(v, bits)).collect(),
            level: a.level - 1,
            scale_bits: a.scale_bits - bits,
        })
    }

    fn level_down(&self, a: &SimCiphertext, level: usize) -> Result<SimCiphertext> {
        if level > a.level() {
            return Err(HeError::LevelMismatch {
                left: a.level(),
                right: level,
            });
        }
        Ok(SimCiphertext {
            slots: a.slots.clone(),
            level,
            scale_bits: a.scale_bits,
        })
    }
}
