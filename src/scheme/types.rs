//! Ciphertext and plaintext types of the reference backend.

use super::Leveled;

/// Simulated ciphertext: slot values as fixed-point integers at `2^scale_bits`.
///
/// The values carry the same rounding and noise a lattice ciphertext would
/// decrypt to; only the engine-visible bookkeeping (`level`, `scale_bits`)
/// is meaningful to callers.
#[derive(Clone, Debug)]
pub struct SimCiphertext {
    pub(crate) slots: Vec<i128>,
    pub(crate) level: usize,
    pub(crate) scale_bits: u32,
}

/// Encoded plaintext polynomial (slot domain).
#[derive(Clone, Debug)]
pub struct SimPlaintext {
    pub(crate) slots: Vec<i128>,
    pub(crate) scale_bits: u32,
}

impl SimCiphertext {
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl SimPlaintext {
    pub fn scale_bits(&self) -> u32 {
        self.scale_bits
    }

    /// Slots holding a nonzero value
    pub fn support(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(|(i, _)| i)
    }
}

impl Leveled for SimCiphertext {
    fn level(&self) -> usize {
        self.level
    }

    fn scale_bits(&self) -> u32 {
        self.scale_bits
    }
}
