//! Galois elements for slot rotations
//!
//! With ring dimension N = 2·slots, rotating the slot vector left by `r`
//! is the automorphism τ_g(X) = X^g with g = 5^r mod 2N. Each distinct
//! element needs its own key-switching key; keys for power-of-two offsets
//! (both directions) are enough to reach every rotation.

use std::collections::BTreeSet;

use crate::error::{HeError, Result};

/// Generator of the rotation subgroup of (Z/2NZ)^*
const ROTATION_GENERATOR: usize = 5;

/// Galois element for a left rotation by `offset` slots.
pub fn rotation_element(offset: usize, slots: usize) -> usize {
    let two_n = 4 * slots;
    mod_pow(ROTATION_GENERATOR, offset % slots, two_n)
}

fn mod_pow(base: usize, mut exp: usize, modulus: usize) -> usize {
    let m = modulus as u128;
    let mut result: u128 = 1 % m;
    let mut b = base as u128 % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        b = b * b % m;
        exp >>= 1;
    }
    result as usize
}

/// Set of rotation keys held by a scheme, indexed by Galois element.
#[derive(Debug, Clone)]
pub struct RotationKeys {
    slots: usize,
    elements: BTreeSet<usize>,
}

impl RotationKeys {
    pub fn empty(slots: usize) -> Self {
        Self {
            slots,
            elements: BTreeSet::new(),
        }
    }

    /// Keys for left and right rotations by every power of two below `slots`
    pub fn power_of_two(slots: usize) -> Self {
        let mut keys = Self::empty(slots);
        let mut step = 1;
        while step < slots {
            keys.insert(step);
            keys.insert(slots - step);
            step <<= 1;
        }
        keys
    }

    /// Add the key for a left rotation by `offset`
    pub fn insert(&mut self, offset: usize) {
        let offset = offset % self.slots;
        if offset != 0 {
            self.elements.insert(rotation_element(offset, self.slots));
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.elements
            .contains(&rotation_element(offset % self.slots, self.slots))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Key-switching steps realising a left rotation by `offset`: the offset
    /// itself if keyed, otherwise its binary decomposition.
    pub fn decompose(&self, offset: usize) -> Result<Vec<usize>> {
        let offset = offset % self.slots;
        if offset == 0 {
            return Ok(Vec::new());
        }
        if self.contains(offset) {
            return Ok(vec![offset]);
        }

        let mut steps = Vec::new();
        let mut rest = offset;
        while rest != 0 {
            let step = 1 << rest.trailing_zeros();
            if !self.contains(step) {
                return Err(HeError::MissingRotationKey { offset: step });
            }
            steps.push(step);
            rest &= rest - 1;
        }
        Ok(steps)
    }
}
