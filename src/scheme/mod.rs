//! Primitive layer: the leveled approximate-arithmetic scheme contract
//!
//! The training engine never touches ciphertext internals. It only needs the
//! operations below, each with a fixed effect on level and scale:
//!
//! | operation        | level        | scale                      |
//! |------------------|--------------|----------------------------|
//! | `encrypt`        | top level    | requested                  |
//! | `add` / `sub`    | unchanged    | unchanged (must be equal)  |
//! | `add_const`      | unchanged    | unchanged                  |
//! | `multiply`       | unchanged    | sum of operand scales      |
//! | `multiply_plain` | unchanged    | sum of operand scales      |
//! | `multiply_const` | unchanged    | + constant's bits          |
//! | `rotate`         | unchanged    | unchanged                  |
//! | `rescale_by`     | −1           | − bits                     |
//! | `level_down`     | lowered      | unchanged                  |
//!
//! A product's level is paid at the rescale that follows it; requesting a
//! rescale at level 0 fails with `DepthExhausted`.
//!
//! [`SimScheme`] is the bundled backend: a transparent simulator of the same
//! contract with CKKS-style fixed-point rounding and injected Gaussian noise.
//! A lattice backend plugs in by implementing [`Scheme`].

mod galois;
mod sim;
mod types;

pub use galois::{rotation_element, RotationKeys};
pub use sim::SimScheme;
pub use types::{SimCiphertext, SimPlaintext};

use crate::error::{HeError, Result};

/// Level and scale bookkeeping every ciphertext exposes.
pub trait Leveled {
    /// Remaining rescales
    fn level(&self) -> usize;
    /// Fixed-point precision in bits
    fn scale_bits(&self) -> u32;
}

/// Leveled homomorphic scheme over packed slots.
///
/// Implementations must be shareable across worker threads; the engine calls
/// into them concurrently for independent chunks.
pub trait Scheme: Sync {
    type Ciphertext: Leveled + Clone + Send + Sync;
    type Plaintext: Send + Sync;

    /// Slots per ciphertext
    fn slots(&self) -> usize;

    /// Level of a fresh encryption
    fn top_level(&self) -> usize;

    /// Encrypt up to `slots` values (zero padded) at `scale_bits`
    fn encrypt(&self, values: &[f64], scale_bits: u32) -> Result<Self::Ciphertext>;

    /// Decrypt all slots
    fn decrypt(&self, ct: &Self::Ciphertext) -> Vec<f64>;

    /// Encode up to `slots` values as a plaintext at `scale_bits`
    fn encode(&self, values: &[f64], scale_bits: u32) -> Result<Self::Plaintext>;

    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Add `c` to every slot
    fn add_const(&self, a: &Self::Ciphertext, c: f64) -> Result<Self::Ciphertext>;

    /// Ciphertext-ciphertext product; operands must share a level
    fn multiply(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Slot-wise product with an encoded plaintext
    fn multiply_plain(&self, a: &Self::Ciphertext, p: &Self::Plaintext) -> Result<Self::Ciphertext>;

    /// Product with the constant `c` encoded at `scale_bits`
    fn multiply_const(&self, a: &Self::Ciphertext, c: f64, scale_bits: u32) -> Result<Self::Ciphertext>;

    /// Cyclic slot rotation; positive offsets rotate left (slot `i` receives slot `i + offset`)
    fn rotate(&self, a: &Self::Ciphertext, offset: isize) -> Result<Self::Ciphertext>;

    /// Divide by 2^bits with rounding, consuming one level
    fn rescale_by(&self, a: &Self::Ciphertext, bits: u32) -> Result<Self::Ciphertext>;

    /// Drop to a lower level without touching the scale
    fn level_down(&self, a: &Self::Ciphertext, level: usize) -> Result<Self::Ciphertext>;

    /// Rescale down to `target_bits`
    fn rescale_to(&self, a: &Self::Ciphertext, target_bits: u32) -> Result<Self::Ciphertext> {
        if target_bits > a.scale_bits() {
            return Err(HeError::ScaleMismatch {
                left: a.scale_bits(),
                right: target_bits,
            });
        }
        self.rescale_by(a, a.scale_bits() - target_bits)
    }

    /// Bring both operands to the lower of their two levels.
    fn align_levels(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> Result<(Self::Ciphertext, Self::Ciphertext)> {
        let level = a.level().min(b.level());
        Ok((self.level_down(a, level)?, self.level_down(b, level)?))
    }

    /// Level-aligned product followed by a rescale of `bits`
    fn multiply_rescale(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
        bits: u32,
    ) -> Result<Self::Ciphertext> {
        let (a, b) = self.align_levels(a, b)?;
        let product = self.multiply(&a, &b)?;
        self.rescale_by(&product, bits)
    }

    /// Constant product at `bits` precision, rescaled back to the input scale
    fn multiply_const_rescale(
        &self,
        a: &Self::Ciphertext,
        c: f64,
        bits: u32,
    ) -> Result<Self::Ciphertext> {
        let product = self.multiply_const(a, c, bits)?;
        self.rescale_by(&product, bits)
    }

    /// `ct += rotate(ct, s)` for every stride `s`, in order
    fn rotate_sum<I>(&self, ct: &Self::Ciphertext, strides: I) -> Result<Self::Ciphertext>
    where
        I: IntoIterator<Item = isize>,
    {
        let mut acc = ct.clone();
        for stride in strides {
            let rotated = self.rotate(&acc, stride)?;
            acc = self.add(&acc, &rotated)?;
        }
        Ok(acc)
    }
}
