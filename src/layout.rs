//! SIMD slot layout for the label-signed training matrix
//!
//! A ciphertext holds `slots = learn_dim · batch` values. Chunk `i` packs
//! feature columns `i·batch .. (i+1)·batch` for every sample: sample `j`,
//! in-block feature `l` lives at slot `j·batch + l`. The matrix is spread over
//! `cnum = ⌈factor_dim / batch⌉` chunks; rows past `sample_count` and columns
//! past `factor_dim` are zero.

use serde::{Deserialize, Serialize};

use crate::error::{config_err, Result};

/// Packing shape shared by data, weight and velocity chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLayout {
    slots: usize,
    factor_dim: usize,
    sample_count: usize,
    learn_dim: usize,
    batch: usize,
    cnum: usize,
}

impl SlotLayout {
    /// Layout for a fixed slot count. `learn_dim` becomes `slots / batch`.
    pub fn new(slots: usize, factor_dim: usize, sample_count: usize, batch: usize) -> Result<Self> {
        if !slots.is_power_of_two() {
            return Err(config_err!("slots {} must be a power of two", slots));
        }
        if !batch.is_power_of_two() {
            return Err(config_err!("batch {} must be a power of two", batch));
        }
        if batch > slots {
            return Err(config_err!("batch {} exceeds slot count {}", batch, slots));
        }
        if factor_dim == 0 || sample_count == 0 {
            return Err(config_err!(
                "empty training matrix ({} samples x {} features)",
                sample_count,
                factor_dim
            ));
        }

        let learn_dim = slots / batch;
        if sample_count > learn_dim {
            return Err(config_err!(
                "{} samples do not fit {} slots at batch {} (room for {})",
                sample_count,
                slots,
                batch,
                learn_dim
            ));
        }

        Ok(Self {
            slots,
            factor_dim,
            sample_count,
            learn_dim,
            batch,
            cnum: factor_dim.div_ceil(batch),
        })
    }

    /// Smallest layout for the given matrix: samples padded to a power of two.
    pub fn fit(factor_dim: usize, sample_count: usize, batch: usize) -> Result<Self> {
        let learn_dim = sample_count.max(1).next_power_of_two();
        let slots = learn_dim
            .checked_mul(batch)
            .ok_or_else(|| config_err!("slot count overflows for batch {}", batch))?;
        Self::new(slots, factor_dim, sample_count, batch)
    }

    /// Layout with an explicitly requested chunk count, checked against
    /// `cnum = ⌈factor_dim / batch⌉`.
    pub fn with_cnum(
        slots: usize,
        factor_dim: usize,
        sample_count: usize,
        batch: usize,
        cnum: usize,
    ) -> Result<Self> {
        let layout = Self::new(slots, factor_dim, sample_count, batch)?;
        if layout.cnum != cnum {
            return Err(config_err!(
                "cnum {} inconsistent with factor_dim {} and batch {} (expected {})",
                cnum,
                factor_dim,
                batch,
                layout.cnum
            ));
        }
        Ok(layout)
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn factor_dim(&self) -> usize {
        self.factor_dim
    }

    /// Number of real (unpadded) samples
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Padded sample count (power of two)
    pub fn learn_dim(&self) -> usize {
        self.learn_dim
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn cnum(&self) -> usize {
        self.cnum
    }

    /// log2(learn_dim): depth of the sample-axis rotate-and-sum tree
    pub fn s_bits(&self) -> u32 {
        self.learn_dim.trailing_zeros()
    }

    /// log2(batch): depth of the feature-axis rotate-and-sum tree
    pub fn b_bits(&self) -> u32 {
        self.batch.trailing_zeros()
    }

    /// Slot of (sample, in-block feature)
    #[inline]
    pub fn slot_index(&self, sample: usize, offset: usize) -> usize {
        sample * self.batch + offset
    }

    /// Global feature index stored at `offset` of chunk `chunk`, if any.
    #[inline]
    pub fn feature_at(&self, chunk: usize, offset: usize) -> Option<usize> {
        let idx = chunk * self.batch + offset;
        (offset < self.batch && idx < self.factor_dim).then_some(idx)
    }

    /// Feature width actually populated in `chunk` (the last chunk may be short).
    pub fn chunk_width(&self, chunk: usize) -> usize {
        self.factor_dim
            .saturating_sub(chunk * self.batch)
            .min(self.batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_pads_samples() {
        let layout = SlotLayout::fit(10, 5, 4).unwrap();
        assert_eq!(layout.learn_dim(), 8);
        assert_eq!(layout.slots(), 32);
        assert_eq!(layout.cnum(), 3);
        assert_eq!(layout.s_bits(), 3);
        assert_eq!(layout.b_bits(), 2);
        assert!(layout.factor_dim() <= layout.cnum() * layout.batch());
    }

    #[test]
    fn test_chunk_widths() {
        let layout = SlotLayout::fit(10, 5, 4).unwrap();
        assert_eq!(layout.chunk_width(0), 4);
        assert_eq!(layout.chunk_width(1), 4);
        assert_eq!(layout.chunk_width(2), 2);
        assert_eq!(layout.feature_at(2, 1), Some(9));
        assert_eq!(layout.feature_at(2, 2), None);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(SlotLayout::new(64, 4, 8, 6).is_err());
        assert!(SlotLayout::new(48, 4, 8, 8).is_err());
        assert!(SlotLayout::new(64, 4, 9, 8).is_err());
        assert!(SlotLayout::new(64, 0, 8, 8).is_err());
        assert!(SlotLayout::with_cnum(64, 4, 8, 8, 2).is_err());
        assert!(SlotLayout::with_cnum(64, 4, 8, 8, 1).is_ok());
    }

    #[test]
    fn test_slot_index_round_trip() {
        let layout = SlotLayout::new(64, 4, 8, 8).unwrap();
        assert_eq!(layout.slot_index(3, 2), 26);
        assert_eq!(layout.learn_dim(), 8);
        assert_eq!(layout.cnum(), 1);
    }
}
