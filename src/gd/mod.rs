//! Encrypted gradient descent
//!
//! One iteration runs inner product → gradient → update over the chunk
//! arenas produced by [`encode`]. Components receive the immutable
//! [`PrecisionPlan`](crate::params::PrecisionPlan) by reference; only the
//! [`trainer`] knows about the iteration budget.

pub mod arena;
pub mod encode;
pub mod gradient;
pub mod inner_product;
pub mod mask;
pub mod trainer;
pub mod update;

pub use arena::ChunkArena;
pub use encode::{
    decrypt_weights, encrypt_data, encrypt_weights, encrypt_weights_from_data, WeightState,
};
pub use gradient::sigmoid_gradient;
pub use inner_product::inner_product;
pub use mask::{generate_aux_mask, AuxMask};
pub use trainer::{
    lgd_iteration, mlgd_iteration, nlgd_iteration, DepthBudget, Trainer, TrainingContext,
};
pub use update::{lgd_step, mlgd_step, nlgd_step};

use crate::layout::SlotLayout;

/// Left strides 1, 2, …, batch/2: folds a sample's feature block into slot `j·batch`.
pub(crate) fn feature_strides(layout: &SlotLayout) -> impl Iterator<Item = isize> {
    (0..layout.b_bits()).map(|k| 1isize << k)
}

/// Right strides mirroring [`feature_strides`]: spreads slot `j·batch` over its group.
pub(crate) fn broadcast_strides(layout: &SlotLayout) -> impl Iterator<Item = isize> {
    (0..layout.b_bits()).map(|k| -(1isize << k))
}

/// Strides batch, 2·batch, …, slots/2: sums every sample group into each group.
pub(crate) fn sample_strides(layout: &SlotLayout) -> impl Iterator<Item = isize> {
    let batch = layout.batch() as isize;
    (0..layout.s_bits()).map(move |k| batch << k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides() {
        let layout = SlotLayout::fit(10, 5, 4).unwrap();
        assert_eq!(feature_strides(&layout).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(broadcast_strides(&layout).collect::<Vec<_>>(), vec![-1, -2]);
        assert_eq!(sample_strides(&layout).collect::<Vec<_>>(), vec![4, 8, 16]);

        let single = SlotLayout::fit(3, 4, 1).unwrap();
        assert_eq!(feature_strides(&single).count(), 0);
    }
}
