//! Homomorphic inner product
//!
//! Computes `⟨z_j, w⟩` for every sample `j`, broadcast across the sample's
//! slot group.
//!
//! # Algorithm
//! 1. Per chunk (in parallel): `z_i ⊙ w_i`, rescale by `w_bits`.
//! 2. Per chunk: left rotate-and-sum with strides 1, 2, …, batch/2, leaving
//!    the chunk's partial dot product in slot `j·batch`.
//! 3. Barrier: add the `cnum` partial sums.
//! 4. Multiply by the auxiliary mask, rescale by `p_bits`.
//! 5. Right rotate-and-sum with the same strides to broadcast slot `j·batch`
//!    over the group.
//!
//! The result sits at scale `w_bits`, [`DEPTH`] levels below the weights.

use rayon::prelude::*;

use crate::error::{config_err, Result};
use crate::layout::SlotLayout;
use crate::params::PrecisionPlan;
use crate::scheme::Scheme;

use super::arena::ChunkArena;
use super::mask::AuxMask;
use super::{broadcast_strides, feature_strides};

/// Levels consumed: the data-weight product and the mask product.
pub const DEPTH: usize = 2;

/// Encrypted per-sample dot products.
///
/// Fails with `DepthExhausted` (from the scheme) if the weights cannot afford
/// [`DEPTH`] rescales.
pub fn inner_product<S: Scheme>(
    scheme: &S,
    layout: &SlotLayout,
    plan: &PrecisionPlan,
    data: &ChunkArena<S::Ciphertext>,
    weights: &ChunkArena<S::Ciphertext>,
    mask: &AuxMask<S::Plaintext>,
) -> Result<S::Ciphertext> {
    if data.len() != layout.cnum() {
        return Err(config_err!(
            "{} data chunks, layout has cnum {}",
            data.len(),
            layout.cnum()
        ));
    }
    data.check_same_shape(weights)?;
    mask.check(layout, plan)?;

    let partials = data
        .as_slice()
        .par_iter()
        .zip(weights.as_slice().par_iter())
        .map(|(z, w)| {
            let prod = scheme.multiply_rescale(z, w, plan.w_bits)?;
            scheme.rotate_sum(&prod, feature_strides(layout))
        })
        .collect::<Result<Vec<_>>>()?;

    let (first, rest) = partials
        .split_first()
        .ok_or_else(|| config_err!("no chunks to fold"))?;
    let folded = rest
        .iter()
        .try_fold(first.clone(), |acc, p| scheme.add(&acc, p))?;

    let masked = scheme.multiply_plain(&folded, mask.plaintext())?;
    let masked = scheme.rescale_by(&masked, mask.p_bits())?;
    scheme.rotate_sum(&masked, broadcast_strides(layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SignedMatrix;
    use crate::gd::encode::{encrypt_data, encrypt_weights};
    use crate::gd::mask::generate_aux_mask;
    use crate::params::{SchemeParams, VelocityInit};
    use crate::scheme::{Leveled, SimScheme};

    fn check_inner_product(factor_dim: usize, samples: usize, batch: usize) {
        let layout = SlotLayout::fit(factor_dim, samples, batch).unwrap();
        let scheme = SimScheme::new(SchemeParams::for_layout(&layout, 6).with_seed(3)).unwrap();
        let plan = PrecisionPlan::for_layout(&layout);

        let rows: Vec<Vec<f64>> = (0..samples)
            .map(|j| {
                (0..factor_dim)
                    .map(|i| if (i + 2 * j) % 3 == 0 { -1.0 } else { ((i * j) % 4) as f64 * 0.5 })
                    .collect()
            })
            .collect();
        let m = SignedMatrix::from_rows(rows).unwrap();
        let w: Vec<f64> = (0..factor_dim).map(|i| 0.3 - 0.07 * i as f64).collect();

        let data = encrypt_data(&scheme, &m, &layout, &plan).unwrap();
        let state = encrypt_weights(&scheme, &layout, &data, &w, VelocityInit::Zero).unwrap();
        let mask = generate_aux_mask(&scheme, &layout, &plan).unwrap();

        let ip = inner_product(&scheme, &layout, &plan, &data, &state.weights, &mask).unwrap();
        assert_eq!(ip.level(), 6 - DEPTH);
        assert_eq!(ip.scale_bits(), plan.w_bits);

        let out = scheme.decrypt(&ip);
        for j in 0..layout.learn_dim() {
            let expected = if j < samples { m.margin(&w, j) } else { 0.0 };
            for l in 0..batch {
                let got = out[layout.slot_index(j, l)];
                assert!(
                    (got - expected).abs() < 1e-6,
                    "sample {} slot {}: {} vs {}",
                    j,
                    l,
                    got,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_single_chunk() {
        check_inner_product(4, 8, 8);
    }

    #[test]
    fn test_multiple_chunks_with_padding() {
        check_inner_product(10, 5, 4);
        check_inner_product(9, 3, 2);
    }

    #[test]
    fn test_batch_of_one() {
        check_inner_product(3, 4, 1);
    }

    #[test]
    fn test_depth_exhaustion_propagates() {
        let layout = SlotLayout::fit(4, 4, 4).unwrap();
        let scheme = SimScheme::new(SchemeParams::for_layout(&layout, 1)).unwrap();
        let plan = PrecisionPlan::for_layout(&layout);
        let m = SignedMatrix::from_rows(vec![vec![1.0; 4]; 4]).unwrap();

        let data = encrypt_data(&scheme, &m, &layout, &plan).unwrap();
        let state = encrypt_weights(&scheme, &layout, &data, &[0.1; 4], VelocityInit::Zero).unwrap();
        let mask = generate_aux_mask(&scheme, &layout, &plan).unwrap();

        let err = inner_product(&scheme, &layout, &plan, &data, &state.weights, &mask).unwrap_err();
        assert!(err.is_depth_exhausted());
    }
}
