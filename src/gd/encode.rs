//! Data encoder and weight decoder
//!
//! Packs the label-signed matrix and the weight vector into chunk arenas
//! under the [`SlotLayout`], and unpacks decrypted weight chunks back into a
//! plain vector.

use rayon::prelude::*;
use tracing::debug;

use crate::data::SignedMatrix;
use crate::error::{config_err, HeError, Result};
use crate::layout::SlotLayout;
use crate::params::{PrecisionPlan, VelocityInit};
use crate::scheme::{Leveled, Scheme};

use super::arena::ChunkArena;
use super::sample_strides;

/// Encrypted weight and velocity chunks of one run.
#[derive(Debug, Clone)]
pub struct WeightState<C> {
    pub weights: ChunkArena<C>,
    pub velocity: ChunkArena<C>,
}

impl<C: Leveled> WeightState<C> {
    /// Level of the weight chunks (the velocity never sits below it)
    pub fn level(&self) -> usize {
        self.weights.level()
    }
}

fn check_scheme_layout<S: Scheme>(scheme: &S, layout: &SlotLayout) -> Result<()> {
    if scheme.slots() != layout.slots() {
        return Err(config_err!(
            "scheme has {} slots, layout needs {}",
            scheme.slots(),
            layout.slots()
        ));
    }
    Ok(())
}

/// Plain slot vector of chunk `chunk`: `value(j, feature)` at slot `j·batch + l`.
fn chunk_slots<F>(layout: &SlotLayout, chunk: usize, rows: usize, value: F) -> Vec<f64>
where
    F: Fn(usize, usize) -> f64,
{
    let mut slots = vec![0.0; layout.slots()];
    for j in 0..rows {
        for l in 0..layout.chunk_width(chunk) {
            let feature = chunk * layout.batch() + l;
            slots[layout.slot_index(j, l)] = value(j, feature);
        }
    }
    slots
}

/// Encrypt the label-signed matrix into `cnum` data chunks at `w_bits`.
///
/// Rows past the matrix's sample count stay zero; they add nothing to any
/// inner product or gradient.
pub fn encrypt_data<S: Scheme>(
    scheme: &S,
    matrix: &SignedMatrix,
    layout: &SlotLayout,
    plan: &PrecisionPlan,
) -> Result<ChunkArena<S::Ciphertext>> {
    check_scheme_layout(scheme, layout)?;
    plan.check_layout(layout)?;
    if matrix.factor_dim() != layout.factor_dim() {
        return Err(config_err!(
            "matrix has {} features, layout expects {}",
            matrix.factor_dim(),
            layout.factor_dim()
        ));
    }
    if matrix.sample_count() != layout.sample_count() {
        return Err(config_err!(
            "matrix has {} samples, layout expects {}",
            matrix.sample_count(),
            layout.sample_count()
        ));
    }

    let chunks = (0..layout.cnum())
        .into_par_iter()
        .map(|i| {
            let slots = chunk_slots(layout, i, matrix.sample_count(), |j, f| matrix.get(j, f));
            scheme.encrypt(&slots, plan.w_bits)
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        cnum = layout.cnum(),
        slots = layout.slots(),
        "encrypted training matrix"
    );
    ChunkArena::new(chunks)
}

/// Encrypt `initial` broadcast into every sample group, at the data's level
/// and scale. The velocity is zero or a copy of the weights.
pub fn encrypt_weights<S: Scheme>(
    scheme: &S,
    layout: &SlotLayout,
    data: &ChunkArena<S::Ciphertext>,
    initial: &[f64],
    velocity: VelocityInit,
) -> Result<WeightState<S::Ciphertext>> {
    check_scheme_layout(scheme, layout)?;
    if initial.len() != layout.factor_dim() {
        return Err(config_err!(
            "initial weights have length {}, expected {}",
            initial.len(),
            layout.factor_dim()
        ));
    }
    if data.len() != layout.cnum() {
        return Err(config_err!(
            "{} data chunks, layout has cnum {}",
            data.len(),
            layout.cnum()
        ));
    }
    let scale = data
        .common_scale()
        .ok_or_else(|| config_err!("data chunks disagree on scale"))?;
    let level = data.level();

    let encrypt_broadcast = |values: &dyn Fn(usize) -> f64| -> Result<ChunkArena<S::Ciphertext>> {
        let chunks = (0..layout.cnum())
            .map(|i| {
                let slots = chunk_slots(layout, i, layout.learn_dim(), |_, f| values(f));
                let ct = scheme.encrypt(&slots, scale)?;
                scheme.level_down(&ct, level)
            })
            .collect::<Result<Vec<_>>>()?;
        ChunkArena::new(chunks)
    };

    let weights = encrypt_broadcast(&|f| initial[f])?;
    let velocity = match velocity {
        VelocityInit::Zero => encrypt_broadcast(&|_| 0.0)?,
        VelocityInit::Weights => weights.clone(),
    };
    Ok(WeightState { weights, velocity })
}

/// Initialise the weights to the per-feature mean of the label-signed samples,
/// entirely under encryption: rotate-and-sum over the sample axis, then a
/// `1/sample_count` constant product (one level). Velocity starts equal to
/// the weights.
pub fn encrypt_weights_from_data<S: Scheme>(
    scheme: &S,
    layout: &SlotLayout,
    plan: &PrecisionPlan,
    data: &ChunkArena<S::Ciphertext>,
) -> Result<WeightState<S::Ciphertext>> {
    check_scheme_layout(scheme, layout)?;
    plan.check_layout(layout)?;
    let inv = 1.0 / layout.sample_count() as f64;

    let chunks = data
        .as_slice()
        .par_iter()
        .map(|chunk| {
            let summed = scheme.rotate_sum(chunk, sample_strides(layout))?;
            scheme.multiply_const_rescale(&summed, inv, plan.a_bits)
        })
        .collect::<Result<Vec<_>>>()?;

    let weights = ChunkArena::new(chunks)?;
    Ok(WeightState {
        velocity: weights.clone(),
        weights,
    })
}

/// Decrypt the weight chunks and read sample 0's group of each chunk.
pub fn decrypt_weights<S: Scheme>(
    scheme: &S,
    layout: &SlotLayout,
    plan: &PrecisionPlan,
    weights: &ChunkArena<S::Ciphertext>,
) -> Result<Vec<f64>> {
    if weights.len() != layout.cnum() {
        return Err(config_err!(
            "{} weight chunks, layout has cnum {}",
            weights.len(),
            layout.cnum()
        ));
    }

    let mut out = Vec::with_capacity(layout.factor_dim());
    for (i, chunk) in weights.iter().enumerate() {
        if chunk.scale_bits() != plan.w_bits {
            return Err(HeError::ScaleMismatch {
                left: chunk.scale_bits(),
                right: plan.w_bits,
            });
        }
        let slots = scheme.decrypt(chunk);
        out.extend_from_slice(&slots[..layout.chunk_width(i)]);
    }
    Ok(out)
}
