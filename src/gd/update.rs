//! Weight-update rules
//!
//! Each rule maps `(weights, velocity, grad)` to fresh arenas; nothing is
//! written in place. Gradient and velocity are first brought to `w_bits`
//! (rescaling down if they sit above it), and operands are level-aligned
//! before every combine.

use rayon::prelude::*;

use crate::error::{HeError, Result};
use crate::params::PrecisionPlan;
use crate::scheme::{Leveled, Scheme};

use super::arena::ChunkArena;
use super::encode::WeightState;

/// Bring `ct` to scale `w_bits`. A scale below `w_bits` cannot be repaired.
fn reconcile<S: Scheme>(scheme: &S, plan: &PrecisionPlan, ct: &S::Ciphertext) -> Result<S::Ciphertext> {
    match ct.scale_bits().cmp(&plan.w_bits) {
        std::cmp::Ordering::Equal => Ok(ct.clone()),
        std::cmp::Ordering::Greater => scheme.rescale_to(ct, plan.w_bits),
        std::cmp::Ordering::Less => Err(HeError::ScaleMismatch {
            left: ct.scale_bits(),
            right: plan.w_bits,
        }),
    }
}

fn check_weights<C: Leveled>(plan: &PrecisionPlan, weights: &ChunkArena<C>) -> Result<()> {
    match weights.common_scale() {
        Some(bits) if bits == plan.w_bits => Ok(()),
        Some(bits) => Err(HeError::ScaleMismatch {
            left: bits,
            right: plan.w_bits,
        }),
        None => Err(HeError::config("weight chunks disagree on scale")),
    }
}

/// `a − b` after level alignment
fn aligned_sub<S: Scheme>(scheme: &S, a: &S::Ciphertext, b: &S::Ciphertext) -> Result<S::Ciphertext> {
    let (a, b) = scheme.align_levels(a, b)?;
    scheme.sub(&a, &b)
}

/// `a + b` after level alignment
fn aligned_add<S: Scheme>(scheme: &S, a: &S::Ciphertext, b: &S::Ciphertext) -> Result<S::Ciphertext> {
    let (a, b) = scheme.align_levels(a, b)?;
    scheme.add(&a, &b)
}

/// Plain step: `w ← w − grad`.
pub fn lgd_step<S: Scheme>(
    scheme: &S,
    plan: &PrecisionPlan,
    weights: &ChunkArena<S::Ciphertext>,
    grad: &ChunkArena<S::Ciphertext>,
) -> Result<ChunkArena<S::Ciphertext>> {
    weights.check_same_shape(grad)?;
    check_weights(plan, weights)?;

    let chunks = weights
        .as_slice()
        .par_iter()
        .zip(grad.as_slice().par_iter())
        .map(|(w, g)| {
            let g = reconcile(scheme, plan, g)?;
            aligned_sub(scheme, w, &g)
        })
        .collect::<Result<Vec<_>>>()?;
    ChunkArena::new(chunks)
}

/// Momentum step: `v ← η·v + grad; w ← w − v`.
///
/// The `η` product is rescaled straight back to `w_bits`, so it costs one
/// level on the velocity but none on the weights.
pub fn mlgd_step<S: Scheme>(
    scheme: &S,
    plan: &PrecisionPlan,
    weights: &ChunkArena<S::Ciphertext>,
    velocity: &ChunkArena<S::Ciphertext>,
    grad: &ChunkArena<S::Ciphertext>,
    eta: f64,
) -> Result<WeightState<S::Ciphertext>> {
    weights.check_same_shape(grad)?;
    weights.check_same_shape(velocity)?;
    check_weights(plan, weights)?;

    let pairs = weights
        .as_slice()
        .par_iter()
        .zip(velocity.as_slice().par_iter())
        .zip(grad.as_slice().par_iter())
        .map(|((w, v), g)| {
            let g = reconcile(scheme, plan, g)?;
            let v = reconcile(scheme, plan, v)?;
            let damped = scheme.multiply_const_rescale(&v, eta, plan.w_bits)?;
            let v_next = aligned_add(scheme, &damped, &g)?;
            let w_next = aligned_sub(scheme, w, &v_next)?;
            Ok((w_next, v_next))
        })
        .collect::<Result<Vec<_>>>()?;

    let (w, v): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
    Ok(WeightState {
        weights: ChunkArena::new(w)?,
        velocity: ChunkArena::new(v)?,
    })
}

/// Nesterov step: `tmp ← w − grad; w ← (1−η)·tmp + η·v; v ← tmp`.
///
/// The mixing constants are encoded at `p_bits` and cost one level.
pub fn nlgd_step<S: Scheme>(
    scheme: &S,
    plan: &PrecisionPlan,
    weights: &ChunkArena<S::Ciphertext>,
    velocity: &ChunkArena<S::Ciphertext>,
    grad: &ChunkArena<S::Ciphertext>,
    eta: f64,
) -> Result<WeightState<S::Ciphertext>> {
    weights.check_same_shape(grad)?;
    weights.check_same_shape(velocity)?;
    check_weights(plan, weights)?;

    let pairs = weights
        .as_slice()
        .par_iter()
        .zip(velocity.as_slice().par_iter())
        .zip(grad.as_slice().par_iter())
        .map(|((w, v), g)| {
            let g = reconcile(scheme, plan, g)?;
            let v = reconcile(scheme, plan, v)?;
            let tmp = aligned_sub(scheme, w, &g)?;
            let (tmp_a, v_a) = scheme.align_levels(&tmp, &v)?;
            let keep = scheme.multiply_const_rescale(&tmp_a, 1.0 - eta, plan.p_bits)?;
            let mix = scheme.multiply_const_rescale(&v_a, eta, plan.p_bits)?;
            let w_next = scheme.add(&keep, &mix)?;
            let v_next = scheme.level_down(&tmp, w_next.level())?;
            Ok((w_next, v_next))
        })
        .collect::<Result<Vec<_>>>()?;

    let (w, v): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
    Ok(WeightState {
        weights: ChunkArena::new(w)?,
        velocity: ChunkArena::new(v)?,
    })
}
