//! Encrypted logistic-loss gradient
//!
//! With `t_j = ⟨z_j, w⟩` and the odd approximation
//! `σ'(t) ≈ c0 + t·(c1 + c3·t² + c5·t⁴ + …)`, the learning-rate-scaled
//! gradient chunk is
//!
//! ```text
//! grad_i = Σ_j γ·σ'(t_j)·z_j,i
//!        = Σ_j (z_j,i·t_j)·q(t_j²) + γ·c0·z_j,i,   q = γ·(c1 + c3·t² + …)
//! ```
//!
//! The even powers of `t` are built once and shared by every chunk; the
//! per-chunk products and the sample-axis rotate-and-sum run in parallel.

use rayon::prelude::*;

use crate::error::{config_err, Result};
use crate::layout::SlotLayout;
use crate::math::approx::ApproxDegree;
use crate::params::PrecisionPlan;
use crate::scheme::{Leveled, Scheme};

use super::arena::ChunkArena;
use super::sample_strides;

/// `t², t⁴, …, t^(degree-1)`, each one level below the previous.
fn even_powers<S: Scheme>(
    scheme: &S,
    plan: &PrecisionPlan,
    degree: ApproxDegree,
    ip: &S::Ciphertext,
) -> Result<Vec<S::Ciphertext>> {
    let square = scheme.multiply_rescale(ip, ip, plan.w_bits)?;
    let mut powers = Vec::with_capacity(degree.even_powers());
    powers.push(square);
    for k in 1..degree.even_powers() {
        let next = scheme.multiply_rescale(&powers[k - 1], &powers[0], plan.w_bits)?;
        powers.push(next);
    }
    Ok(powers)
}

/// `γ·(c1 + c3·t² + c5·t⁴ + …)`, one level below the highest even power.
///
/// `terms[k]` is `(γ·c_{2k+3}, bits)`: each constant is encoded at its own
/// scale so small high-order coefficients keep full precision.
fn odd_factor<S: Scheme>(
    scheme: &S,
    powers: &[S::Ciphertext],
    terms: &[(f64, u32)],
    linear: f64,
) -> Result<S::Ciphertext> {
    let level = powers
        .last()
        .map(Leveled::level)
        .ok_or_else(|| config_err!("approximation has no even powers"))?;

    let mut acc: Option<S::Ciphertext> = None;
    for (power, &(c, bits)) in powers.iter().zip(terms) {
        let aligned = scheme.level_down(power, level)?;
        let term = scheme.multiply_const_rescale(&aligned, c, bits)?;
        acc = Some(match acc {
            Some(sum) => scheme.add(&sum, &term)?,
            None => term,
        });
    }
    let acc = acc.ok_or_else(|| config_err!("empty coefficient table"))?;
    scheme.add_const(&acc, linear)
}

/// `(γ·c_k, constant_bits(γ·c_k))` for the constant term and each even power.
fn scaled_terms(
    plan: &PrecisionPlan,
    degree: ApproxDegree,
    gamma: f64,
) -> Result<((f64, u32), Vec<(f64, u32)>)> {
    let coeffs = degree.coefficients();
    let scaled = |c: f64| -> Result<(f64, u32)> {
        let c = gamma * c;
        Ok((c, plan.constant_bits(c)?))
    };
    let constant = scaled(coeffs[0])?;
    let terms = coeffs[2..]
        .iter()
        .map(|&c| scaled(c))
        .collect::<Result<Vec<_>>>()?;
    Ok((constant, terms))
}

/// Gradient chunks of the current weights, already multiplied by `gamma`.
///
/// Each returned chunk carries the summed gradient of its feature block,
/// replicated into every sample group, at scale `w_bits` and
/// `degree.gradient_depth()` levels below `ip`.
pub fn sigmoid_gradient<S: Scheme>(
    scheme: &S,
    layout: &SlotLayout,
    plan: &PrecisionPlan,
    degree: ApproxDegree,
    data: &ChunkArena<S::Ciphertext>,
    ip: &S::Ciphertext,
    gamma: f64,
) -> Result<ChunkArena<S::Ciphertext>> {
    if data.len() != layout.cnum() {
        return Err(config_err!(
            "{} data chunks, layout has cnum {}",
            data.len(),
            layout.cnum()
        ));
    }
    if ip.scale_bits() != plan.w_bits {
        return Err(config_err!(
            "inner product at scale 2^{}, expected 2^{}",
            ip.scale_bits(),
            plan.w_bits
        ));
    }

    let ((c0, c0_bits), terms) = scaled_terms(plan, degree, gamma)?;
    let powers = even_powers(scheme, plan, degree, ip)?;
    let q = odd_factor(scheme, &powers, &terms, gamma * degree.coefficients()[1])?;

    let chunks = data
        .as_slice()
        .par_iter()
        .map(|z| {
            let zt = scheme.multiply_rescale(z, ip, plan.w_bits)?;
            let odd = scheme.multiply_rescale(&zt, &q, plan.w_bits)?;
            let z_low = scheme.level_down(z, odd.level() + 1)?;
            let constant = scheme.multiply_const_rescale(&z_low, c0, c0_bits)?;
            let g = scheme.add(&odd, &constant)?;
            scheme.rotate_sum(&g, sample_strides(layout))
        })
        .collect::<Result<Vec<_>>>()?;

    ChunkArena::new(chunks)
}
