//! Plaintext reference gradient descent
//!
//! The same three update rules as the encrypted engine, on `f64` vectors.
//! The gradient is the learning-rate-scaled *sum* over samples (no
//! averaging, no regularisation), exactly what the encrypted pipeline
//! computes, so a run here is the ground truth an encrypted run is checked
//! against.

use crate::data::SignedMatrix;
use crate::math::approx::{logistic_gradient, ApproxDegree};

/// Activation-gradient used by the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// `-1/(1+e^t)`
    Exact,
    /// The polynomial the encrypted pipeline evaluates
    Poly(ApproxDegree),
}

impl Activation {
    pub fn eval(&self, t: f64) -> f64 {
        match self {
            Activation::Exact => logistic_gradient(t),
            Activation::Poly(degree) => degree.eval(t),
        }
    }
}

/// `γ·Σ_j act(⟨z_j, w⟩)·z_j`
pub fn gradient(matrix: &SignedMatrix, w: &[f64], gamma: f64, act: Activation) -> Vec<f64> {
    let mut grad = vec![0.0; matrix.factor_dim()];
    for (j, row) in matrix.rows().iter().enumerate() {
        let coeff = gamma * act.eval(matrix.margin(w, j));
        for (g, z) in grad.iter_mut().zip(row) {
            *g += coeff * z;
        }
    }
    grad
}

/// `w ← w − grad`
pub fn lgd_step(matrix: &SignedMatrix, w: &[f64], gamma: f64, act: Activation) -> Vec<f64> {
    let grad = gradient(matrix, w, gamma, act);
    w.iter().zip(&grad).map(|(w, g)| w - g).collect()
}

/// `v ← η·v + grad; w ← w − v`. Returns `(w, v)`.
pub fn mlgd_step(
    matrix: &SignedMatrix,
    w: &[f64],
    v: &[f64],
    gamma: f64,
    eta: f64,
    act: Activation,
) -> (Vec<f64>, Vec<f64>) {
    let grad = gradient(matrix, w, gamma, act);
    let v: Vec<f64> = v.iter().zip(&grad).map(|(v, g)| eta * v + g).collect();
    let w = w.iter().zip(&v).map(|(w, v)| w - v).collect();
    (w, v)
}

/// `tmp ← w − grad; w ← (1−η)·tmp + η·v; v ← tmp`. Returns `(w, v)`.
pub fn nlgd_step(
    matrix: &SignedMatrix,
    w: &[f64],
    v: &[f64],
    gamma: f64,
    eta: f64,
    act: Activation,
) -> (Vec<f64>, Vec<f64>) {
    let tmp = lgd_step(matrix, w, gamma, act);
    let w = tmp
        .iter()
        .zip(v)
        .map(|(t, v)| (1.0 - eta) * t + eta * v)
        .collect();
    (w, tmp)
}

/// Per-feature mean of the label-signed samples
pub fn mean_weights(matrix: &SignedMatrix) -> Vec<f64> {
    let n = matrix.sample_count() as f64;
    (0..matrix.factor_dim())
        .map(|f| matrix.rows().iter().map(|r| r[f]).sum::<f64>() / n)
        .collect()
}

/// Fraction of samples with a positive margin
pub fn accuracy(matrix: &SignedMatrix, w: &[f64]) -> f64 {
    let correct = (0..matrix.sample_count())
        .filter(|&j| matrix.margin(w, j) > 0.0)
        .count();
    correct as f64 / matrix.sample_count() as f64
}

/// Component-wise mean of several weight vectors. Empty input gives an empty vector.
pub fn average_weights(models: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = models.first() else {
        return Vec::new();
    };
    let mut avg = vec![0.0; first.len()];
    for w in models {
        for (a, x) in avg.iter_mut().zip(w) {
            *a += x;
        }
    }
    let n = models.len() as f64;
    avg.iter_mut().for_each(|a| *a /= n);
    avg
}
