//! Odd polynomial approximations of the logistic-loss gradient
//!
//! The encrypted pipeline cannot evaluate `-1/(1+e^t)`; it evaluates a
//! least-squares fit over `|t| ≤ 8` instead:
//!
//! ```text
//! degree 3: -0.5 + 0.15012·t   - 0.001593·t^3
//! degree 5: -0.5 + 0.19131·t   - 0.0045963·t^3  + 0.0000412332·t^5
//! degree 7: -0.5 + 0.216884·t  - 0.00819276·t^3 + 0.000165861·t^5 - 0.00000119581·t^7
//! ```
//!
//! Outside the rated range the fit degrades silently (the cubic term takes
//! over); that is an accuracy contract, not an error.

use serde::{Deserialize, Serialize};

use crate::error::{HeError, Result};

pub const DEGREE3: [f64; 3] = [-0.5, 0.15012, -0.001593];
pub const DEGREE5: [f64; 4] = [-0.5, 0.19131, -0.0045963, 0.0000412332];
pub const DEGREE7: [f64; 5] = [-0.5, 0.216884, -0.00819276, 0.000165861, -0.00000119581];

/// Margin range |t| ≤ RATED_RANGE over which the fits were calibrated
pub const RATED_RANGE: f64 = 8.0;

/// Degree of the gradient approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum ApproxDegree {
    Three,
    Five,
    Seven,
}

impl ApproxDegree {
    pub const ALL: [ApproxDegree; 3] = [ApproxDegree::Three, ApproxDegree::Five, ApproxDegree::Seven];

    pub fn degree(&self) -> usize {
        match self {
            ApproxDegree::Three => 3,
            ApproxDegree::Five => 5,
            ApproxDegree::Seven => 7,
        }
    }

    /// `[c0, c1, c3, c5, ...]`: the constant term followed by the odd coefficients
    pub fn coefficients(&self) -> &'static [f64] {
        match self {
            ApproxDegree::Three => &DEGREE3,
            ApproxDegree::Five => &DEGREE5,
            ApproxDegree::Seven => &DEGREE7,
        }
    }

    /// Number of even powers t², t⁴, … the evaluator precomputes
    pub fn even_powers(&self) -> usize {
        (self.degree() - 1) / 2
    }

    /// Levels the encrypted gradient evaluation consumes after the inner product:
    /// one per even power, one for the coefficient products, one for the
    /// product with `z·t`.
    pub fn gradient_depth(&self) -> usize {
        self.even_powers() + 2
    }

    /// Maximum absolute error against `-1/(1+e^t)` over `|t| ≤ RATED_RANGE`.
    pub fn max_error(&self) -> f64 {
        match self {
            ApproxDegree::Three => 0.115,
            ApproxDegree::Five => 0.048,
            ApproxDegree::Seven => 0.033,
        }
    }

    /// Plain evaluation of the approximation at `t`
    pub fn eval(&self, t: f64) -> f64 {
        let coeffs = self.coefficients();
        let t2 = t * t;
        // Horner over t² on the odd part, then the constant.
        let odd = coeffs[1..].iter().rev().fold(0.0, |acc, c| acc * t2 + c);
        coeffs[0] + t * odd
    }
}

impl TryFrom<usize> for ApproxDegree {
    type Error = HeError;

    fn try_from(degree: usize) -> Result<Self> {
        match degree {
            3 => Ok(ApproxDegree::Three),
            5 => Ok(ApproxDegree::Five),
            7 => Ok(ApproxDegree::Seven),
            other => Err(HeError::InvalidDegree(other)),
        }
    }
}

impl From<ApproxDegree> for usize {
    fn from(degree: ApproxDegree) -> usize {
        degree.degree()
    }
}

/// The exact function being approximated
pub fn logistic_gradient(t: f64) -> f64 {
    -1.0 / (1.0 + t.exp())
}
