//! Numeric building blocks.
//!
//! - **Noise sampling**: seeded discrete Gaussian used by the reference backend
//! - **Gradient approximation**: the fixed odd polynomials standing in for the
//!   logistic-loss derivative

pub mod approx;
pub mod noise;

pub use approx::{logistic_gradient, ApproxDegree};
pub use noise::NoiseSampler;
