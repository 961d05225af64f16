//! cipher-gd: logistic-regression training on encrypted data
//!
//! Gradient descent over a leveled, CKKS-style approximate homomorphic
//! scheme. The server holds only ciphertexts of the label-signed training
//! matrix and of the weights; every iteration computes encrypted inner
//! products, a polynomial approximation of the logistic-loss gradient and
//! one of three update rules (plain, momentum, Nesterov).
//!
//! Key components:
//! - `SlotLayout`: how samples × features are packed into SIMD slots
//! - `Scheme`: the primitive-layer contract, with the `SimScheme` backend
//! - `gd`: encoder, inner product, gradient, update rules and `Trainer`
//! - `plain`: unencrypted reference used to validate encrypted runs
//!
//! There is no bootstrapping: a run's length is bounded by the initial
//! level, and `Trainer` refuses plans that do not fit.

pub mod data;
pub mod error;
pub mod gd;
pub mod layout;
pub mod math;
pub mod params;
pub mod plain;
pub mod scheme;

pub use data::SignedMatrix;
pub use error::{ErrorKind, HeError, Result};
pub use gd::{
    decrypt_weights, encrypt_data, encrypt_weights, encrypt_weights_from_data, generate_aux_mask,
    inner_product, lgd_iteration, lgd_step, mlgd_iteration, mlgd_step, nlgd_iteration, nlgd_step,
    sigmoid_gradient, AuxMask, ChunkArena, DepthBudget, Trainer, TrainingContext, WeightState,
};
pub use layout::SlotLayout;
pub use math::ApproxDegree;
pub use params::{PrecisionPlan, SchemeParams, TrainingConfig, UpdateRule, VelocityInit};
pub use scheme::{Leveled, Scheme, SimCiphertext, SimPlaintext, SimScheme};
