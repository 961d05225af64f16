//! Parameter sets for encrypted training
//!
//! Three groups of parameters travel together:
//! - `SchemeParams`: the primitive layer (slot count, initial level, noise)
//! - `PrecisionPlan`: the five bit budgets threaded through every call
//! - `TrainingConfig`: the learning problem (degree, rule, gamma, eta, iterations)

use serde::{Deserialize, Serialize};

use crate::error::{config_err, HeError, Result};
use crate::layout::SlotLayout;
use crate::math::approx::ApproxDegree;
use crate::math::noise::DEFAULT_SIGMA;

/// Largest scale (bits) a product may reach before rescaling.
///
/// Slot values are `i128` fixed-point; keep a few bits for the magnitude.
pub const MAX_PRODUCT_BITS: u32 = 120;

/// Primitive-layer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeParams {
    /// log2 of the slot count (ring dimension is 2·slots)
    pub log_slots: u32,

    /// Level of a freshly encrypted ciphertext, i.e. the number of rescales
    /// available before the modulus is exhausted
    pub top_level: usize,

    /// Standard deviation of encryption / key-switching noise, in units of
    /// the ciphertext's least significant fixed-point bit
    pub sigma: f64,

    /// Seed for the noise sampler; `None` draws one from the OS
    pub seed: Option<u64>,
}

impl SchemeParams {
    /// Parameters whose slot count matches `layout` exactly.
    pub fn for_layout(layout: &SlotLayout, top_level: usize) -> Self {
        Self {
            log_slots: layout.slots().trailing_zeros(),
            top_level,
            sigma: DEFAULT_SIGMA,
            seed: None,
        }
    }

    /// Builder-style seed override
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn slots(&self) -> usize {
        1usize << self.log_slots
    }

    /// Ring dimension N = 2·slots
    pub fn ring_dim(&self) -> usize {
        self.slots() << 1
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.log_slots == 0 || self.log_slots > 20 {
            return Err("log_slots must be in 1..=20");
        }
        if self.top_level == 0 {
            return Err("top_level must be at least 1");
        }
        if !(self.sigma.is_finite() && self.sigma >= 0.0) {
            return Err("sigma must be finite and non-negative");
        }
        Ok(())
    }
}

impl Default for SchemeParams {
    fn default() -> Self {
        Self {
            log_slots: 10,
            top_level: 30,
            sigma: DEFAULT_SIGMA,
            seed: None,
        }
    }
}

/// The five bit budgets of one training run.
///
/// `s_bits` and `b_bits` size the sample-axis and feature-axis
/// rotate-and-sum trees; `w_bits`, `p_bits` and `a_bits` are fixed-point
/// precisions. The plan is immutable: every component receives it by
/// reference and no call mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionPlan {
    /// log2(learn_dim)
    pub s_bits: u32,
    /// log2(batch)
    pub b_bits: u32,
    /// Scale of data, weights, velocity and every intermediate that
    /// survives a rescale
    pub w_bits: u32,
    /// Scale of the auxiliary mask and of the Nesterov mixing constants
    pub p_bits: u32,
    /// Scale of the activation-polynomial coefficients
    pub a_bits: u32,
}

impl PrecisionPlan {
    pub const DEFAULT_W_BITS: u32 = 30;
    pub const DEFAULT_P_BITS: u32 = 20;
    pub const DEFAULT_A_BITS: u32 = 30;

    pub fn new(layout: &SlotLayout, w_bits: u32, p_bits: u32, a_bits: u32) -> Result<Self> {
        let plan = Self {
            s_bits: layout.s_bits(),
            b_bits: layout.b_bits(),
            w_bits,
            p_bits,
            a_bits,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Default precisions for `layout`
    pub fn for_layout(layout: &SlotLayout) -> Self {
        Self {
            s_bits: layout.s_bits(),
            b_bits: layout.b_bits(),
            w_bits: Self::DEFAULT_W_BITS,
            p_bits: Self::DEFAULT_P_BITS,
            a_bits: Self::DEFAULT_A_BITS,
        }
    }

    /// Every product in the pipeline multiplies a `w_bits` operand by one of
    /// `w_bits`, `p_bits` or `a_bits`; all of them must fit before rescale.
    pub fn validate(&self) -> Result<()> {
        if self.w_bits == 0 || self.p_bits == 0 || self.a_bits == 0 {
            return Err(config_err!("precision bits must be positive: {:?}", self));
        }
        let widest = self.w_bits.max(self.p_bits).max(self.a_bits);
        if self.w_bits + widest > MAX_PRODUCT_BITS {
            return Err(config_err!(
                "w_bits {} + {} exceeds product capacity {}",
                self.w_bits,
                widest,
                MAX_PRODUCT_BITS
            ));
        }
        Ok(())
    }

    /// Scale at which to encode the constant `c` so it keeps `a_bits`
    /// significant bits however small it is.
    ///
    /// The product with a `w_bits` ciphertext is rescaled by the same amount,
    /// so the result stays at `w_bits` and still costs one level.
    pub fn constant_bits(&self, c: f64) -> Result<u32> {
        if !c.is_finite() {
            return Err(config_err!("constant {} is not finite", c));
        }
        let leading_zeros = if c == 0.0 {
            0
        } else {
            (-c.abs().log2().floor() - 1.0).max(0.0) as u32
        };
        let bits = self.a_bits.saturating_add(leading_zeros);
        let product = self.w_bits.saturating_add(bits);
        if product > MAX_PRODUCT_BITS {
            return Err(HeError::ScaleOverflow { scale_bits: product });
        }
        Ok(bits)
    }

    /// Check the layout-derived budgets agree with `layout`.
    pub fn check_layout(&self, layout: &SlotLayout) -> Result<()> {
        if self.s_bits != layout.s_bits() || self.b_bits != layout.b_bits() {
            return Err(config_err!(
                "plan (s_bits={}, b_bits={}) does not match layout (s_bits={}, b_bits={})",
                self.s_bits,
                self.b_bits,
                layout.s_bits(),
                layout.b_bits()
            ));
        }
        Ok(())
    }
}

/// Encrypted weight-update policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateRule {
    /// w ← w − grad
    #[default]
    Plain,
    /// v ← η·v + grad; w ← w − v
    Momentum,
    /// tmp ← w − grad; w ← (1−η)·tmp + η·v; v ← tmp
    Nesterov,
}

impl UpdateRule {
    /// Levels consumed by the update itself, on top of inner product and gradient
    pub fn extra_depth(&self) -> usize {
        match self {
            UpdateRule::Plain | UpdateRule::Momentum => 0,
            UpdateRule::Nesterov => 1,
        }
    }
}

impl std::str::FromStr for UpdateRule {
    type Err = crate::error::HeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "lgd" => Ok(UpdateRule::Plain),
            "momentum" | "mlgd" => Ok(UpdateRule::Momentum),
            "nesterov" | "nlgd" => Ok(UpdateRule::Nesterov),
            other => Err(config_err!("unknown update rule '{}'", other)),
        }
    }
}

/// Initial content of the velocity chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityInit {
    #[default]
    Zero,
    Weights,
}

/// Learning-problem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Degree of the logistic-gradient approximation
    pub degree: ApproxDegree,
    pub rule: UpdateRule,
    /// Learning rate, applied to the summed (not averaged) gradient
    pub gamma: f64,
    /// Momentum / Nesterov mixing factor; ignored by `Plain`
    pub eta: f64,
    /// Planned number of iterations, checked against the depth budget up front
    pub iterations: usize,
    /// Feature columns per chunk
    pub batch: usize,
    #[serde(default)]
    pub velocity_init: VelocityInit,
}

impl TrainingConfig {
    /// Levels one iteration consumes from the weight ciphertexts.
    pub fn depth_per_iteration(&self) -> usize {
        crate::gd::inner_product::DEPTH + self.degree.gradient_depth() + self.rule.extra_depth()
    }

    /// Total levels the planned run needs
    pub fn required_depth(&self) -> usize {
        self.iterations * self.depth_per_iteration()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(config_err!("gamma must be positive, got {}", self.gamma));
        }
        if !(self.eta.is_finite() && (0.0..1.0).contains(&self.eta)) {
            return Err(config_err!("eta must lie in [0, 1), got {}", self.eta));
        }
        if !self.batch.is_power_of_two() {
            return Err(config_err!("batch {} must be a power of two", self.batch));
        }
        Ok(())
    }

    /// `γ·c_k` for every coefficient the gradient multiplies into a
    /// ciphertext: `c0` and `c3, c5, …`. `c1` is only ever added.
    pub fn scaled_coefficients(&self) -> impl Iterator<Item = f64> + '_ {
        let coeffs = self.degree.coefficients();
        coeffs
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != 1)
            .map(move |(_, c)| self.gamma * c)
    }

    /// Every `γ·c_k` product must fit `plan` at its own constant scale.
    pub fn check_plan(&self, plan: &PrecisionPlan) -> Result<()> {
        for c in self.scaled_coefficients() {
            plan.constant_bits(c)?;
        }
        Ok(())
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            degree: ApproxDegree::Three,
            rule: UpdateRule::Plain,
            gamma: 0.1,
            eta: 0.9,
            iterations: 5,
            batch: 8,
            velocity_init: VelocityInit::Zero,
        }
    }
}
