//! Iteration drivers and the training orchestrator
//!
//! An iteration is inner product → gradient → update rule, run exactly once.
//! The drivers are pure: they read a [`WeightState`] and return a new one.
//! [`Trainer`] owns the state for the whole run, checks the depth budget
//! before each iteration and commits the new state only when the iteration
//! succeeded, so a failed iteration leaves the weights untouched.

use tracing::{debug, info};

use crate::data::SignedMatrix;
use crate::error::{config_err, HeError, Result};
use crate::layout::SlotLayout;
use crate::math::approx::ApproxDegree;
use crate::params::{PrecisionPlan, TrainingConfig, UpdateRule};
use crate::scheme::Scheme;

use super::arena::ChunkArena;
use super::encode::{
    decrypt_weights, encrypt_data, encrypt_weights, encrypt_weights_from_data, WeightState,
};
use super::gradient::sigmoid_gradient;
use super::inner_product::inner_product;
use super::mask::{generate_aux_mask, AuxMask};
use super::update::{lgd_step, mlgd_step, nlgd_step};

/// Remaining multiplicative depth, tracked per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBudget {
    pub remaining: usize,
    pub per_iteration: usize,
    pub completed: usize,
}

impl DepthBudget {
    pub fn new(level: usize, per_iteration: usize) -> Self {
        Self {
            remaining: level,
            per_iteration,
            completed: 0,
        }
    }

    /// Iterations that still fit
    pub fn iterations_left(&self) -> usize {
        self.remaining.checked_div(self.per_iteration).unwrap_or(usize::MAX)
    }

    /// Fail with `DepthExhausted` if one more iteration does not fit.
    pub fn check_next(&self) -> Result<()> {
        if self.remaining < self.per_iteration {
            return Err(HeError::DepthExhausted {
                required: self.per_iteration,
                available: self.remaining,
            });
        }
        Ok(())
    }

    /// Budget after one more completed iteration
    pub fn after_iteration(self) -> Result<Self> {
        self.check_next()?;
        Ok(Self {
            remaining: self.remaining - self.per_iteration,
            completed: self.completed + 1,
            ..self
        })
    }
}

/// Read-only inputs shared by every iteration of a run.
pub struct TrainingContext<'a, S: Scheme> {
    pub scheme: &'a S,
    pub layout: &'a SlotLayout,
    pub plan: &'a PrecisionPlan,
    pub data: &'a ChunkArena<S::Ciphertext>,
    pub mask: &'a AuxMask<S::Plaintext>,
}

fn gradient_of<S: Scheme>(
    ctx: &TrainingContext<'_, S>,
    degree: ApproxDegree,
    gamma: f64,
    weights: &ChunkArena<S::Ciphertext>,
) -> Result<ChunkArena<S::Ciphertext>> {
    let ip = inner_product(ctx.scheme, ctx.layout, ctx.plan, ctx.data, weights, ctx.mask)?;
    sigmoid_gradient(ctx.scheme, ctx.layout, ctx.plan, degree, ctx.data, &ip, gamma)
}

/// One plain gradient-descent iteration. The velocity is carried over unchanged.
pub fn lgd_iteration<S: Scheme>(
    ctx: &TrainingContext<'_, S>,
    degree: ApproxDegree,
    gamma: f64,
    state: &WeightState<S::Ciphertext>,
) -> Result<WeightState<S::Ciphertext>> {
    let grad = gradient_of(ctx, degree, gamma, &state.weights)?;
    Ok(WeightState {
        weights: lgd_step(ctx.scheme, ctx.plan, &state.weights, &grad)?,
        velocity: state.velocity.clone(),
    })
}

/// One momentum iteration
pub fn mlgd_iteration<S: Scheme>(
    ctx: &TrainingContext<'_, S>,
    degree: ApproxDegree,
    gamma: f64,
    eta: f64,
    state: &WeightState<S::Ciphertext>,
) -> Result<WeightState<S::Ciphertext>> {
    let grad = gradient_of(ctx, degree, gamma, &state.weights)?;
    mlgd_step(ctx.scheme, ctx.plan, &state.weights, &state.velocity, &grad, eta)
}

/// One Nesterov iteration
pub fn nlgd_iteration<S: Scheme>(
    ctx: &TrainingContext<'_, S>,
    degree: ApproxDegree,
    gamma: f64,
    eta: f64,
    state: &WeightState<S::Ciphertext>,
) -> Result<WeightState<S::Ciphertext>> {
    let grad = gradient_of(ctx, degree, gamma, &state.weights)?;
    nlgd_step(ctx.scheme, ctx.plan, &state.weights, &state.velocity, &grad, eta)
}

/// Sequential orchestrator of one encrypted training run.
pub struct Trainer<'s, S: Scheme> {
    scheme: &'s S,
    layout: SlotLayout,
    plan: PrecisionPlan,
    config: TrainingConfig,
    data: ChunkArena<S::Ciphertext>,
    mask: AuxMask<S::Plaintext>,
    state: WeightState<S::Ciphertext>,
    budget: DepthBudget,
}

impl<'s, S: Scheme> Trainer<'s, S> {
    /// Take ownership of encrypted data and initial state.
    ///
    /// Rejects the run with `DepthBudget` if `config.iterations` iterations
    /// cannot fit in the weights' level, and with `ScaleOverflow` if a scaled
    /// coefficient needs more bits than `plan` leaves.
    pub fn new(
        scheme: &'s S,
        layout: SlotLayout,
        plan: PrecisionPlan,
        config: TrainingConfig,
        data: ChunkArena<S::Ciphertext>,
        state: WeightState<S::Ciphertext>,
    ) -> Result<Self> {
        config.validate()?;
        plan.validate()?;
        plan.check_layout(&layout)?;
        config.check_plan(&plan)?;
        if config.batch != layout.batch() {
            return Err(config_err!(
                "config batch {} differs from layout batch {}",
                config.batch,
                layout.batch()
            ));
        }
        if data.len() != layout.cnum() {
            return Err(config_err!(
                "{} data chunks, layout has cnum {}",
                data.len(),
                layout.cnum()
            ));
        }
        state.weights.check_same_shape(&data)?;
        state.velocity.check_same_shape(&data)?;

        let budget = DepthBudget::new(state.level(), config.depth_per_iteration());
        if config.required_depth() > budget.remaining {
            return Err(HeError::DepthBudget {
                required: config.required_depth(),
                available: budget.remaining,
            });
        }

        let mask = generate_aux_mask(scheme, &layout, &plan)?;
        info!(
            rule = ?config.rule,
            degree = config.degree.degree(),
            iterations = config.iterations,
            per_iteration = budget.per_iteration,
            level = budget.remaining,
            "trainer ready"
        );

        Ok(Self {
            scheme,
            layout,
            plan,
            config,
            data,
            mask,
            state,
            budget,
        })
    }

    /// Encrypt `matrix` and the initial weights, then build the trainer.
    ///
    /// With `initial = None` the weights start at the per-feature sample mean,
    /// computed under encryption.
    pub fn encrypt(
        scheme: &'s S,
        layout: SlotLayout,
        plan: PrecisionPlan,
        config: TrainingConfig,
        matrix: &SignedMatrix,
        initial: Option<&[f64]>,
    ) -> Result<Self> {
        config.validate()?;
        plan.validate()?;
        config.check_plan(&plan)?;
        let data = encrypt_data(scheme, matrix, &layout, &plan)?;
        let state = match initial {
            Some(w) => encrypt_weights(scheme, &layout, &data, w, config.velocity_init)?,
            None => encrypt_weights_from_data(scheme, &layout, &plan, &data)?,
        };
        Self::new(scheme, layout, plan, config, data, state)
    }

    /// Run one iteration of the configured rule.
    pub fn step(&mut self) -> Result<()> {
        self.budget.check_next()?;

        let ctx = TrainingContext {
            scheme: self.scheme,
            layout: &self.layout,
            plan: &self.plan,
            data: &self.data,
            mask: &self.mask,
        };
        let c = &self.config;
        let next = match c.rule {
            UpdateRule::Plain => lgd_iteration(&ctx, c.degree, c.gamma, &self.state)?,
            UpdateRule::Momentum => mlgd_iteration(&ctx, c.degree, c.gamma, c.eta, &self.state)?,
            UpdateRule::Nesterov => nlgd_iteration(&ctx, c.degree, c.gamma, c.eta, &self.state)?,
        };

        self.budget = self.budget.after_iteration()?;
        self.state = next;
        debug!(
            iteration = self.budget.completed,
            level = self.state.level(),
            "iteration committed"
        );
        Ok(())
    }

    /// Run the remaining planned iterations.
    pub fn run(&mut self) -> Result<()> {
        while self.budget.completed < self.config.iterations {
            self.step()?;
        }
        info!(
            iterations = self.budget.completed,
            level = self.state.level(),
            "training finished"
        );
        Ok(())
    }

    /// Independent copy of the current state, safe to decode while training continues.
    pub fn snapshot(&self) -> WeightState<S::Ciphertext> {
        self.state.clone()
    }

    /// Decrypt the current weights.
    pub fn decode_weights(&self) -> Result<Vec<f64>> {
        decrypt_weights(self.scheme, &self.layout, &self.plan, &self.state.weights)
    }

    pub fn budget(&self) -> DepthBudget {
        self.budget
    }

    pub fn iterations_completed(&self) -> usize {
        self.budget.completed
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn into_state(self) -> WeightState<S::Ciphertext> {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SchemeParams;
    use crate::scheme::SimScheme;

    fn matrix() -> SignedMatrix {
        SignedMatrix::from_rows(vec![
            vec![1.0, 0.0, 1.0],
            vec![0.0, 1.0, 1.0],
            vec![-1.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ])
        .unwrap()
    }

    fn config(iterations: usize) -> TrainingConfig {
        TrainingConfig {
            iterations,
            batch: 4,
            ..TrainingConfig::default()
        }
    }

    fn setup(top_level: usize) -> (SimScheme, SlotLayout, PrecisionPlan) {
        let layout = SlotLayout::fit(3, 4, 4).unwrap();
        let scheme = SimScheme::new(SchemeParams::for_layout(&layout, top_level).with_seed(9)).unwrap();
        let plan = PrecisionPlan::for_layout(&layout);
        (scheme, layout, plan)
    }

    #[test]
    fn test_budget_arithmetic() {
        let budget = DepthBudget::new(12, 5);
        assert_eq!(budget.iterations_left(), 2);
        let budget = budget.after_iteration().unwrap();
        let budget = budget.after_iteration().unwrap();
        assert_eq!(budget.remaining, 2);
        assert_eq!(budget.completed, 2);
        assert!(budget.after_iteration().unwrap_err().is_depth_exhausted());
    }

    #[test]
    fn test_rejects_plan_over_budget() {
        let (scheme, layout, plan) = setup(12);
        let err = Trainer::encrypt(&scheme, layout, plan, config(3), &matrix(), Some(&[0.0; 3]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            HeError::DepthBudget {
                required: 15,
                available: 12
            }
        );
    }

    #[test]
    fn test_failed_iteration_leaves_state_untouched() {
        let (scheme, layout, plan) = setup(12);
        let mut trainer =
            Trainer::encrypt(&scheme, layout, plan, config(2), &matrix(), Some(&[0.0; 3])).unwrap();
        trainer.run().unwrap();
        assert_eq!(trainer.iterations_completed(), 2);

        let before = trainer.decode_weights().unwrap();
        let err = trainer.step().unwrap_err();
        assert!(err.is_depth_exhausted());
        assert_eq!(trainer.iterations_completed(), 2);
        assert_eq!(trainer.decode_weights().unwrap(), before);
    }

    #[test]
    fn test_driver_fails_without_levels() {
        let (scheme, layout, plan) = setup(12);
        let m = matrix();
        let data = encrypt_data(&scheme, &m, &layout, &plan).unwrap();
        let state =
            encrypt_weights(&scheme, &layout, &data, &[0.0; 3], Default::default()).unwrap();
        let low = WeightState {
            weights: ChunkArena::new(vec![scheme.level_down(&state.weights[0], 4).unwrap()]).unwrap(),
            velocity: state.velocity.clone(),
        };
        let mask = generate_aux_mask(&scheme, &layout, &plan).unwrap();
        let ctx = TrainingContext {
            scheme: &scheme,
            layout: &layout,
            plan: &plan,
            data: &data,
            mask: &mask,
        };

        let err = lgd_iteration(&ctx, ApproxDegree::Three, 0.1, &low).unwrap_err();
        assert!(err.is_depth_exhausted());
        assert!(lgd_iteration(&ctx, ApproxDegree::Three, 0.1, &state).is_ok());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let (scheme, layout, plan) = setup(10);
        let mut trainer =
            Trainer::encrypt(&scheme, layout, plan, config(1), &matrix(), Some(&[0.1; 3])).unwrap();
        let snap = trainer.snapshot();
        trainer.step().unwrap();
        let early = decrypt_weights(&scheme, &layout, &plan, &snap.weights).unwrap();
        for w in early {
            assert!((w - 0.1).abs() < 1e-6);
        }
        assert_eq!(trainer.budget().remaining, 5);
    }

    #[test]
    fn test_batch_mismatch_rejected() {
        let (scheme, layout, plan) = setup(12);
        let mut cfg = config(1);
        cfg.batch = 8;
        assert!(Trainer::encrypt(&scheme, layout, plan, cfg, &matrix(), None).is_err());
    }

    #[test]
    fn test_rejects_coefficient_beyond_plan() {
        let (scheme, layout, _) = setup(12);
        let plan = PrecisionPlan::new(&layout, 50, 20, 50).unwrap();
        let cfg = TrainingConfig {
            degree: ApproxDegree::Seven,
            gamma: 1e-3,
            ..config(1)
        };
        let err = Trainer::encrypt(&scheme, layout, plan, cfg, &matrix(), Some(&[0.0; 3]))
            .err()
            .unwrap();
        assert!(matches!(err, HeError::ScaleOverflow { .. }), "{}", err);
    }
}
