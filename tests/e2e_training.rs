//! End-to-end encrypted training tests
//!
//! Encrypt → iterate → decrypt must match the same iterations run in the
//! clear with the same polynomial standing in for the logistic gradient.

use cipher_gd::gd::{
    decrypt_weights, encrypt_data, encrypt_weights, generate_aux_mask, inner_product,
};
use cipher_gd::math::ApproxDegree;
use cipher_gd::params::{PrecisionPlan, SchemeParams, TrainingConfig, UpdateRule, VelocityInit};
use cipher_gd::plain::{self, Activation};
use cipher_gd::{Scheme, SignedMatrix, SimScheme, SlotLayout, Trainer};

const TOLERANCE: f64 = 1e-4;

/// 8 samples × 4 binary features, label-signed
fn scenario_matrix() -> SignedMatrix {
    let features = vec![
        vec![1.0, 0.0, 1.0, 1.0],
        vec![1.0, 1.0, 0.0, 1.0],
        vec![0.0, 1.0, 1.0, 0.0],
        vec![1.0, 1.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0, 1.0],
        vec![0.0, 1.0, 0.0, 0.0],
        vec![1.0, 0.0, 0.0, 1.0],
        vec![0.0, 0.0, 0.0, 1.0],
    ];
    let labels = [true, true, false, true, false, false, true, false];
    SignedMatrix::from_labeled(&features, &labels).unwrap()
}

fn reference(matrix: &SignedMatrix, config: &TrainingConfig, initial: &[f64]) -> Vec<f64> {
    let act = Activation::Poly(config.degree);
    let mut w = initial.to_vec();
    let mut v = vec![0.0; w.len()];
    for _ in 0..config.iterations {
        match config.rule {
            UpdateRule::Plain => w = plain::lgd_step(matrix, &w, config.gamma, act),
            UpdateRule::Momentum => {
                (w, v) = plain::mlgd_step(matrix, &w, &v, config.gamma, config.eta, act)
            }
            UpdateRule::Nesterov => {
                (w, v) = plain::nlgd_step(matrix, &w, &v, config.gamma, config.eta, act)
            }
        }
    }
    w
}

fn train_encrypted(matrix: &SignedMatrix, config: &TrainingConfig, top_level: usize, seed: u64) -> Vec<f64> {
    let layout = SlotLayout::fit(matrix.factor_dim(), matrix.sample_count(), config.batch).unwrap();
    let scheme = SimScheme::new(SchemeParams::for_layout(&layout, top_level).with_seed(seed)).unwrap();
    let plan = PrecisionPlan::for_layout(&layout);
    let initial = vec![0.0; matrix.factor_dim()];

    let mut trainer =
        Trainer::encrypt(&scheme, layout, plan, config.clone(), matrix, Some(&initial)).unwrap();
    trainer.run().unwrap();
    assert_eq!(trainer.iterations_completed(), config.iterations);
    trainer.decode_weights().unwrap()
}

fn assert_close(got: &[f64], want: &[f64], what: &str) {
    assert_eq!(got.len(), want.len());
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!(
            (g - w).abs() < TOLERANCE,
            "{}: weight {} is {} (expected {})",
            what,
            i,
            g,
            w
        );
    }
}

#[test]
fn test_e2e_plain_degree3_five_iterations() {
    let matrix = scenario_matrix();
    let config = TrainingConfig {
        degree: ApproxDegree::Three,
        rule: UpdateRule::Plain,
        gamma: 0.1,
        eta: 0.0,
        iterations: 5,
        batch: 8,
        velocity_init: VelocityInit::Zero,
    };

    let layout = SlotLayout::fit(4, 8, 8).unwrap();
    assert_eq!(layout.cnum(), 1);
    assert_eq!(layout.slots(), 64);

    let got = train_encrypted(&matrix, &config, 25, 42);
    let want = reference(&matrix, &config, &[0.0; 4]);
    assert_close(&got, &want, "plain degree 3");
    assert!(want.iter().any(|w| w.abs() > 0.05), "reference did not move");
}

#[test]
fn test_e2e_momentum_matches_reference() {
    let matrix = scenario_matrix();
    let config = TrainingConfig {
        rule: UpdateRule::Momentum,
        eta: 0.5,
        iterations: 3,
        ..TrainingConfig::default()
    };
    let got = train_encrypted(&matrix, &config, config.required_depth(), 7);
    assert_close(&got, &reference(&matrix, &config, &[0.0; 4]), "momentum");
}

#[test]
fn test_e2e_nesterov_matches_reference() {
    let matrix = scenario_matrix();
    let config = TrainingConfig {
        rule: UpdateRule::Nesterov,
        eta: 0.3,
        iterations: 3,
        ..TrainingConfig::default()
    };
    assert_eq!(config.required_depth(), 18);
    let got = train_encrypted(&matrix, &config, 18, 8);
    assert_close(&got, &reference(&matrix, &config, &[0.0; 4]), "nesterov");
}

#[test]
fn test_e2e_every_degree() {
    let matrix = scenario_matrix();
    for degree in ApproxDegree::ALL {
        let config = TrainingConfig {
            degree,
            iterations: 2,
            batch: 2,
            ..TrainingConfig::default()
        };
        let got = train_encrypted(&matrix, &config, config.required_depth(), 3);
        let want = reference(&matrix, &config, &[0.0; 4]);
        assert_close(&got, &want, &format!("degree {}", degree.degree()));
    }
}

#[test]
fn test_zero_eta_rules_agree() {
    let matrix = scenario_matrix();
    let base = TrainingConfig {
        eta: 0.0,
        iterations: 2,
        ..TrainingConfig::default()
    };
    let plain_w = train_encrypted(&matrix, &base, 14, 1);
    for rule in [UpdateRule::Momentum, UpdateRule::Nesterov] {
        let config = TrainingConfig { rule, ..base.clone() };
        let got = train_encrypted(&matrix, &config, 14, 1);
        assert_close(&got, &plain_w, &format!("{:?} with eta 0", rule));
    }
}

#[test]
fn test_encrypted_model_classifies_like_reference() {
    let matrix = scenario_matrix();
    let config = TrainingConfig {
        iterations: 4,
        gamma: 0.3,
        ..TrainingConfig::default()
    };
    let got = train_encrypted(&matrix, &config, 20, 11);
    let want = reference(&matrix, &config, &[0.0; 4]);
    assert_eq!(plain::accuracy(&matrix, &got), plain::accuracy(&matrix, &want));
}

#[test]
fn test_weight_round_trip_without_iterations() {
    for (factor_dim, samples, batch) in [(4, 8, 8), (10, 5, 4), (7, 3, 2), (3, 6, 1)] {
        let layout = SlotLayout::fit(factor_dim, samples, batch).unwrap();
        let scheme = SimScheme::new(SchemeParams::for_layout(&layout, 3).with_seed(2)).unwrap();
        let plan = PrecisionPlan::for_layout(&layout);
        let matrix = SignedMatrix::from_rows(vec![vec![1.0; factor_dim]; samples]).unwrap();
        let w: Vec<f64> = (0..factor_dim).map(|i| (i as f64 - 3.0) * 0.37).collect();

        let data = encrypt_data(&scheme, &matrix, &layout, &plan).unwrap();
        let state = encrypt_weights(&scheme, &layout, &data, &w, VelocityInit::Zero).unwrap();
        let decoded = decrypt_weights(&scheme, &layout, &plan, &state.weights).unwrap();
        assert_close(&decoded, &w, "round trip");
    }
}

#[test]
fn test_inner_product_over_layouts() {
    for (factor_dim, samples, batch) in [(4, 8, 8), (4, 8, 2), (12, 7, 4), (5, 16, 1), (9, 2, 16)] {
        let layout = SlotLayout::fit(factor_dim, samples, batch).unwrap();
        assert!(factor_dim <= layout.cnum() * layout.batch());
        let scheme = SimScheme::new(SchemeParams::for_layout(&layout, 2).with_seed(4)).unwrap();
        let plan = PrecisionPlan::for_layout(&layout);

        let rows: Vec<Vec<f64>> = (0..samples)
            .map(|j| (0..factor_dim).map(|i| ((3 * i + 5 * j) % 7) as f64 - 3.0).collect())
            .collect();
        let matrix = SignedMatrix::from_rows(rows).unwrap();
        let w: Vec<f64> = (0..factor_dim).map(|i| 0.05 * i as f64 - 0.2).collect();

        let data = encrypt_data(&scheme, &matrix, &layout, &plan).unwrap();
        let state = encrypt_weights(&scheme, &layout, &data, &w, VelocityInit::Zero).unwrap();
        let mask = generate_aux_mask(&scheme, &layout, &plan).unwrap();
        let ip = inner_product(&scheme, &layout, &plan, &data, &state.weights, &mask).unwrap();

        let slots = scheme.decrypt(&ip);
        for j in 0..samples {
            let want = matrix.margin(&w, j);
            for l in 0..batch {
                let got = slots[layout.slot_index(j, l)];
                assert!(
                    (got - want).abs() < 1e-6,
                    "layout ({}, {}, {}) sample {}: {} vs {}",
                    factor_dim,
                    samples,
                    batch,
                    j,
                    got,
                    want
                );
            }
        }
    }
}

#[test]
fn test_mean_initialisation_training() {
    let matrix = scenario_matrix();
    let config = TrainingConfig {
        rule: UpdateRule::Momentum,
        eta: 0.4,
        iterations: 2,
        velocity_init: VelocityInit::Weights,
        ..TrainingConfig::default()
    };
    let layout = SlotLayout::fit(4, 8, config.batch).unwrap();
    let scheme = SimScheme::new(SchemeParams::for_layout(&layout, 11).with_seed(6)).unwrap();
    let plan = PrecisionPlan::for_layout(&layout);

    let mut trainer = Trainer::encrypt(&scheme, layout, plan, config.clone(), &matrix, None).unwrap();
    assert_eq!(trainer.budget().remaining, 10);
    trainer.run().unwrap();
    let got = trainer.decode_weights().unwrap();

    let mean = plain::mean_weights(&matrix);
    let act = Activation::Poly(config.degree);
    let (mut w, mut v) = (mean.clone(), mean);
    for _ in 0..config.iterations {
        (w, v) = plain::mlgd_step(&matrix, &w, &v, config.gamma, config.eta, act);
    }
    assert_close(&got, &w, "mean-initialised momentum");
}
