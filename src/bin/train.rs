//! cipher-gd-train: encrypted logistic-regression training CLI
//!
//! Loads a label-signed training file, trains under encryption with the
//! simulated backend and compares the decoded model with an unencrypted run
//! of the same polynomial.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cipher_gd::math::ApproxDegree;
use cipher_gd::params::{PrecisionPlan, SchemeParams, TrainingConfig, UpdateRule, VelocityInit};
use cipher_gd::plain::{self, Activation};
use cipher_gd::{SignedMatrix, SimScheme, SlotLayout, Trainer};

#[derive(Parser)]
#[command(name = "cipher-gd-train")]
#[command(about = "Train logistic regression on encrypted data")]
#[command(version)]
struct Args {
    /// Training file: header line, then `label,x1,...,xf` rows
    #[arg(long)]
    data: PathBuf,

    /// JSON training configuration; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Approximation degree (3, 5 or 7)
    #[arg(long)]
    degree: Option<usize>,

    /// Update rule: plain, momentum or nesterov
    #[arg(long)]
    rule: Option<UpdateRule>,

    #[arg(long)]
    iterations: Option<usize>,

    /// Learning rate
    #[arg(long)]
    gamma: Option<f64>,

    /// Momentum / Nesterov factor
    #[arg(long)]
    eta: Option<f64>,

    /// Feature columns per chunk (power of two)
    #[arg(long)]
    batch: Option<usize>,

    /// Initial ciphertext level; defaults to exactly what the plan needs
    #[arg(long)]
    top_level: Option<usize>,

    /// Start from the per-feature sample mean instead of zero weights
    #[arg(long)]
    mean_init: bool,

    /// Noise seed (optional)
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the trained model as JSON
    #[arg(long, default_value = "model.json")]
    output: PathBuf,
}

#[derive(Serialize)]
struct TrainingReport {
    config: TrainingConfig,
    factor_dim: usize,
    sample_count: usize,
    top_level: usize,
    remaining_level: usize,
    weights: Vec<f64>,
    reference_weights: Vec<f64>,
    max_deviation: f64,
    accuracy: f64,
    reference_accuracy: f64,
    train_seconds: f64,
}

fn load_config(args: &Args) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => TrainingConfig::default(),
    };

    if let Some(d) = args.degree {
        config.degree = ApproxDegree::try_from(d)?;
    }
    if let Some(rule) = args.rule {
        config.rule = rule;
    }
    if let Some(n) = args.iterations {
        config.iterations = n;
    }
    if let Some(gamma) = args.gamma {
        config.gamma = gamma;
    }
    if let Some(eta) = args.eta {
        config.eta = eta;
    }
    if let Some(batch) = args.batch {
        config.batch = batch;
    }
    config.validate()?;
    Ok(config)
}

/// Unencrypted run of the same plan
fn reference_run(matrix: &SignedMatrix, config: &TrainingConfig, initial: &[f64]) -> Vec<f64> {
    let act = Activation::Poly(config.degree);
    let mut w = initial.to_vec();
    let mut v = match config.velocity_init {
        VelocityInit::Zero => vec![0.0; w.len()],
        VelocityInit::Weights => w.clone(),
    };
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

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let mut config = load_config(&args)?;

    let matrix = SignedMatrix::load(&args.data)
        .with_context(|| format!("Failed to load training data from {}", args.data.display()))?;
    info!(
        "Loaded {} samples x {} features",
        matrix.sample_count(),
        matrix.factor_dim()
    );

    let layout = SlotLayout::fit(matrix.factor_dim(), matrix.sample_count(), config.batch)?;
    let plan = PrecisionPlan::for_layout(&layout);
    info!(
        "Layout: slots={} learn_dim={} batch={} cnum={}",
        layout.slots(),
        layout.learn_dim(),
        layout.batch(),
        layout.cnum()
    );

    // Mean initialisation spends one level before the first iteration.
    let init_depth = usize::from(args.mean_init);
    let top_level = args.top_level.unwrap_or(config.required_depth() + init_depth);
    let mut params = SchemeParams::for_layout(&layout, top_level);
    params.seed = args.seed;
    let scheme = SimScheme::new(params)?;

    let initial = if args.mean_init {
        config.velocity_init = VelocityInit::Weights;
        plain::mean_weights(&matrix)
    } else {
        vec![0.0; matrix.factor_dim()]
    };

    info!(
        "Training: rule={:?} degree={} iterations={} gamma={} eta={} top_level={}",
        config.rule,
        config.degree.degree(),
        config.iterations,
        config.gamma,
        config.eta,
        top_level
    );

    let train_start = Instant::now();
    let explicit_start = (!args.mean_init).then_some(initial.as_slice());
    let mut trainer = Trainer::encrypt(&scheme, layout, plan, config.clone(), &matrix, explicit_start)
        .with_context(|| "Failed to set up encrypted training")?;

    let pb = ProgressBar::new(config.iterations as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} iterations")?
            .progress_chars("#>-"),
    );
    for _ in 0..config.iterations {
        trainer.step()?;
        pb.inc(1);
    }
    pb.finish_with_message("Done");
    let train_time = train_start.elapsed();
    info!("Training time: {:.2?}", train_time);

    let weights = trainer.decode_weights()?;
    let reference = reference_run(&matrix, &config, &initial);
    let max_deviation = weights
        .iter()
        .zip(&reference)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);

    let report = TrainingReport {
        factor_dim: matrix.factor_dim(),
        sample_count: matrix.sample_count(),
        top_level,
        remaining_level: trainer.budget().remaining,
        accuracy: plain::accuracy(&matrix, &weights),
        reference_accuracy: plain::accuracy(&matrix, &reference),
        max_deviation,
        weights,
        reference_weights: reference,
        train_seconds: train_time.as_secs_f64(),
        config,
    };

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &report).with_context(|| "Failed to serialize model")?;
    writer.flush()?;

    println!();
    println!("=== Training Complete ===");
    println!("Weights: {:?}", report.weights);
    println!(
        "Correctness: {:.1}% (reference {:.1}%)",
        100.0 * report.accuracy,
        100.0 * report.reference_accuracy
    );
    println!("Max deviation from reference: {:.3e}", report.max_deviation);
    println!("Remaining level: {}", report.remaining_level);
    println!("Model written to {}", args.output.display());

    Ok(())
}
