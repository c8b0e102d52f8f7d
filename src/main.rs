use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::fs;
use std::path::PathBuf;

use randkernel::experiment::sweep_progress_bar;
use randkernel::{experiment_with_progress, ApproxMethod, DatasetPreset, ExperimentConfig, KernelFamily};

/// Compares structured random-feature kernel approximations against exact kernels.
#[derive(Parser, Debug)]
#[command(name = "randkernel", version, about)]
struct Args {
    /// JSON file holding an experiment config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start from a dataset preset (USPS, Powerplant, LETTER, MNIST, CIFAR100, LEUKEMIA)
    #[arg(long, conflicts_with = "config")]
    preset: Option<DatasetPreset>,

    /// Kernel family: RBF, Arccos 0 or Arccos 1
    #[arg(long)]
    kernel: Option<KernelFamily>,

    #[arg(long)]
    start_deg: Option<usize>,

    #[arg(long)]
    max_deg: Option<usize>,

    #[arg(long)]
    step: Option<usize>,

    #[arg(long)]
    shift: Option<usize>,

    #[arg(long)]
    runs: Option<usize>,

    /// Comma separated methods, e.g. G,Gort,ROM,H,"B dense",B
    #[arg(long, value_delimiter = ',')]
    methods: Option<Vec<ApproxMethod>>,

    /// Number of synthetic points
    #[arg(long, default_value_t = 100)]
    points: usize,

    /// Dimension of synthetic points (defaults to the preset's, or 16)
    #[arg(long)]
    dim: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match (&self.config, self.preset) {
            (Some(path), _) => {
                let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            (None, Some(preset)) => preset.config(self.kernel.unwrap_or(KernelFamily::Rbf)),
            (None, None) => ExperimentConfig::default(),
        };
        if let Some(kernel) = self.kernel {
            config.kernel = kernel;
        }
        if let Some(v) = self.start_deg {
            config.start_deg = v;
        }
        if let Some(v) = self.max_deg {
            config.max_deg = v;
        }
        if let Some(v) = self.step {
            config.step = v;
        }
        if let Some(v) = self.shift {
            config.shift = v;
        }
        if let Some(v) = self.runs {
            config.runs = v;
        }
        if let Some(methods) = &self.methods {
            config.methods = methods.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn dim(&self) -> usize {
        self.dim.or_else(|| self.preset.map(|p| p.input_dim())).unwrap_or(16)
    }
}

/// Standard normal points scaled into [-1, 1] by their largest magnitude.
fn synthetic_points<R: Rng + ?Sized>(n: usize, d: usize, rng: &mut R) -> DMatrix<f64> {
    let points = DMatrix::from_fn(n, d, |_, _| rng.sample::<f64, _>(StandardNormal));
    let scale = points.amax();
    if scale > 0.0 {
        points / scale
    } else {
        points
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.experiment_config()?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let x = synthetic_points(args.points, args.dim(), &mut rng);
    info!("{} synthetic points in {} dimensions", x.nrows(), x.ncols());

    let progress = sweep_progress_bar();
    let results = experiment_with_progress(&x, &x, &config, &mut rng, &progress).context("experiment failed")?;

    let (errors, mses, ranks) = results.mean_over_runs();
    println!("kernel: {}, runs: {}", config.kernel, config.runs);
    println!("{:<8} {:>6} {:>6} {:>12} {:>12} {:>8}", "method", "deg", "k", "rel. error", "mse", "rank");
    for (i, method) in results.methods().iter().enumerate() {
        for (j, (&deg, k)) in results.degrees().iter().zip(results.features()).enumerate() {
            println!(
                "{:<8} {:>6} {:>6} {:>12.6} {:>12.3e} {:>8.1}",
                method.name(),
                deg,
                k,
                errors[[i, j]],
                mses[[i, j]],
                ranks[[i, j]]
            );
        }
    }
    Ok(())
}
