use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use nalgebra::DMatrix;
use ndarray::{Array2, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{FeatureMapError, Result};
use crate::methods::{kernel, ApproxMethod, KernelFamily};
use crate::metrics::{mean_squared_error, numerical_rank, relative_error};

fn default_methods() -> Vec<ApproxMethod> {
    ApproxMethod::DEFAULT_SWEEP.to_vec()
}

/// Parameters of a sweep over the number of random features.
///
/// For degree `deg` the approximation uses `k = deg + shift` features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub start_deg: usize,
    pub max_deg: usize,
    pub step: usize,
    pub shift: usize,
    pub runs: usize,
    pub kernel: KernelFamily,
    pub methods: Vec<ApproxMethod>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            start_deg: 1,
            max_deg: 3,
            step: 1,
            shift: 1,
            runs: 3,
            kernel: KernelFamily::Rbf,
            methods: default_methods(),
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.start_deg < 1 {
            return Err(FeatureMapError::InvalidArgument("start_deg must be at least 1".to_string()));
        }
        if self.max_deg < self.start_deg {
            return Err(FeatureMapError::InvalidArgument(format!(
                "max_deg ({}) must not be smaller than start_deg ({})",
                self.max_deg, self.start_deg
            )));
        }
        if self.step < 1 {
            return Err(FeatureMapError::InvalidArgument("step must be at least 1".to_string()));
        }
        if self.runs < 1 {
            return Err(FeatureMapError::InvalidArgument("runs must be at least 1".to_string()));
        }
        if self.swept_methods().is_empty() {
            return Err(FeatureMapError::InvalidArgument(
                "at least one non-exact approximation method is required".to_string(),
            ));
        }
        Ok(())
    }

    /// `start_deg, start_deg + step, …` up to and including `max_deg`.
    pub fn degrees(&self) -> Vec<usize> {
        (self.start_deg..=self.max_deg).step_by(self.step.max(1)).collect()
    }

    pub fn num_steps(&self) -> usize {
        self.degrees().len()
    }

    /// Non-exact methods of `methods`, in declaration order, without repeats.
    pub fn swept_methods(&self) -> Vec<ApproxMethod> {
        ApproxMethod::ALL
            .iter()
            .copied()
            .filter(|m| m.has_generator() && self.methods.contains(m))
            .collect()
    }
}

/// Per-method, per-degree, per-run measurements of one experiment.
#[derive(Debug, Clone)]
pub struct ExperimentResults {
    methods: Vec<ApproxMethod>,
    degrees: Vec<usize>,
    shift: usize,
    errors: Array3<f64>,
    mses: Array3<f64>,
    ranks: Array3<f64>,
}

impl ExperimentResults {
    pub fn methods(&self) -> &[ApproxMethod] {
        &self.methods
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Number of features used at each degree step.
    pub fn features(&self) -> Vec<usize> {
        self.degrees.iter().map(|d| d + self.shift).collect()
    }

    /// Relative Frobenius errors, indexed `[method, degree step, run]`.
    pub fn errors(&self) -> &Array3<f64> {
        &self.errors
    }

    pub fn mses(&self) -> &Array3<f64> {
        &self.mses
    }

    pub fn ranks(&self) -> &Array3<f64> {
        &self.ranks
    }

    /// `(errors, mses, ranks)` averaged over runs, each `[method, degree step]`.
    pub fn mean_over_runs(&self) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        let mean = |a: &Array3<f64>| a.mean_axis(Axis(2)).unwrap_or_else(|| Array2::zeros((a.dim().0, a.dim().1)));
        (mean(&self.errors), mean(&self.mses), mean(&self.ranks))
    }
}

/// Runs the sweep without progress reporting.
pub fn experiment<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    config: &ExperimentConfig,
    rng: &mut R,
) -> Result<ExperimentResults> {
    experiment_with_progress(x, y, config, rng, &ProgressBar::hidden())
}

/**
Compares every swept method against the exact kernel.

The exact kernel is computed once. Then for each method (declaration
order), each degree and each run, fresh weights are drawn from `rng`, the
approximate kernel is built and its relative error, MSE and numerical rank
are stored at `[method, step, run]`. The first failure aborts the whole
experiment and is reported with the method, kernel, feature count and run
that produced it. `progress` advances once per method.
 */
pub fn experiment_with_progress<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    config: &ExperimentConfig,
    rng: &mut R,
    progress: &ProgressBar,
) -> Result<ExperimentResults> {
    config.validate()?;
    let methods = config.swept_methods();
    let degrees = config.degrees();
    let shape = (methods.len(), degrees.len(), config.runs);
    let mut errors = Array3::<f64>::zeros(shape);
    let mut mses = Array3::<f64>::zeros(shape);
    let mut ranks = Array3::<f64>::zeros(shape);

    let exact = config.kernel.exact(x, y)?;
    info!(
        "exact {} kernel computed for {} x {} points; sweeping {} methods over {} degrees, {} runs each",
        config.kernel,
        x.nrows(),
        y.nrows(),
        methods.len(),
        degrees.len(),
        config.runs
    );

    progress.set_length(methods.len() as u64);
    for (i, &method) in methods.iter().enumerate() {
        progress.set_message(method.name());
        for (j, &deg) in degrees.iter().enumerate() {
            let k = deg + config.shift;
            debug!("{}: degree {} (k = {})", method, deg, k);
            for r in 0..config.runs {
                let wrap = |source: FeatureMapError| FeatureMapError::RunFailed {
                    method,
                    kernel: config.kernel,
                    k,
                    run: r,
                    source: Box::new(source),
                };
                let approx = kernel(x, y, k, config.kernel, method, rng).map_err(wrap)?;
                errors[[i, j, r]] = relative_error(&exact, &approx).map_err(wrap)?;
                mses[[i, j, r]] = mean_squared_error(&exact, &approx).map_err(wrap)?;
                ranks[[i, j, r]] = numerical_rank(&approx) as f64;
            }
        }
        info!("{} done", method);
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(ExperimentResults {
        methods,
        degrees,
        shift: config.shift,
        errors,
        mses,
        ranks,
    })
}

/// A progress bar styled for experiment sweeps.
pub fn sweep_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Benchmark datasets with the sweep settings they were studied with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetPreset {
    #[serde(rename = "USPS")]
    Usps,
    Powerplant,
    #[serde(rename = "LETTER")]
    Letter,
    #[serde(rename = "MNIST")]
    Mnist,
    #[serde(rename = "CIFAR100")]
    Cifar100,
    #[serde(rename = "LEUKEMIA")]
    Leukemia,
}

/// `(start_deg, max_deg, runs, shift, step, sample_size, split_index)`
type PresetParams = (usize, usize, usize, usize, usize, usize, usize);

impl DatasetPreset {
    pub const ALL: [DatasetPreset; 6] = [
        DatasetPreset::Usps,
        DatasetPreset::Powerplant,
        DatasetPreset::Letter,
        DatasetPreset::Mnist,
        DatasetPreset::Cifar100,
        DatasetPreset::Leukemia,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatasetPreset::Usps => "USPS",
            DatasetPreset::Powerplant => "Powerplant",
            DatasetPreset::Letter => "LETTER",
            DatasetPreset::Mnist => "MNIST",
            DatasetPreset::Cifar100 => "CIFAR100",
            DatasetPreset::Leukemia => "LEUKEMIA",
        }
    }

    fn params(&self) -> PresetParams {
        match self {
            DatasetPreset::Usps => (1, 5, 500, 0, 1, 550, 4500),
            DatasetPreset::Powerplant => (1, 5, 500, 0, 1, 550, 8500),
            DatasetPreset::Letter => (1, 5, 500, 0, 1, 550, 10000),
            DatasetPreset::Mnist => (1, 5, 100, 0, 1, 550, 50000),
            DatasetPreset::Cifar100 => (1, 5, 50, 0, 1, 550, 50000),
            DatasetPreset::Leukemia => (1, 5, 10, 0, 1, 10, 38),
        }
    }

    pub fn input_dim(&self) -> usize {
        match self {
            DatasetPreset::Powerplant => 4,
            DatasetPreset::Letter => 16,
            DatasetPreset::Usps => 256,
            DatasetPreset::Mnist => 784,
            DatasetPreset::Cifar100 => 3072,
            DatasetPreset::Leukemia => 7129,
        }
    }

    /// Points subsampled from the training set for kernel comparisons.
    pub fn sample_size(&self) -> usize {
        self.params().5
    }

    /// Rows before this index are training data, the rest test data.
    pub fn split_index(&self) -> usize {
        self.params().6
    }

    pub fn config(&self, kernel: KernelFamily) -> ExperimentConfig {
        let (start_deg, max_deg, runs, shift, step, _, _) = self.params();
        ExperimentConfig {
            start_deg,
            max_deg,
            step,
            shift,
            runs,
            kernel,
            methods: default_methods(),
        }
    }
}

impl fmt::Display for DatasetPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DatasetPreset {
    type Err = FeatureMapError;

    fn from_str(s: &str) -> Result<Self> {
        DatasetPreset::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FeatureMapError::InvalidArgument(format!("no such dataset: {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_assist::random_points;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_end_to_end_rbf() {
        let mut rng = StdRng::seed_from_u64(81);
        let x = random_points(20, 4, &mut rng);
        let config = ExperimentConfig::default();
        let results = experiment(&x, &x, &config, &mut rng).unwrap();

        assert_eq!(results.errors().dim(), (6, 3, 3));
        assert_eq!(results.mses().dim(), (6, 3, 3));
        assert_eq!(results.ranks().dim(), (6, 3, 3));
        assert_eq!(results.methods(), &ApproxMethod::DEFAULT_SWEEP[..]);
        assert_eq!(results.degrees(), &[1, 2, 3]);
        assert_eq!(results.features(), vec![2, 3, 4]);

        for tensor in [results.errors(), results.mses()] {
            assert!(tensor.iter().all(|v| v.is_finite() && *v >= 0.0));
        }
        for ((_, j, _), rank) in results.ranks().indexed_iter() {
            assert!(*rank >= 1.0 && *rank <= results.features()[j] as f64);
        }
    }

    #[test]
    fn test_every_kernel_family() {
        let mut rng = StdRng::seed_from_u64(82);
        let x = random_points(10, 3, &mut rng);
        let y = random_points(7, 3, &mut rng);
        for family in KernelFamily::ALL {
            let config = ExperimentConfig {
                kernel: family,
                runs: 2,
                ..ExperimentConfig::default()
            };
            let results = experiment(&x, &y, &config, &mut rng).unwrap();
            assert_eq!(results.errors().dim(), (6, 3, 2));
            let (errors, mses, ranks) = results.mean_over_runs();
            assert_eq!(errors.dim(), (6, 3));
            assert!(mses.iter().all(|v| v.is_finite()));
            assert!(ranks.iter().all(|&r| r <= 7.0));
        }
    }

    #[test]
    fn test_degrees_and_steps() {
        let config = ExperimentConfig {
            start_deg: 1,
            max_deg: 5,
            step: 2,
            ..ExperimentConfig::default()
        };
        assert_eq!(config.degrees(), vec![1, 3, 5]);
        assert_eq!(config.num_steps(), 3);

        let config = ExperimentConfig {
            start_deg: 2,
            max_deg: 6,
            step: 3,
            ..ExperimentConfig::default()
        };
        assert_eq!(config.degrees(), vec![2, 5]);
    }

    #[test]
    fn test_method_selection_keeps_declaration_order() {
        let config = ExperimentConfig {
            methods: vec![
                ApproxMethod::Butterfly,
                ApproxMethod::Exact,
                ApproxMethod::Qmc,
                ApproxMethod::Gaussian,
                ApproxMethod::Butterfly,
            ],
            ..ExperimentConfig::default()
        };
        assert_eq!(
            config.swept_methods(),
            vec![ApproxMethod::Gaussian, ApproxMethod::Butterfly, ApproxMethod::Qmc]
        );

        let mut rng = StdRng::seed_from_u64(83);
        let x = random_points(8, 3, &mut rng);
        let results = experiment(&x, &x, &config, &mut rng).unwrap();
        assert_eq!(results.errors().dim(), (3, 3, 3));
    }

    #[test]
    fn test_invalid_configs() {
        let base = ExperimentConfig::default();
        let bad = [
            ExperimentConfig { start_deg: 0, ..base.clone() },
            ExperimentConfig { max_deg: 0, ..base.clone() },
            ExperimentConfig { step: 0, ..base.clone() },
            ExperimentConfig { runs: 0, ..base.clone() },
            ExperimentConfig { methods: vec![ApproxMethod::Exact], ..base.clone() },
        ];
        let mut rng = StdRng::seed_from_u64(84);
        let x = random_points(5, 2, &mut rng);
        for config in &bad {
            assert!(matches!(config.validate(), Err(FeatureMapError::InvalidArgument(_))));
            assert!(experiment(&x, &x, config, &mut rng).is_err());
        }
    }

    #[test]
    fn test_run_failure_identifies_the_run() {
        // Zero points: the exact arc-cosine-1 kernel is all zeros, so the first
        // relative error divides by zero.
        let x = DMatrix::<f64>::zeros(4, 3);
        let config = ExperimentConfig {
            kernel: KernelFamily::Arccos1,
            ..ExperimentConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(85);
        match experiment(&x, &x, &config, &mut rng) {
            Err(FeatureMapError::RunFailed { method, kernel, k, run, source }) => {
                assert_eq!(method, ApproxMethod::Gaussian);
                assert_eq!(kernel, KernelFamily::Arccos1);
                assert_eq!(k, 2);
                assert_eq!(run, 0);
                assert!(matches!(*source, FeatureMapError::DivisionByZero(_)));
            }
            other => panic!("expected a run failure, got {:?}", other),
        }
    }

    #[test]
    fn test_config_from_json() {
        let config: ExperimentConfig = serde_json::from_str(
            r#"{"start_deg": 2, "max_deg": 4, "runs": 5, "kernel": "Arccos 1", "methods": ["G", "B dense", "QMC"]}"#,
        )
        .unwrap();
        assert_eq!(config.start_deg, 2);
        assert_eq!(config.step, 1);
        assert_eq!(config.shift, 1);
        assert_eq!(config.kernel, KernelFamily::Arccos1);
        assert_eq!(
            config.methods,
            vec![ApproxMethod::Gaussian, ApproxMethod::ButterflyDense, ApproxMethod::Qmc]
        );
        assert!(config.validate().is_ok());

        assert!(serde_json::from_str::<ExperimentConfig>(r#"{"kernel": "Laplace"}"#).is_err());
    }

    #[test]
    fn test_presets() {
        let preset: DatasetPreset = "letter".parse().unwrap();
        assert_eq!(preset, DatasetPreset::Letter);
        assert_eq!(preset.input_dim(), 16);
        assert_eq!(preset.sample_size(), 550);
        assert_eq!(preset.split_index(), 10000);

        let config = DatasetPreset::Leukemia.config(KernelFamily::Arccos0);
        assert_eq!((config.start_deg, config.max_deg, config.runs, config.shift, config.step), (1, 5, 10, 0, 1));
        assert!(config.validate().is_ok());

        assert!(matches!("IMAGENET".parse::<DatasetPreset>(), Err(FeatureMapError::InvalidArgument(_))));
    }
}
