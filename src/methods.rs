use log::debug;
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::basics::generate_random_weights;
use crate::butterfly::{generate_butterfly_weights, generate_fast_butterfly_weights};
use crate::errors::{FeatureMapError, Result};
use crate::householder::generate_householder_weights;
use crate::kernels::{
    approximate_arccos0_kernel, approximate_arccos1_kernel, approximate_rbf_kernel, arccos0_kernel,
    arccos1_kernel, check_point_sets, rbf_kernel,
};
use crate::mapping::{fast_batch_approx_arccos0, fast_batch_approx_arccos1, fast_batch_approx_rbf};
use crate::metrics::{mean_squared_error, relative_error};
use crate::operator::WeightArtifact;
use crate::qmc::generate_sobol_weights;
use crate::rom::{generate_gort_weights, generate_rademacher_weights};

/// How a kernel matrix is obtained for a given method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPath {
    /// Closed form, no weights.
    Exact,
    /// Project through the weight artifact and multiply feature matrices.
    Matrix,
    /// Row-batched mapping through a factorized artifact.
    FastBatch,
}

/// Ways of producing a kernel matrix. Declaration order is the row order of
/// experiment result tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApproxMethod {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "G")]
    Gaussian,
    #[serde(rename = "Gort")]
    OrthogonalGaussian,
    #[serde(rename = "ROM")]
    Rademacher,
    #[serde(rename = "H")]
    Householder,
    #[serde(rename = "B dense")]
    ButterflyDense,
    #[serde(rename = "B")]
    Butterfly,
    #[serde(rename = "QMC")]
    Qmc,
}

impl ApproxMethod {
    pub const ALL: [ApproxMethod; 8] = [
        ApproxMethod::Exact,
        ApproxMethod::Gaussian,
        ApproxMethod::OrthogonalGaussian,
        ApproxMethod::Rademacher,
        ApproxMethod::Householder,
        ApproxMethod::ButterflyDense,
        ApproxMethod::Butterfly,
        ApproxMethod::Qmc,
    ];

    /// Methods swept by default: everything random except the opt-in QMC.
    pub const DEFAULT_SWEEP: [ApproxMethod; 6] = [
        ApproxMethod::Gaussian,
        ApproxMethod::OrthogonalGaussian,
        ApproxMethod::Rademacher,
        ApproxMethod::Householder,
        ApproxMethod::ButterflyDense,
        ApproxMethod::Butterfly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ApproxMethod::Exact => "exact",
            ApproxMethod::Gaussian => "G",
            ApproxMethod::OrthogonalGaussian => "Gort",
            ApproxMethod::Rademacher => "ROM",
            ApproxMethod::Householder => "H",
            ApproxMethod::ButterflyDense => "B dense",
            ApproxMethod::Butterfly => "B",
            ApproxMethod::Qmc => "QMC",
        }
    }

    pub fn evaluation_path(&self) -> EvaluationPath {
        match self {
            ApproxMethod::Exact => EvaluationPath::Exact,
            ApproxMethod::Butterfly => EvaluationPath::FastBatch,
            _ => EvaluationPath::Matrix,
        }
    }

    pub fn has_generator(&self) -> bool {
        !matches!(self, ApproxMethod::Exact)
    }

    /// Draws fresh weights for `k` features on `d`-dimensional inputs.
    pub fn generate<R: Rng + ?Sized>(&self, k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
        match self {
            ApproxMethod::Exact => Err(FeatureMapError::UnsupportedCombination(
                "the exact kernel has no weight generator".to_string(),
            )),
            ApproxMethod::Gaussian => generate_random_weights(k, d, rng),
            ApproxMethod::OrthogonalGaussian => generate_gort_weights(k, d, rng),
            ApproxMethod::Rademacher => generate_rademacher_weights(k, d, rng),
            ApproxMethod::Householder => generate_householder_weights(k, d, rng),
            ApproxMethod::ButterflyDense => generate_butterfly_weights(k, d, rng),
            ApproxMethod::Butterfly => generate_fast_butterfly_weights(k, d, rng),
            ApproxMethod::Qmc => generate_sobol_weights(k, d, rng),
        }
    }
}

impl fmt::Display for ApproxMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ApproxMethod {
    type Err = FeatureMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "exact" => Ok(ApproxMethod::Exact),
            "G" => Ok(ApproxMethod::Gaussian),
            "Gort" => Ok(ApproxMethod::OrthogonalGaussian),
            "ROM" => Ok(ApproxMethod::Rademacher),
            "H" => Ok(ApproxMethod::Householder),
            "B dense" | "B-dense" => Ok(ApproxMethod::ButterflyDense),
            "B" => Ok(ApproxMethod::Butterfly),
            "QMC" => Ok(ApproxMethod::Qmc),
            other => Err(FeatureMapError::InvalidArgument(format!(
                "no such approximation type: {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelFamily {
    #[serde(rename = "RBF")]
    Rbf,
    #[serde(rename = "Arccos 0")]
    Arccos0,
    #[serde(rename = "Arccos 1")]
    Arccos1,
}

impl KernelFamily {
    pub const ALL: [KernelFamily; 3] = [KernelFamily::Rbf, KernelFamily::Arccos0, KernelFamily::Arccos1];

    pub fn name(&self) -> &'static str {
        match self {
            KernelFamily::Rbf => "RBF",
            KernelFamily::Arccos0 => "Arccos 0",
            KernelFamily::Arccos1 => "Arccos 1",
        }
    }

    pub fn exact(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        match self {
            KernelFamily::Rbf => rbf_kernel(x, y),
            KernelFamily::Arccos0 => arccos0_kernel(x, y),
            KernelFamily::Arccos1 => arccos1_kernel(x, y),
        }
    }

    pub fn approximate(&self, x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
        match self {
            KernelFamily::Rbf => approximate_rbf_kernel(x, y, artifact),
            KernelFamily::Arccos0 => approximate_arccos0_kernel(x, y, artifact),
            KernelFamily::Arccos1 => approximate_arccos1_kernel(x, y, artifact),
        }
    }

    pub fn fast_batch(&self, x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
        match self {
            KernelFamily::Rbf => fast_batch_approx_rbf(x, y, artifact),
            KernelFamily::Arccos0 => fast_batch_approx_arccos0(x, y, artifact),
            KernelFamily::Arccos1 => fast_batch_approx_arccos1(x, y, artifact),
        }
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for KernelFamily {
    type Err = FeatureMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "RBF" | "rbf" => Ok(KernelFamily::Rbf),
            "Arccos 0" | "arccos0" => Ok(KernelFamily::Arccos0),
            "Arccos 1" | "arccos1" => Ok(KernelFamily::Arccos1),
            other => Err(FeatureMapError::InvalidArgument(format!("no such kernel type: {:?}", other))),
        }
    }
}

/// Kernel matrix between `x` and `y` along an explicitly chosen evaluation path.
pub fn kernel_with_path<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    k: usize,
    family: KernelFamily,
    method: ApproxMethod,
    path: EvaluationPath,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    check_point_sets(x, y)?;
    match (method, path) {
        (ApproxMethod::Exact, EvaluationPath::Exact) => family.exact(x, y),
        (ApproxMethod::Exact, _) | (_, EvaluationPath::Exact) => Err(FeatureMapError::UnsupportedCombination(
            format!("{:?} evaluation is not available for method {}", path, method),
        )),
        (_, EvaluationPath::Matrix) => {
            let artifact = method.generate(k, x.ncols(), rng)?;
            family.approximate(x, y, &artifact)
        }
        (_, EvaluationPath::FastBatch) => {
            let artifact = method.generate(k, x.ncols(), rng)?;
            family.fast_batch(x, y, &artifact)
        }
    }
}

/// Exact kernel for `Exact`, otherwise a fresh approximation with `k` features
/// evaluated along the method's own path.
pub fn kernel<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    k: usize,
    family: KernelFamily,
    method: ApproxMethod,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    kernel_with_path(x, y, k, family, method, method.evaluation_path(), rng)
}

/// Same as [`kernel`], with both names parsed before any computation.
pub fn kernel_by_name<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    k: usize,
    kernel_type: &str,
    approx_type: &str,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    let method: ApproxMethod = approx_type.parse()?;
    let family: KernelFamily = kernel_type.parse()?;
    kernel(x, y, k, family, method, rng)
}

#[derive(Debug, Clone)]
pub struct Approximation {
    pub kernel: DMatrix<f64>,
    pub error: f64,
    pub mse: f64,
}

/// One approximate kernel together with its error and MSE against `exact`.
pub fn approximation<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    k: usize,
    family: KernelFamily,
    method: ApproxMethod,
    exact: &DMatrix<f64>,
    rng: &mut R,
) -> Result<Approximation> {
    let kernel = kernel(x, y, k, family, method, rng)?;
    let error = relative_error(exact, &kernel)?;
    let mse = mean_squared_error(exact, &kernel)?;
    debug!("{} / {} with k = {}: error {:.4e}, mse {:.4e}", method, family, k, error, mse);
    Ok(Approximation { kernel, error, mse })
}
