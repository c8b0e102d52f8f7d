use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

use crate::errors::{FeatureMapError, Result};
use crate::operator::WeightArtifact;

/// Both point sets must be non-empty and share their dimension.
pub fn check_point_sets(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<()> {
    if x.nrows() == 0 || y.nrows() == 0 || x.ncols() == 0 {
        return Err(FeatureMapError::InvalidDimension(format!(
            "point sets must be non-empty, got {} x {} and {} x {}",
            x.nrows(),
            x.ncols(),
            y.nrows(),
            y.ncols()
        )));
    }
    if x.ncols() != y.ncols() {
        return Err(FeatureMapError::InvalidDimension(format!(
            "point sets have different dimensions: {} and {}",
            x.ncols(),
            y.ncols()
        )));
    }
    Ok(())
}

/// Bandwidth used for the RBF kernel on `d`-dimensional inputs.
pub fn rbf_gamma(d: usize) -> f64 {
    1.0 / d as f64
}

/// `exp(-γ‖xᵢ − yⱼ‖²)` with `γ = 1/d`.
pub fn rbf_kernel(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    check_point_sets(x, y)?;
    let gamma = rbf_gamma(x.ncols());
    Ok(DMatrix::from_fn(x.nrows(), y.nrows(), |i, j| {
        let sq_dist = (x.row(i) - y.row(j)).norm_squared();
        (-gamma * sq_dist).exp()
    }))
}

/// Angle between two rows; a zero vector counts as orthogonal to everything.
fn angle(x: &DMatrix<f64>, y: &DMatrix<f64>, i: usize, j: usize) -> (f64, f64, f64) {
    let nx = x.row(i).norm();
    let ny = y.row(j).norm();
    if nx == 0.0 || ny == 0.0 {
        return (PI / 2.0, nx, ny);
    }
    let cos = (x.row(i).dot(&y.row(j)) / (nx * ny)).clamp(-1.0, 1.0);
    (cos.acos(), nx, ny)
}

/// Arc-cosine kernel of degree 0: `1 − θ/π`.
pub fn arccos0_kernel(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    check_point_sets(x, y)?;
    Ok(DMatrix::from_fn(x.nrows(), y.nrows(), |i, j| {
        let (theta, _, _) = angle(x, y, i, j);
        1.0 - theta / PI
    }))
}

/// Arc-cosine kernel of degree 1: `‖x‖‖y‖(sin θ + (π − θ) cos θ) / π`.
pub fn arccos1_kernel(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    check_point_sets(x, y)?;
    Ok(DMatrix::from_fn(x.nrows(), y.nrows(), |i, j| {
        let (theta, nx, ny) = angle(x, y, i, j);
        nx * ny * (theta.sin() + (PI - theta) * theta.cos()) / PI
    }))
}

/// Elementwise map turning projections into random features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Nonlinearity {
    /// `√(2/k)·cos(√(2γ)·p + b)`
    Fourier { gamma: f64 },
    /// `√(2/k)·Θ(p)` with `Θ(0) = 1/2`
    Step,
    /// `√(2/k)·max(p, 0)`
    Relu,
}

impl Nonlinearity {
    /// `projections` is `n × k`; `phases` has length `k`.
    pub fn features(&self, mut projections: DMatrix<f64>, phases: &DVector<f64>) -> DMatrix<f64> {
        let scale = (2.0 / projections.ncols() as f64).sqrt();
        for (j, mut column) in projections.column_iter_mut().enumerate() {
            match *self {
                Nonlinearity::Fourier { gamma } => {
                    let freq = (2.0 * gamma).sqrt();
                    column.apply(|p| *p = scale * (freq * *p + phases[j]).cos());
                }
                Nonlinearity::Step => column.apply(|p| {
                    *p = scale
                        * if *p > 0.0 {
                            1.0
                        } else if *p < 0.0 {
                            0.0
                        } else {
                            0.5
                        }
                }),
                Nonlinearity::Relu => column.apply(|p| *p = scale * p.max(0.0)),
            }
        }
        projections
    }
}

/// `Φ(x)·Φ(y)ᵀ`, computing the feature map once when `x` and `y` are the same matrix.
pub(crate) fn feature_kernel(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    artifact: &WeightArtifact,
    nonlinearity: Nonlinearity,
) -> Result<DMatrix<f64>> {
    check_point_sets(x, y)?;
    let fx = nonlinearity.features(artifact.project(x)?, artifact.phases());
    if std::ptr::eq(x, y) {
        return Ok(&fx * fx.transpose());
    }
    let fy = nonlinearity.features(artifact.project(y)?, artifact.phases());
    Ok(&fx * fy.transpose())
}

pub fn approximate_rbf_kernel(x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
    let gamma = rbf_gamma(x.ncols());
    feature_kernel(x, y, artifact, Nonlinearity::Fourier { gamma })
}

pub fn approximate_arccos0_kernel(x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
    feature_kernel(x, y, artifact, Nonlinearity::Step)
}

pub fn approximate_arccos1_kernel(x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
    feature_kernel(x, y, artifact, Nonlinearity::Relu)
}
