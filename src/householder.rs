use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, StandardNormal};

use crate::basics::{check_dimensions, radius, random_phases};
use crate::errors::{FeatureMapError, Result};
use crate::operator::{check_input, LinearOperator, Projection, WeightArtifact};

/// A Haar-orthogonal `d × d` transform `H₀ H₁ … H_{d-2} · diag(signs)` scaled by per-column radii.
///
/// Reflection `i` is `I − 2uuᵀ` with `u` unit length and zero on the first
/// `i` coordinates.
#[derive(Debug, Clone)]
pub struct HouseholderBlock {
    reflections: Vec<DVector<f64>>,
    scales: DVector<f64>,
}

impl HouseholderBlock {
    fn sample<R: Rng + ?Sized>(d: usize, rng: &mut R) -> Result<Self> {
        let mut reflections = Vec::with_capacity(d.saturating_sub(1));
        for i in 0..d.saturating_sub(1) {
            let mut u = DVector::<f64>::zeros(d);
            for j in i..d {
                u[j] = StandardNormal.sample(rng);
            }
            // Reflect x onto -sign(x_i)·‖x‖·e_i, the same vector Householder QR would produce.
            let norm = u.norm();
            if norm == 0.0 {
                continue;
            }
            u[i] += if u[i] < 0.0 { -norm } else { norm };
            let unit_norm = u.norm();
            u /= unit_norm;
            reflections.push(u);
        }

        let coin = Bernoulli::new(0.5)
            .map_err(|e| FeatureMapError::InvalidArgument(format!("reflection signs: {}", e)))?;
        let radii = radius(d, d, rng)?;
        let scales = DVector::from_fn(d, |j, _| if coin.sample(rng) { radii[j] } else { -radii[j] });
        Ok(Self { reflections, scales })
    }

    /// Right-multiplies every row of `points` by the block, one reflection at a time.
    fn transform(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
        let mut y = points.clone();
        for u in &self.reflections {
            let yu = &y * u;
            y.ger(-2.0, &yu, u, 1.0);
        }
        for (j, s) in self.scales.iter().enumerate() {
            y.column_mut(j).scale_mut(*s);
        }
        y
    }
}

/// Householder random features (`H`): never stored as a dense matrix.
#[derive(Debug, Clone)]
pub struct HouseholderProjection {
    dim: usize,
    features: usize,
    blocks: Vec<HouseholderBlock>,
}

impl HouseholderProjection {
    pub fn sample<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<Self> {
        check_dimensions(k, d)?;
        let blocks = (0..k.div_ceil(d))
            .map(|_| HouseholderBlock::sample(d, rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { dim: d, features: k, blocks })
    }

    pub fn num_reflections(&self) -> usize {
        self.blocks.iter().map(|b| b.reflections.len()).sum()
    }
}

impl LinearOperator for HouseholderProjection {
    fn input_dim(&self) -> usize {
        self.dim
    }

    fn output_dim(&self) -> usize {
        self.features
    }

    fn apply(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_input(self, points)?;
        let mut out = DMatrix::zeros(points.nrows(), self.features);
        for (b, block) in self.blocks.iter().enumerate() {
            let first = b * self.dim;
            let width = self.dim.min(self.features - first);
            let y = block.transform(points);
            out.columns_mut(first, width).copy_from(&y.columns(0, width));
        }
        Ok(out)
    }

    fn to_dense(&self) -> DMatrix<f64> {
        let identity = DMatrix::identity(self.dim, self.dim);
        // The identity always has `dim` columns, so apply cannot fail here.
        self.apply(&identity).unwrap_or_else(|_| DMatrix::zeros(self.dim, self.features))
    }
}

pub fn generate_householder_weights<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
    let projection = HouseholderProjection::sample(k, d, rng)?;
    debug!(
        "generated householder projection, d = {}, k = {}, reflections = {}",
        d,
        k,
        projection.num_reflections()
    );
    WeightArtifact::new(Projection::Householder(projection), random_phases(k, rng))
}
