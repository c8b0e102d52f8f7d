use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Bernoulli, Beta, Distribution};

use crate::basics::{check_dimensions, dense_artifact, padded_dimension, radius, random_phases};
use crate::errors::{FeatureMapError, Result};
use crate::operator::{check_input, LinearOperator, Projection, WeightArtifact};

// ─── Butterfly stages ───────────────────────────────────────────────────
// A block on d0 = 2^L coordinates is B₀ B₁ … B_{L-1}. Stage s pairs
// coordinate i with i + 2^s (for i with bit s clear) through a 2×2 rotation,
// so applying a block costs O(d0 log d0) instead of O(d0²).

/// One sparse factor: a rotation `(cos, sin)` for every pair `(i, i + stride)`.
#[derive(Debug, Clone)]
pub struct ButterflyStage {
    stride: usize,
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl ButterflyStage {
    /// Rotation angles with `cos²θ ~ Beta(stride/2, stride/2)` and random signs.
    ///
    /// That is the law of the mass split between two halves of `stride`
    /// coordinates of a uniform unit vector, so every column of the composed
    /// block is uniformly distributed on the sphere.
    fn sample<R: Rng + ?Sized>(d0: usize, stride: usize, rng: &mut R) -> Result<Self> {
        let half = stride as f64 / 2.0;
        let beta = Beta::new(half, half)
            .map_err(|e| FeatureMapError::InvalidArgument(format!("butterfly angle law: {}", e)))?;
        let coin = Bernoulli::new(0.5)
            .map_err(|e| FeatureMapError::InvalidArgument(format!("butterfly signs: {}", e)))?;

        let pairs = d0 / 2;
        let mut cos = Vec::with_capacity(pairs);
        let mut sin = Vec::with_capacity(pairs);
        for _ in 0..pairs {
            let b: f64 = beta.sample(rng);
            let c = b.sqrt();
            let s = (1.0 - b).max(0.0).sqrt();
            cos.push(if coin.sample(rng) { c } else { -c });
            sin.push(if coin.sample(rng) { s } else { -s });
        }
        Ok(Self { stride, cos, sin })
    }

    /// `row ← row · B` for this stage.
    fn apply_row(&self, row: &mut [f64]) {
        let h = self.stride;
        let mut pair = 0;
        for start in (0..row.len()).step_by(2 * h) {
            for i in start..start + h {
                let (c, s) = (self.cos[pair], self.sin[pair]);
                let (a, b) = (row[i], row[i + h]);
                row[i] = a * c + b * s;
                row[i + h] = b * c - a * s;
                pair += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ButterflyBlock {
    stages: Vec<ButterflyStage>,
    radii: DVector<f64>,
}

impl ButterflyBlock {
    fn sample<R: Rng + ?Sized>(d0: usize, rng: &mut R) -> Result<Self> {
        let levels = d0.trailing_zeros() as usize;
        let stages = (0..levels)
            .map(|s| ButterflyStage::sample(d0, 1 << s, rng))
            .collect::<Result<Vec<_>>>()?;
        let radii = radius(d0, d0, rng)?;
        Ok(Self { stages, radii })
    }

    /// Runs all stages on a padded row, then scales by the radii.
    pub fn transform_row(&self, row: &mut [f64]) {
        for stage in &self.stages {
            stage.apply_row(row);
        }
        for (v, r) in row.iter_mut().zip(self.radii.iter()) {
            *v *= r;
        }
    }
}

/// Factorized butterfly random features (`B`): stages plus the radii scaling vector.
#[derive(Debug, Clone)]
pub struct ButterflyProjection {
    dim: usize,
    padded: usize,
    features: usize,
    blocks: Vec<ButterflyBlock>,
}

impl ButterflyProjection {
    pub fn padded_dim(&self) -> usize {
        self.padded
    }

    pub fn blocks(&self) -> &[ButterflyBlock] {
        &self.blocks
    }

    /// Maps one point into `out` (length `output_dim`) using a scratch row of length `padded_dim`.
    pub fn map_point(&self, point: &[f64], scratch: &mut [f64], out: &mut [f64]) {
        for (b, block) in self.blocks.iter().enumerate() {
            scratch.fill(0.0);
            scratch[..self.dim].copy_from_slice(point);
            block.transform_row(scratch);
            let first = b * self.padded;
            let width = self.padded.min(self.features - first);
            out[first..first + width].copy_from_slice(&scratch[..width]);
        }
    }
}

impl LinearOperator for ButterflyProjection {
    fn input_dim(&self) -> usize {
        self.dim
    }

    fn output_dim(&self) -> usize {
        self.features
    }

    fn apply(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_input(self, points)?;
        let n = points.nrows();
        let mut out = DMatrix::zeros(n, self.features);
        let mut point = vec![0.0; self.dim];
        let mut scratch = vec![0.0; self.padded];
        let mut mapped = vec![0.0; self.features];
        for i in 0..n {
            for (j, v) in point.iter_mut().enumerate() {
                *v = points[(i, j)];
            }
            self.map_point(&point, &mut scratch, &mut mapped);
            for (j, v) in mapped.iter().enumerate() {
                out[(i, j)] = *v;
            }
        }
        Ok(out)
    }

    fn to_dense(&self) -> DMatrix<f64> {
        let identity = DMatrix::identity(self.dim, self.dim);
        self.apply(&identity).unwrap_or_else(|_| DMatrix::zeros(self.dim, self.features))
    }
}

/// Draws `ceil(k/d0)` butterfly blocks on `d0 = next_power_of_two(d)` coordinates.
pub fn butterfly_params<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<ButterflyProjection> {
    check_dimensions(k, d)?;
    let padded = padded_dimension(d);
    let blocks = (0..k.div_ceil(padded))
        .map(|_| ButterflyBlock::sample(padded, rng))
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "generated butterfly params, d = {}, d0 = {}, k = {}, blocks = {}",
        d,
        padded,
        k,
        blocks.len()
    );
    Ok(ButterflyProjection { dim: d, padded, features: k, blocks })
}

/// `B dense`: the butterfly structure materialized into a `d × k` matrix.
pub fn generate_butterfly_weights<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
    let params = butterfly_params(k, d, rng)?;
    dense_artifact(params.to_dense(), rng)
}

/// `B`: the butterfly structure kept factorized for the fast batch path.
pub fn generate_fast_butterfly_weights<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
    let params = butterfly_params(k, d, rng)?;
    WeightArtifact::new(Projection::Butterfly(params), random_phases(k, rng))
}
