use log::debug;
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::basics::{check_dimensions, dense_artifact, gaussian_matrix, padded_dimension, radius};
use crate::errors::{FeatureMapError, Result};
use crate::operator::WeightArtifact;

/// Number of `HD` factors in a structured orthogonal (S-Rademacher) block.
const ROM_FACTORS: usize = 3;

/**
Samples an `n × n` orthogonal matrix from the Haar measure.

A Gaussian matrix is QR-factorized and the sign of each diagonal entry of
`R` is folded back into the matching column of `Q`; without that correction
`Q` is orthogonal but not uniformly distributed.
 */
pub fn haar_orthogonal<R: Rng + ?Sized>(n: usize, rng: &mut R) -> DMatrix<f64> {
    let matrix = gaussian_matrix(n, n, rng);
    let (mut q, r) = matrix.qr().unpack();
    for i in 0..q.ncols() {
        let sign = if r[(i, i)] < 0.0 { -1.0 } else { 1.0 };
        q.column_mut(i).scale_mut(sign);
    }
    q
}

/**
Orthogonal Gaussian weights (`Gort`).

* Inputs:
`k` is the number of features, `d` the input dimension.

* Output:
A `d × k` matrix made of `ceil(k/d)` independent Haar-orthogonal blocks whose
columns are rescaled by chi(d) radii. Columns inside a block are exactly
orthogonal, while each column on its own is still `N(0, I_d)`.
 */
pub fn generate_gort_weights<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
    check_dimensions(k, d)?;
    let blocks = k.div_ceil(d);
    debug!("generating orthogonal gaussian weights, d = {}, k = {}, blocks = {}", d, k, blocks);

    let mut weights = DMatrix::zeros(d, k);
    for b in 0..blocks {
        let q = haar_orthogonal(d, rng);
        let radii = radius(d, d, rng)?;
        let first = b * d;
        for j in 0..d.min(k - first) {
            weights.set_column(first + j, &(q.column(j) * radii[j]));
        }
    }
    dense_artifact(weights, rng)
}

/// In-place unnormalized Walsh-Hadamard transform; `v.len()` must be a power of two.
pub fn walsh_hadamard(v: &mut [f64]) {
    let n = v.len();
    let mut h = 1;
    while h < n {
        for start in (0..n).step_by(2 * h) {
            for i in start..start + h {
                let a = v[i];
                let b = v[i + h];
                v[i] = a + b;
                v[i + h] = a - b;
            }
        }
        h *= 2;
    }
}

/// The `d0 × d0` orthogonal matrix `∏ H·Dᵢ / √d0` built column by column with the fast transform.
fn rademacher_block<R: Rng + ?Sized>(d0: usize, rng: &mut R) -> Result<DMatrix<f64>> {
    let coin = Bernoulli::new(0.5)
        .map_err(|e| FeatureMapError::InvalidArgument(format!("rademacher signs: {}", e)))?;
    let diagonals: Vec<Vec<f64>> = (0..ROM_FACTORS)
        .map(|_| (0..d0).map(|_| if coin.sample(rng) { 1.0 } else { -1.0 }).collect())
        .collect();

    let norm = (d0 as f64).sqrt();
    let mut block = DMatrix::<f64>::identity(d0, d0);
    // Column-major storage: column j is the contiguous slice [j*d0, (j+1)*d0).
    for column in block.as_mut_slice().chunks_mut(d0) {
        for signs in diagonals.iter().rev() {
            for (v, s) in column.iter_mut().zip(signs) {
                *v *= s;
            }
            walsh_hadamard(column);
            for v in column.iter_mut() {
                *v /= norm;
            }
        }
    }
    Ok(block)
}

/**
Structured orthogonal random weights (`ROM`), the S-Rademacher construction.

Each block is `H D₁ H D₂ H D₃` (normalized) on `d0 = next_power_of_two(d)`
coordinates. Only the first `d` rows are kept, which is the same as zero
padding the inputs, and every column is rescaled by a chi(d0) radius.
 */
pub fn generate_rademacher_weights<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
    check_dimensions(k, d)?;
    let d0 = padded_dimension(d);
    let blocks = k.div_ceil(d0);
    debug!("generating rademacher weights, d = {}, d0 = {}, k = {}, blocks = {}", d, d0, k, blocks);

    let mut weights = DMatrix::zeros(d, k);
    for b in 0..blocks {
        let block = rademacher_block(d0, rng)?;
        let radii = radius(d0, d0, rng)?;
        let first = b * d0;
        for j in 0..d0.min(k - first) {
            for i in 0..d {
                weights[(i, first + j)] = block[(i, j)] * radii[j];
            }
        }
    }
    dense_artifact(weights, rng)
}
