use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal, Uniform};
use std::f64::consts::PI;

use crate::errors::{FeatureMapError, Result};
use crate::operator::{DenseProjection, Projection, WeightArtifact};

/// Rejects empty feature or input dimensions before anything is sampled.
pub fn check_dimensions(k: usize, d: usize) -> Result<()> {
    if k == 0 || d == 0 {
        return Err(FeatureMapError::InvalidDimension(format!(
            "number of features ({}) and input dimension ({}) must be greater than 0",
            k, d
        )));
    }
    Ok(())
}

/// Smallest power of two that can hold `d` coordinates (Hadamard and butterfly blocks need it).
pub fn padded_dimension(d: usize) -> usize {
    d.next_power_of_two()
}

/// Appends zero columns so every point has `d0` coordinates.
pub fn pad_data(x: &DMatrix<f64>, d0: usize) -> Result<DMatrix<f64>> {
    let (n, d) = x.shape();
    if d0 < d {
        return Err(FeatureMapError::InvalidDimension(format!(
            "cannot pad points of dimension {} down to {}",
            d, d0
        )));
    }
    Ok(DMatrix::from_fn(n, d0, |i, j| if j < d { x[(i, j)] } else { 0.0 }))
}

/// Samples `count` norms of standard Gaussian vectors in `dof` dimensions.
///
/// Multiplying a uniformly distributed unit direction by such a radius gives
/// a standard Gaussian vector, which is how every orthogonal generator keeps
/// the marginal distribution of its columns equal to that of `G`.
pub fn radius<R: Rng + ?Sized>(dof: usize, count: usize, rng: &mut R) -> Result<DVector<f64>> {
    let chi2 = ChiSquared::new(dof as f64).map_err(|e| {
        FeatureMapError::InvalidArgument(format!("chi distribution with {} degrees of freedom: {}", dof, e))
    })?;
    Ok(DVector::from_fn(count, |_, _| chi2.sample(rng).sqrt()))
}

/// One offset per feature, uniform on `[0, 2π)`.
pub fn random_phases<R: Rng + ?Sized>(k: usize, rng: &mut R) -> DVector<f64> {
    let uniform = Uniform::new(0.0, 2.0 * PI);
    DVector::from_fn(k, |_, _| uniform.sample(rng))
}

pub fn gaussian_matrix<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| StandardNormal.sample(rng))
}

/// Wraps a dense `d × k` weight matrix together with freshly drawn phases.
pub(crate) fn dense_artifact<R: Rng + ?Sized>(weights: DMatrix<f64>, rng: &mut R) -> Result<WeightArtifact> {
    let k = weights.ncols();
    let projection = Projection::Dense(DenseProjection::new(weights)?);
    WeightArtifact::new(projection, random_phases(k, rng))
}

/// Dense Gaussian weights (`G`): every entry i.i.d. standard normal.
pub fn generate_random_weights<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
    check_dimensions(k, d)?;
    debug!("generating dense gaussian weights, d = {}, k = {}", d, k);
    let weights = gaussian_matrix(d, k, rng);
    dense_artifact(weights, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dmatrix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(1, 1).is_ok());
        assert!(matches!(check_dimensions(0, 4), Err(FeatureMapError::InvalidDimension(_))));
        assert!(matches!(check_dimensions(4, 0), Err(FeatureMapError::InvalidDimension(_))));
    }

    #[test]
    fn test_padding() {
        assert_eq!(padded_dimension(1), 1);
        assert_eq!(padded_dimension(4), 4);
        assert_eq!(padded_dimension(5), 8);
        assert_eq!(padded_dimension(784), 1024);

        let x = dmatrix![1.0, 2.0, 3.0;
                         4.0, 5.0, 6.0];
        let padded = pad_data(&x, 4).unwrap();
        assert_eq!(padded, dmatrix![1.0, 2.0, 3.0, 0.0; 4.0, 5.0, 6.0, 0.0]);
        assert!(pad_data(&x, 2).is_err());
    }

    #[test]
    fn test_radius_matches_chi_mean_square() {
        // E[r^2] = dof for a chi-distributed radius
        let mut rng = StdRng::seed_from_u64(7);
        let r = radius(6, 20_000, &mut rng).unwrap();
        assert!(r.iter().all(|&v| v >= 0.0));
        let mean_sq = r.iter().map(|v| v * v).sum::<f64>() / r.len() as f64;
        assert_relative_eq!(mean_sq, 6.0, epsilon = 0.15);
    }

    #[test]
    fn test_random_weights_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let artifact = generate_random_weights(7, 3, &mut rng).unwrap();
        assert_eq!(artifact.input_dim(), 3);
        assert_eq!(artifact.output_dim(), 7);
        assert_eq!(artifact.phases().len(), 7);
        assert!(artifact.phases().iter().all(|&b| (0.0..2.0 * PI).contains(&b)));

        assert!(generate_random_weights(0, 3, &mut rng).is_err());
        assert!(generate_random_weights(3, 0, &mut rng).is_err());
    }

    #[test]
    fn test_random_weights_are_standard_normal() {
        let mut rng = StdRng::seed_from_u64(1);
        let artifact = generate_random_weights(4000, 5, &mut rng).unwrap();
        let w = artifact.projection().as_operator().to_dense();
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        let var = w.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        assert_relative_eq!(mean, 0.0, epsilon = 0.03);
        assert_relative_eq!(var, 1.0, epsilon = 0.05);
    }
}
