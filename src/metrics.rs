use nalgebra::DMatrix;

use crate::errors::{FeatureMapError, Result};

fn check_same_shape(exact: &DMatrix<f64>, approx: &DMatrix<f64>) -> Result<()> {
    if exact.shape() != approx.shape() {
        return Err(FeatureMapError::InvalidDimension(format!(
            "kernel matrices differ in shape: {:?} and {:?}",
            exact.shape(),
            approx.shape()
        )));
    }
    if exact.is_empty() {
        return Err(FeatureMapError::InvalidDimension(
            "kernel matrices must be non-empty".to_string(),
        ));
    }
    Ok(())
}

/// `‖exact − approx‖_F / ‖exact‖_F`; undefined (and an error) for a zero `exact`.
pub fn relative_error(exact: &DMatrix<f64>, approx: &DMatrix<f64>) -> Result<f64> {
    check_same_shape(exact, approx)?;
    let denominator = exact.norm();
    if denominator == 0.0 {
        return Err(FeatureMapError::DivisionByZero(
            "relative error against a kernel matrix with zero Frobenius norm".to_string(),
        ));
    }
    Ok((exact - approx).norm() / denominator)
}

pub fn mean_squared_error(exact: &DMatrix<f64>, approx: &DMatrix<f64>) -> Result<f64> {
    check_same_shape(exact, approx)?;
    Ok((exact - approx).norm_squared() / exact.len() as f64)
}

/// Number of singular values above `tolerance`.
pub fn numerical_rank_with_tolerance(matrix: &DMatrix<f64>, tolerance: f64) -> usize {
    if matrix.is_empty() {
        return 0;
    }
    let singular_values = matrix.clone().svd(false, false).singular_values;
    singular_values.iter().filter(|&&s| s > tolerance).count()
}

/// Rank with the usual default tolerance `σ_max · max(m, n) · ε`.
pub fn numerical_rank(matrix: &DMatrix<f64>) -> usize {
    if matrix.is_empty() {
        return 0;
    }
    let singular_values = matrix.clone().svd(false, false).singular_values;
    let sigma_max = singular_values.max();
    let (m, n) = matrix.shape();
    let tolerance = sigma_max * m.max(n) as f64 * f64::EPSILON;
    singular_values.iter().filter(|&&s| s > tolerance).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::test_assist::random_points;
    use nalgebra::dmatrix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_identical_inputs() {
        let mut rng = StdRng::seed_from_u64(61);
        let k = random_points(8, 8, &mut rng);
        assert_eq!(relative_error(&k, &k).unwrap(), 0.0);
        assert_eq!(mean_squared_error(&k, &k).unwrap(), 0.0);
    }

    #[test]
    fn test_known_values() {
        let exact = dmatrix![3.0, 0.0;
                             0.0, 4.0];
        let approx = dmatrix![3.0, 1.0;
                              0.0, 4.0];
        assert_relative_eq!(relative_error(&exact, &approx).unwrap(), 0.2, epsilon = 1e-15);
        assert_relative_eq!(mean_squared_error(&exact, &approx).unwrap(), 0.25, epsilon = 1e-15);
    }

    #[test]
    fn test_zero_exact_kernel() {
        let zero = DMatrix::<f64>::zeros(3, 3);
        let approx = DMatrix::from_element(3, 3, 0.1);
        assert!(matches!(relative_error(&zero, &approx), Err(FeatureMapError::DivisionByZero(_))));
        // MSE stays defined
        assert_eq!(mean_squared_error(&zero, &zero).unwrap(), 0.0);
        assert_relative_eq!(mean_squared_error(&zero, &approx).unwrap(), 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = DMatrix::<f64>::identity(2, 2);
        let b = DMatrix::<f64>::identity(3, 3);
        assert!(matches!(relative_error(&a, &b), Err(FeatureMapError::InvalidDimension(_))));
        assert!(matches!(mean_squared_error(&a, &b), Err(FeatureMapError::InvalidDimension(_))));
    }

    #[test]
    fn test_numerical_rank() {
        let mut rng = StdRng::seed_from_u64(62);
        let u = random_points(12, 3, &mut rng);
        let v = random_points(9, 3, &mut rng);
        assert_eq!(numerical_rank(&(&u * v.transpose())), 3);
        assert_eq!(numerical_rank(&DMatrix::<f64>::identity(5, 5)), 5);
        assert_eq!(numerical_rank(&DMatrix::<f64>::zeros(4, 4)), 0);
        assert_eq!(numerical_rank(&DMatrix::<f64>::zeros(0, 0)), 0);

        let diag = DMatrix::from_diagonal(&nalgebra::dvector![1.0, 1e-3, 1e-9]);
        assert_eq!(numerical_rank_with_tolerance(&diag, 1e-6), 2);
    }
}
