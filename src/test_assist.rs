use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::methods::{kernel, ApproxMethod, KernelFamily};
use crate::metrics::relative_error;

/// Generates `n` points in `d` dimensions (one per row) with normally distributed elems
pub fn random_points<R: Rng + ?Sized>(n: usize, d: usize, rng: &mut R) -> DMatrix<f64> {
    DMatrix::from_fn(n, d, |_, _| rng.sample(StandardNormal))
}

pub fn check_approx_equal(a: &DMatrix<f64>, b: &DMatrix<f64>, tolerance: f64) -> bool {
    if a.shape() != b.shape() {
        return false;
    }

    for i in 0..a.nrows() {
        for j in 0..a.ncols() {
            if (a[(i, j)] - b[(i, j)]).abs() > tolerance {
                // println!("{}, {}, {}, {}", i, j, a[(i, j)], b[(i, j)]);
                return false;
            }
        }
    }

    true
}

/// Relative error of `method` on the Gram matrix of `x`, averaged over `runs` draws.
pub fn mean_error<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    k: usize,
    family: KernelFamily,
    method: ApproxMethod,
    runs: usize,
    rng: &mut R,
) -> f64 {
    let exact = family.exact(x, x).unwrap();
    let total: f64 = (0..runs)
        .map(|_| {
            let approx = kernel(x, x, k, family, method, rng).unwrap();
            relative_error(&exact, &approx).unwrap()
        })
        .sum();
    total / runs as f64
}
