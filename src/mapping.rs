use log::trace;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::errors::Result;
use crate::kernels::{check_point_sets, rbf_gamma, Nonlinearity};
use crate::operator::WeightArtifact;

/// Rows mapped per batch.
pub const BATCH_SIZE: usize = 128;

/// Maps `x` to its `n × k` feature matrix batch by batch.
///
/// Batches are projected and mapped in parallel; each row of the output
/// depends only on its own input row, so the result does not depend on
/// how rows are split across threads.
pub fn batch_features(x: &DMatrix<f64>, artifact: &WeightArtifact, nonlinearity: Nonlinearity) -> Result<DMatrix<f64>> {
    let n = x.nrows();
    let k = artifact.output_dim();
    let starts: Vec<usize> = (0..n).step_by(BATCH_SIZE).collect();
    trace!("mapping {} points in {} batches", n, starts.len());

    let batches = starts
        .par_iter()
        .map(|&start| {
            let rows = BATCH_SIZE.min(n - start);
            let batch = x.rows(start, rows).into_owned();
            let projected = artifact.project(&batch)?;
            Ok((start, nonlinearity.features(projected, artifact.phases())))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut features = DMatrix::zeros(n, k);
    for (start, batch) in batches {
        features.rows_mut(start, batch.nrows()).copy_from(&batch);
    }
    Ok(features)
}

fn fast_batch_kernel(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    artifact: &WeightArtifact,
    nonlinearity: Nonlinearity,
) -> Result<DMatrix<f64>> {
    check_point_sets(x, y)?;
    let fx = batch_features(x, artifact, nonlinearity)?;
    if std::ptr::eq(x, y) {
        return Ok(&fx * fx.transpose());
    }
    let fy = batch_features(y, artifact, nonlinearity)?;
    Ok(&fx * fy.transpose())
}

pub fn fast_batch_approx_rbf(x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
    let gamma = rbf_gamma(x.ncols());
    fast_batch_kernel(x, y, artifact, Nonlinearity::Fourier { gamma })
}

pub fn fast_batch_approx_arccos0(x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
    fast_batch_kernel(x, y, artifact, Nonlinearity::Step)
}

pub fn fast_batch_approx_arccos1(x: &DMatrix<f64>, y: &DMatrix<f64>, artifact: &WeightArtifact) -> Result<DMatrix<f64>> {
    fast_batch_kernel(x, y, artifact, Nonlinearity::Relu)
}
