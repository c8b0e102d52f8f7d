use thiserror::Error;

use crate::methods::{ApproxMethod, KernelFamily};

pub type Result<T> = std::result::Result<T, FeatureMapError>;

#[derive(Debug, Error)]
pub enum FeatureMapError {
    /// Non-positive `k`/`d`, mismatched point dimensions or mismatched matrix shapes.
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    /// Unrecognized method, kernel family or configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An evaluation path was requested for a method that cannot serve it.
    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    #[error("division by zero: {0}")]
    DivisionByZero(String),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("estimator failed: {0}")]
    Estimator(String),

    /// A single harness run failed. Carries what is needed to replay the random draw.
    #[error("{method} approximation of the {kernel} kernel failed at k = {k}, run {run}: {source}")]
    RunFailed {
        method: ApproxMethod,
        kernel: KernelFamily,
        k: usize,
        run: usize,
        #[source]
        source: Box<FeatureMapError>,
    },
}
