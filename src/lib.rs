pub mod basics;
pub mod butterfly;
pub mod errors;
pub mod estimator;
pub mod experiment;
pub mod householder;
pub mod kernels;
pub mod mapping;
pub mod methods;
pub mod metrics;
pub mod operator;
pub mod qmc;
pub mod rom;
#[cfg(test)]
mod test_assist;

pub use errors::{FeatureMapError, Result};
pub use experiment::{experiment, experiment_with_progress, DatasetPreset, ExperimentConfig, ExperimentResults};
pub use methods::{approximation, kernel, kernel_by_name, kernel_with_path, ApproxMethod, EvaluationPath, KernelFamily};
pub use operator::{LinearOperator, WeightArtifact};
