use log::debug;
use nalgebra::{DMatrix, DVector};
use std::convert::TryFrom;
use std::error::Error;
use std::str::FromStr;

use crate::errors::{FeatureMapError, Result};

/// What the external estimator is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Support vector classification, scored by accuracy.
    Classification,
    /// Support vector regression, scored by R².
    Regression,
}

impl TryFrom<u8> for Task {
    type Error = FeatureMapError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Task::Classification),
            1 => Ok(Task::Regression),
            other => Err(FeatureMapError::InvalidTask(format!(
                "task={} is not implemented; use 0 for SVM, 1 for SVR",
                other
            ))),
        }
    }
}

impl FromStr for Task {
    type Err = FeatureMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" | "svm" | "svc" => Ok(Task::Classification),
            "regression" | "svr" => Ok(Task::Regression),
            other => Err(FeatureMapError::InvalidTask(format!("unknown task {:?}", other))),
        }
    }
}

/// Kernel the external estimator should use. `Precomputed` means the data
/// pair already holds (train × train, test × train) kernel matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorKernel {
    Precomputed,
    Linear,
    Poly,
    Rbf,
    Sigmoid,
}

impl FromStr for EstimatorKernel {
    type Err = FeatureMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "precomputed" => Ok(EstimatorKernel::Precomputed),
            "linear" => Ok(EstimatorKernel::Linear),
            "poly" => Ok(EstimatorKernel::Poly),
            "rbf" => Ok(EstimatorKernel::Rbf),
            "sigmoid" => Ok(EstimatorKernel::Sigmoid),
            other => Err(FeatureMapError::InvalidArgument(format!("no such estimator kernel: {:?}", other))),
        }
    }
}

pub type EstimatorError = Box<dyn Error + Send + Sync>;

/// A fitted-then-queried model living outside this crate (an SVM or SVR).
pub trait Estimator {
    fn fit(&mut self, train: &DMatrix<f64>, targets: &DVector<f64>) -> std::result::Result<(), EstimatorError>;

    fn predict(&self, test: &DMatrix<f64>) -> std::result::Result<DVector<f64>, EstimatorError>;
}

/// Builds estimators for a task and kernel.
pub trait EstimatorBackend {
    fn build(&self, task: Task, kernel: EstimatorKernel) -> Box<dyn Estimator>;
}

fn check_lengths(truth: &DVector<f64>, predicted: &DVector<f64>) -> Result<()> {
    if truth.len() != predicted.len() || truth.is_empty() {
        return Err(FeatureMapError::InvalidDimension(format!(
            "cannot score {} predictions against {} targets",
            predicted.len(),
            truth.len()
        )));
    }
    Ok(())
}

/// Fraction of exactly matching labels.
pub fn accuracy_score(truth: &DVector<f64>, predicted: &DVector<f64>) -> Result<f64> {
    check_lengths(truth, predicted)?;
    let hits = truth.iter().zip(predicted.iter()).filter(|(t, p)| t == p).count();
    Ok(hits as f64 / truth.len() as f64)
}

/// Coefficient of determination. A constant `truth` scores 1.0 when
/// predicted exactly and 0.0 otherwise.
pub fn r2_score(truth: &DVector<f64>, predicted: &DVector<f64>) -> Result<f64> {
    check_lengths(truth, predicted)?;
    let mean = truth.mean();
    let residual = (truth - predicted).norm_squared();
    let total = truth.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>();
    if total == 0.0 {
        return Ok(if residual == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - residual / total)
}

fn check_data(
    data: (&DMatrix<f64>, &DMatrix<f64>),
    labels: (&DVector<f64>, &DVector<f64>),
    kernel: EstimatorKernel,
) -> Result<()> {
    let (train, test) = data;
    let (ytrain, ytest) = labels;
    if train.nrows() != ytrain.len() || test.nrows() != ytest.len() {
        return Err(FeatureMapError::InvalidDimension(format!(
            "data has {} train and {} test rows but labels have {} and {} entries",
            train.nrows(),
            test.nrows(),
            ytrain.len(),
            ytest.len()
        )));
    }
    let expected_cols = match kernel {
        EstimatorKernel::Precomputed => {
            if !train.is_square() {
                return Err(FeatureMapError::InvalidDimension(format!(
                    "precomputed train kernel must be square, got {} x {}",
                    train.nrows(),
                    train.ncols()
                )));
            }
            train.nrows()
        }
        _ => train.ncols(),
    };
    if test.ncols() != expected_cols {
        return Err(FeatureMapError::InvalidDimension(format!(
            "test data has {} columns, expected {}",
            test.ncols(),
            expected_cols
        )));
    }
    Ok(())
}

/**
Fits an external estimator on the train half and scores it on the test half.

* Inputs:
`data` is `(train, test)`: raw features, or kernel matrices when `kernel` is
`Precomputed` (`train` is `n × n`, `test` is `m × n`).
`labels` is `(train targets, test targets)`.

* Output:
Accuracy for classification, R² for regression.
 */
pub fn estimator_score(
    backend: &dyn EstimatorBackend,
    data: (&DMatrix<f64>, &DMatrix<f64>),
    labels: (&DVector<f64>, &DVector<f64>),
    kernel: EstimatorKernel,
    task: Task,
) -> Result<f64> {
    check_data(data, labels, kernel)?;
    let mut estimator = backend.build(task, kernel);
    estimator
        .fit(data.0, labels.0)
        .map_err(|e| FeatureMapError::Estimator(format!("fit: {}", e)))?;
    let predicted = estimator
        .predict(data.1)
        .map_err(|e| FeatureMapError::Estimator(format!("predict: {}", e)))?;
    let score = match task {
        Task::Classification => accuracy_score(labels.1, &predicted)?,
        Task::Regression => r2_score(labels.1, &predicted)?,
    };
    debug!("{:?} with {:?} kernel scored {:.4}", task, kernel, score);
    Ok(score)
}

/// [`estimator_score`] with the task given by its numeric code (0 = SVM, 1 = SVR).
pub fn estimator_score_by_code(
    backend: &dyn EstimatorBackend,
    data: (&DMatrix<f64>, &DMatrix<f64>),
    labels: (&DVector<f64>, &DVector<f64>),
    kernel: EstimatorKernel,
    task: u8,
) -> Result<f64> {
    let task = Task::try_from(task)?;
    estimator_score(backend, data, labels, kernel, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    /// Predicts, for each test row, the target of the train row with the largest entry
    /// (nearest neighbour under a precomputed similarity).
    struct MostSimilar {
        targets: Option<DVector<f64>>,
    }

    impl Estimator for MostSimilar {
        fn fit(&mut self, train: &DMatrix<f64>, targets: &DVector<f64>) -> std::result::Result<(), EstimatorError> {
            if train.nrows() == 0 {
                return Err("empty training set".into());
            }
            self.targets = Some(targets.clone());
            Ok(())
        }

        fn predict(&self, test: &DMatrix<f64>) -> std::result::Result<DVector<f64>, EstimatorError> {
            let targets = self.targets.as_ref().ok_or("not fitted")?;
            Ok(DVector::from_fn(test.nrows(), |i, _| targets[test.row(i).transpose().imax()]))
        }
    }

    struct Backend;

    impl EstimatorBackend for Backend {
        fn build(&self, _task: Task, _kernel: EstimatorKernel) -> Box<dyn Estimator> {
            Box::new(MostSimilar { targets: None })
        }
    }

    struct Failing;

    impl Estimator for Failing {
        fn fit(&mut self, _: &DMatrix<f64>, _: &DVector<f64>) -> std::result::Result<(), EstimatorError> {
            Err("solver did not converge".into())
        }

        fn predict(&self, _: &DMatrix<f64>) -> std::result::Result<DVector<f64>, EstimatorError> {
            unreachable!()
        }
    }

    struct FailingBackend;

    impl EstimatorBackend for FailingBackend {
        fn build(&self, _task: Task, _kernel: EstimatorKernel) -> Box<dyn Estimator> {
            Box::new(Failing)
        }
    }

    fn precomputed() -> (DMatrix<f64>, DMatrix<f64>) {
        let train = dmatrix![1.0, 0.1, 0.2;
                             0.1, 1.0, 0.3;
                             0.2, 0.3, 1.0];
        let test = dmatrix![0.9, 0.1, 0.0;
                            0.0, 0.2, 0.8];
        (train, test)
    }

    #[test]
    fn test_task_codes() {
        assert_eq!(Task::try_from(0).unwrap(), Task::Classification);
        assert_eq!(Task::try_from(1).unwrap(), Task::Regression);
        assert!(matches!(Task::try_from(2), Err(FeatureMapError::InvalidTask(_))));
        assert_eq!("SVR".parse::<Task>().unwrap(), Task::Regression);
        assert!(matches!("clustering".parse::<Task>(), Err(FeatureMapError::InvalidTask(_))));
    }

    #[test]
    fn test_classification_score() {
        let (train, test) = precomputed();
        let ytrain = dvector![0.0, 1.0, 2.0];
        let ytest = dvector![0.0, 1.0];
        let score = estimator_score(&Backend, (&train, &test), (&ytrain, &ytest), EstimatorKernel::Precomputed, Task::Classification).unwrap();
        assert_relative_eq!(score, 0.5);
    }

    #[test]
    fn test_regression_score() {
        let (train, test) = precomputed();
        let ytrain = dvector![1.0, 2.0, 3.0];
        let ytest = dvector![1.0, 3.0];
        let score = estimator_score_by_code(&Backend, (&train, &test), (&ytrain, &ytest), EstimatorKernel::Precomputed, 1).unwrap();
        assert_relative_eq!(score, 1.0);
    }

    #[test]
    fn test_invalid_task_code() {
        let (train, test) = precomputed();
        let y = dvector![1.0, 2.0, 3.0];
        let yt = dvector![1.0, 3.0];
        let result = estimator_score_by_code(&Backend, (&train, &test), (&y, &yt), EstimatorKernel::Precomputed, 7);
        assert!(matches!(result, Err(FeatureMapError::InvalidTask(_))));
    }

    #[test]
    fn test_shape_checks() {
        let (train, test) = precomputed();
        let y = dvector![1.0, 2.0];
        let yt = dvector![1.0, 3.0];
        let result = estimator_score(&Backend, (&train, &test), (&y, &yt), EstimatorKernel::Precomputed, Task::Regression);
        assert!(matches!(result, Err(FeatureMapError::InvalidDimension(_))));

        let rect = DMatrix::<f64>::zeros(3, 2);
        let y = dvector![1.0, 2.0, 3.0];
        let result = estimator_score(&Backend, (&rect, &test), (&y, &yt), EstimatorKernel::Precomputed, Task::Regression);
        assert!(matches!(result, Err(FeatureMapError::InvalidDimension(_))));

        // raw features: test columns must match train columns
        let result = estimator_score(&Backend, (&rect, &test), (&y, &yt), EstimatorKernel::Linear, Task::Regression);
        assert!(matches!(result, Err(FeatureMapError::InvalidDimension(_))));
    }

    #[test]
    fn test_estimator_failure_is_reported() {
        let (train, test) = precomputed();
        let y = dvector![1.0, 2.0, 3.0];
        let yt = dvector![1.0, 3.0];
        let result = estimator_score(&FailingBackend, (&train, &test), (&y, &yt), EstimatorKernel::Precomputed, Task::Classification);
        assert!(matches!(result, Err(FeatureMapError::Estimator(_))));
    }

    #[test]
    fn test_scores() {
        let truth = dvector![1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(accuracy_score(&truth, &dvector![1.0, 0.0, 3.0, 0.0]).unwrap(), 0.5);
        assert_relative_eq!(r2_score(&truth, &truth).unwrap(), 1.0);
        // predicting the mean gives zero
        assert_relative_eq!(r2_score(&truth, &DVector::from_element(4, 2.5)).unwrap(), 0.0, epsilon = 1e-15);

        let constant = dvector![2.0, 2.0];
        assert_eq!(r2_score(&constant, &constant).unwrap(), 1.0);
        assert_eq!(r2_score(&constant, &dvector![2.0, 3.0]).unwrap(), 0.0);

        assert!(accuracy_score(&truth, &dvector![1.0]).is_err());
    }

    #[test]
    fn test_estimator_kernel_names() {
        assert_eq!("precomputed".parse::<EstimatorKernel>().unwrap(), EstimatorKernel::Precomputed);
        assert!(matches!("cosine".parse::<EstimatorKernel>(), Err(FeatureMapError::InvalidArgument(_))));
    }
}
