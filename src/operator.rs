use nalgebra::{DMatrix, DVector};

use crate::butterfly::ButterflyProjection;
use crate::errors::{FeatureMapError, Result};
use crate::householder::HouseholderProjection;

/// A random projection from `input_dim` to `output_dim` coordinates.
///
/// Implementations may hold a dense weight matrix or apply a structured
/// factorization; callers only see `apply`, which maps each row of `points`
/// (`n × input_dim`) to a row of projections (`n × output_dim`).
pub trait LinearOperator: Send + Sync {
    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;

    fn apply(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// The equivalent `input_dim × output_dim` weight matrix.
    fn to_dense(&self) -> DMatrix<f64>;
}

pub(crate) fn check_input(op: &dyn LinearOperator, points: &DMatrix<f64>) -> Result<()> {
    if points.ncols() != op.input_dim() {
        return Err(FeatureMapError::InvalidDimension(format!(
            "operator expects points of dimension {}, got {}",
            op.input_dim(),
            points.ncols()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DenseProjection {
    weights: DMatrix<f64>,
}

impl DenseProjection {
    /// `weights` is `d × k`, one random direction per column.
    pub fn new(weights: DMatrix<f64>) -> Result<Self> {
        if weights.nrows() == 0 || weights.ncols() == 0 {
            return Err(FeatureMapError::InvalidDimension(format!(
                "weight matrix must be non-empty, got {} x {}",
                weights.nrows(),
                weights.ncols()
            )));
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }
}

impl LinearOperator for DenseProjection {
    fn input_dim(&self) -> usize {
        self.weights.nrows()
    }

    fn output_dim(&self) -> usize {
        self.weights.ncols()
    }

    fn apply(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_input(self, points)?;
        Ok(points * &self.weights)
    }

    fn to_dense(&self) -> DMatrix<f64> {
        self.weights.clone()
    }
}

#[derive(Debug, Clone)]
pub enum Projection {
    Dense(DenseProjection),
    Householder(HouseholderProjection),
    Butterfly(ButterflyProjection),
}

impl Projection {
    pub fn as_operator(&self) -> &dyn LinearOperator {
        match self {
            Projection::Dense(op) => op,
            Projection::Householder(op) => op,
            Projection::Butterfly(op) => op,
        }
    }

    pub fn is_factorized(&self) -> bool {
        !matches!(self, Projection::Dense(_))
    }
}

impl LinearOperator for Projection {
    fn input_dim(&self) -> usize {
        self.as_operator().input_dim()
    }

    fn output_dim(&self) -> usize {
        self.as_operator().output_dim()
    }

    fn apply(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.as_operator().apply(points)
    }

    fn to_dense(&self) -> DMatrix<f64> {
        self.as_operator().to_dense()
    }
}

/// Output of a weight generator: the projection plus one random phase per
/// feature (consumed by the RBF feature map only).
#[derive(Debug, Clone)]
pub struct WeightArtifact {
    projection: Projection,
    phases: DVector<f64>,
}

impl WeightArtifact {
    pub fn new(projection: Projection, phases: DVector<f64>) -> Result<Self> {
        if phases.len() != projection.output_dim() {
            return Err(FeatureMapError::InvalidDimension(format!(
                "expected {} phases, got {}",
                projection.output_dim(),
                phases.len()
            )));
        }
        Ok(Self { projection, phases })
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn phases(&self) -> &DVector<f64> {
        &self.phases
    }

    pub fn input_dim(&self) -> usize {
        self.projection.input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.projection.output_dim()
    }

    pub fn project(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.projection.apply(points)
    }
}
