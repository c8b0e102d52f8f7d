use log::debug;
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::basics::{check_dimensions, dense_artifact};
use crate::errors::{FeatureMapError, Result};
use crate::operator::WeightArtifact;

const BITS: usize = 32;

/// Primitive polynomial degree `s`, coefficient bits `a` and initial direction numbers `m`
/// for Sobol dimensions 2.. (Joe & Kuo, new-joe-kuo-6.21201). Dimension 1 is van der Corput.
const DIRECTION_TABLE: [(u32, u32, &[u32]); 20] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
    (4, 4, &[1, 3, 5, 13]),
    (5, 2, &[1, 1, 5, 5, 17]),
    (5, 4, &[1, 1, 5, 5, 5]),
    (5, 7, &[1, 1, 7, 11, 19]),
    (5, 11, &[1, 1, 5, 1, 1]),
    (5, 13, &[1, 1, 1, 3, 11]),
    (5, 14, &[1, 3, 5, 5, 31]),
    (6, 1, &[1, 3, 3, 9, 7, 49]),
    (6, 13, &[1, 1, 1, 15, 21, 21]),
    (6, 16, &[1, 3, 1, 13, 27, 49]),
    (6, 19, &[1, 1, 1, 15, 7, 5]),
    (6, 22, &[1, 3, 1, 15, 13, 25]),
    (6, 25, &[1, 1, 5, 5, 19, 61]),
    (7, 1, &[1, 3, 7, 11, 23, 15, 103]),
    (7, 4, &[1, 3, 7, 13, 13, 15, 69]),
];

pub const MAX_SOBOL_DIM: usize = DIRECTION_TABLE.len() + 1;

fn direction_numbers(dim: usize) -> [u32; BITS] {
    let mut v = [0u32; BITS];
    if dim == 0 {
        for (i, vi) in v.iter_mut().enumerate() {
            *vi = 1 << (BITS - 1 - i);
        }
        return v;
    }
    let (s, a, m) = DIRECTION_TABLE[dim - 1];
    let s = s as usize;
    for i in 0..s.min(BITS) {
        v[i] = m[i] << (BITS - 1 - i);
    }
    for i in s..BITS {
        v[i] = v[i - s] ^ (v[i - s] >> s);
        for j in 1..s {
            if (a >> (s - 1 - j)) & 1 == 1 {
                v[i] ^= v[i - j];
            }
        }
    }
    v
}

/// Gray-code Sobol generator over `[0, 1)^dims`.
#[derive(Debug, Clone)]
pub struct Sobol {
    directions: Vec<[u32; BITS]>,
    state: Vec<u32>,
    index: u64,
}

impl Sobol {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 || dims > MAX_SOBOL_DIM {
            return Err(FeatureMapError::InvalidDimension(format!(
                "sobol sequence supports 1 to {} dimensions, got {}",
                MAX_SOBOL_DIM, dims
            )));
        }
        Ok(Self {
            directions: (0..dims).map(direction_numbers).collect(),
            state: vec![0; dims],
            index: 0,
        })
    }

    pub fn dims(&self) -> usize {
        self.state.len()
    }
}

impl Iterator for Sobol {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Vec<f64>> {
        if self.index >= 1 << BITS {
            return None;
        }
        let scale = 1.0 / (1u64 << BITS) as f64;
        let point = self.state.iter().map(|&x| x as f64 * scale).collect();
        let c = self.index.trailing_ones() as usize;
        if c < BITS {
            for (x, v) in self.state.iter_mut().zip(&self.directions) {
                *x ^= v[c];
            }
        }
        self.index += 1;
        Some(point)
    }
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// relative error below 1.2e-9). `p` must lie in `(0, 1)`.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/**
Quasi-Monte-Carlo weights (`QMC`).

Takes Sobol points `1..=k` in `d` dimensions (the origin is skipped),
applies one Cranley-Patterson random shift per run so repeated runs are
independent, and maps every coordinate through the inverse normal CDF.
Column `j` of the `d × k` result is the `j`-th transformed point.
 */
pub fn generate_sobol_weights<R: Rng + ?Sized>(k: usize, d: usize, rng: &mut R) -> Result<WeightArtifact> {
    check_dimensions(k, d)?;
    let sobol = Sobol::new(d)?;
    debug!("generating sobol weights, d = {}, k = {}", d, k);

    let uniform = Uniform::new(0.0, 1.0);
    let shift: Vec<f64> = (0..d).map(|_| uniform.sample(rng)).collect();
    let eps = f64::EPSILON;

    let mut weights = DMatrix::zeros(d, k);
    for (j, point) in sobol.skip(1).take(k).enumerate() {
        for (i, (u, s)) in point.iter().zip(&shift).enumerate() {
            let shifted = (u + s).fract().clamp(eps, 1.0 - eps);
            weights[(i, j)] = inverse_normal_cdf(shifted);
        }
    }
    dense_artifact(weights, rng)
}
