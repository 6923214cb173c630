//! Smoothing matrices over adjacent source pixels

use crate::pixelization::Mapper;

use nalgebra::DMatrix;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Small diagonal term keeping the regularization matrix positive definite
/// when a pixel has no neighbors
const DIAGONAL_STABILIZER: f64 = 1e-8;

/// Rule for generating a smoothing matrix over a mapper's source pixels
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Regularization {
    Constant(Constant),
    AdaptiveBrightness(AdaptiveBrightness),
}

impl Regularization {
    /// Build the regularization matrix for one mapper
    ///
    /// `signal_image` feeds the adaptive variant's per-pixel weights; the
    /// constant variant ignores it.
    pub fn matrix_for(&self, mapper: &Mapper, signal_image: &Array1<f64>) -> DMatrix<f64> {
        match self {
            Self::Constant(c) => c.matrix_from(mapper.neighbors()),
            Self::AdaptiveBrightness(w) => {
                let signals = mapper.pixel_signals_from(signal_image, w.signal_scale);
                w.matrix_from(mapper.neighbors(), &signals)
            }
        }
    }
}

/// One coefficient applied uniformly: `R = coefficient * Laplacian`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub coefficient: f64,
}

impl Constant {
    pub fn new(coefficient: f64) -> Self {
        Self { coefficient }
    }

    pub fn matrix_from(&self, neighbors: &[Vec<usize>]) -> DMatrix<f64> {
        let n = neighbors.len();
        let mut matrix = DMatrix::from_diagonal_element(n, n, DIAGONAL_STABILIZER);
        for (p, adjacent) in neighbors.iter().enumerate() {
            for &q in adjacent {
                matrix[(p, p)] += self.coefficient;
                matrix[(p, q)] -= self.coefficient;
            }
        }
        matrix
    }
}

/// Per-pixel coefficients interpolated between an inner (high-signal) and
/// outer (low-signal) value, applied as squared weights
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveBrightness {
    pub inner_coefficient: f64,
    pub outer_coefficient: f64,
    pub signal_scale: f64,
}

impl AdaptiveBrightness {
    pub fn new(inner_coefficient: f64, outer_coefficient: f64, signal_scale: f64) -> Self {
        Self {
            inner_coefficient,
            outer_coefficient,
            signal_scale,
        }
    }

    fn weights_from(&self, pixel_signals: &Array1<f64>) -> Array1<f64> {
        pixel_signals
            .mapv(|s| self.inner_coefficient * s + self.outer_coefficient * (1.0 - s))
    }

    pub fn matrix_from(
        &self,
        neighbors: &[Vec<usize>],
        pixel_signals: &Array1<f64>,
    ) -> DMatrix<f64> {
        let weights = self.weights_from(pixel_signals);
        let n = neighbors.len();
        let mut matrix = DMatrix::from_diagonal_element(n, n, DIAGONAL_STABILIZER);
        for (p, adjacent) in neighbors.iter().enumerate() {
            let w = weights[p] * weights[p];
            for &q in adjacent {
                matrix[(p, p)] += w;
                matrix[(q, q)] += w;
                matrix[(p, q)] -= w;
                matrix[(q, p)] -= w;
            }
        }
        matrix
    }
}
