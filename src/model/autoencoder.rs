//! Linear phase autoencoder with a unit-circle bottleneck
//!
//! The encoder maps each sample's reduced expression vector to a point in
//! the plane, which is normalized onto the unit circle; the decoder maps
//! the circle point back to expression space. The angle of the circle point
//! is the sample's phase. Both maps are affine, so the whole model is a
//! handful of small dense arrays.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{CircaError, Result};
use crate::phase;
use crate::rng::Mt19937;

/// Norm floor when projecting onto the unit circle
pub(crate) const NORM_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseAutoEncoder {
    /// Encoder weights (2 x input_dim)
    pub(crate) w_enc: Array2<f64>,
    /// Encoder bias (2)
    pub(crate) b_enc: Array1<f64>,
    /// Decoder weights (input_dim x 2)
    pub(crate) w_dec: Array2<f64>,
    /// Decoder bias (input_dim)
    pub(crate) b_dec: Array1<f64>,
}

/// Intermediate values of a forward pass, kept for backpropagation
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Raw encoder output before normalization (n_samples x 2)
    pub raw: Array2<f64>,
    /// Row norms of the raw output (n_samples)
    pub norms: Array1<f64>,
    /// Unit-circle points (n_samples x 2)
    pub unit: Array2<f64>,
    /// Reconstructed input (n_samples x input_dim)
    pub reconstruction: Array2<f64>,
    /// Phase angle per sample, [0, 2*pi)
    pub phases: Vec<f64>,
}

impl PhaseAutoEncoder {
    /// Random normal initialization of all weights and biases
    pub fn new(input_dim: usize, init_std: f64, rng: &mut Mt19937) -> Result<Self> {
        if input_dim < 2 {
            return Err(CircaError::TrainingFailed {
                reason: format!("Model input dimension must be at least 2, got {}", input_dim),
            });
        }

        let mut draw = |shape: (usize, usize)| {
            Array2::from_shape_fn(shape, |_| rng.next_normal() * init_std)
        };
        let w_enc = draw((2, input_dim));
        let w_dec = draw((input_dim, 2));
        let b_enc = Array1::zeros(2);
        let b_dec = Array1::zeros(input_dim);

        Ok(Self {
            w_enc,
            b_enc,
            w_dec,
            b_dec,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.w_enc.ncols()
    }

    /// Full forward pass over a samples x input_dim matrix
    pub fn forward(&self, x: &Array2<f64>) -> Result<ForwardPass> {
        if x.ncols() != self.input_dim() {
            return Err(CircaError::DimensionMismatch {
                expected: format!("{} input features", self.input_dim()),
                got: format!("{} input features", x.ncols()),
            });
        }

        let raw = x.dot(&self.w_enc.t()) + &self.b_enc;

        let n = raw.nrows();
        let mut norms = Array1::zeros(n);
        let mut unit = raw.clone();
        for (i, mut row) in unit.axis_iter_mut(Axis(0)).enumerate() {
            let norm = (row[0] * row[0] + row[1] * row[1]).sqrt().max(NORM_EPS);
            norms[i] = norm;
            row.mapv_inplace(|v| v / norm);
        }

        let reconstruction = unit.dot(&self.w_dec.t()) + &self.b_dec;

        let phases: Vec<f64> = (0..n)
            .map(|i| phase::coords_to_phase(unit[[i, 0]], unit[[i, 1]]))
            .collect();

        Ok(ForwardPass {
            raw,
            norms,
            unit,
            reconstruction,
            phases,
        })
    }

    /// Phase predictions only
    pub fn predict_phases(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        Ok(self.forward(x)?.phases)
    }
}
