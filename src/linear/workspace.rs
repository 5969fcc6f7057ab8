//! Scratch buffers reused across linearizations.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Scratch storage for the coefficient block `A` and right-hand side `b` of
/// one factor.
///
/// The buffers are sized on first use and kept for subsequent
/// linearizations of the same factor. The workspace is owned separately from
/// the factor and borrowed mutably by `linearize`, so a factor itself stays
/// immutable and two threads can never write into the same buffers. Every
/// linearization overwrites the full buffers before reading them.
#[derive(Debug, Clone)]
pub struct LinearizationWorkspace {
    a: DMatrix<f64>,
    b: DVector<f64>,
}

impl Default for LinearizationWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearizationWorkspace {
    /// An empty workspace. No memory is allocated until the first linearization.
    pub fn new() -> Self {
        LinearizationWorkspace {
            a: DMatrix::zeros(0, 0),
            b: DVector::zeros(0),
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.a.nrows() != 0
    }

    /// Buffers shaped `rows × cols` and `rows`, allocating only if the shape changed.
    pub fn buffers(&mut self, rows: usize, cols: usize) -> (&mut DMatrix<f64>, &mut DVector<f64>) {
        if self.a.shape() != (rows, cols) {
            debug!("Allocating linearization workspace {}x{}", rows, cols);
            self.a = DMatrix::zeros(rows, cols);
            self.b = DVector::zeros(rows);
        }
        (&mut self.a, &mut self.b)
    }
}
