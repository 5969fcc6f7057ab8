//! Linearized factors produced by nonlinear factors.
//!
//! Linearizing a nonlinear factor around the current estimate yields a
//! [`JacobianFactor`] `(A, b)` such that
//!
//! ```text
//! h(x ⊕ δ) - z ≈ A δ - b,     b = z - h(x)
//! ```
//!
//! The linear solver that consumes these factors is outside this crate;
//! [`VectorValues`] exists so a linear factor can be evaluated at a given
//! update `δ`.

pub mod jacobian_factor;
pub mod workspace;

pub use jacobian_factor::JacobianFactor;
pub use workspace::LinearizationWorkspace;

use std::collections::HashMap;

use nalgebra::DVector;

use crate::core::{CoreError, CoreResult, Key};

/// Tangent-space updates keyed by variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorValues {
    values: HashMap<Key, DVector<f64>>,
}

impl VectorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the update for `key`.
    pub fn insert(&mut self, key: impl Into<Key>, value: DVector<f64>) {
        self.values.insert(key.into(), value);
    }

    pub fn at(&self, key: &str) -> CoreResult<&DVector<f64>> {
        self.values
            .get(key)
            .ok_or_else(|| CoreError::MissingKey(key.to_string()).log())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
