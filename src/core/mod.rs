//! Core building blocks shared by the factors and the factor graph
//!
//! This module contains the pieces a nonlinear factor needs from its surroundings:
//! - Variable storage keyed by string keys ([`values`])
//! - Gaussian and robust noise models ([`noise_model`])
//! - Loss functions for robust estimation ([`loss_functions`])
//! - Correctors for applying loss functions ([`corrector`])
//! - The factor graph container ([`graph`])

pub mod corrector;
pub mod graph;
pub mod loss_functions;
pub mod noise_model;
pub mod values;

use thiserror::Error;
use tracing::error;

/// Key identifying a variable in a [`values::Values`] store.
pub type Key = String;

/// Build a key from a character and an index, e.g. `symbol('l', 3) == "l3"`.
///
/// Landmarks are conventionally keyed with `'l'` and poses with `'x'`.
pub fn symbol(chr: char, index: u64) -> Key {
    format!("{chr}{index}")
}

/// Tolerance-based equality between two values of the same type.
///
/// Factors, cameras and noise models are compared up to a numerical tolerance
/// rather than bit-for-bit, so they implement this instead of `PartialEq`.
pub trait Equals {
    /// Returns `true` when `self` and `other` agree to within `tol`.
    fn equals(&self, other: &Self, tol: f64) -> bool;
}

impl Equals for nalgebra::Vector2<f64> {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        (self - other).amax() <= tol
    }
}

impl Equals for nalgebra::Vector3<f64> {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        (self - other).amax() <= tol
    }
}

/// Core module error types for variable storage and noise models
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// No value stored under the requested key
    #[error("Key '{0}' not found in values")]
    MissingKey(Key),

    /// Value exists but has a different type than requested
    #[error("Value for key '{key}' has type {actual}, expected {expected}")]
    TypeMismatch {
        key: Key,
        expected: &'static str,
        actual: &'static str,
    },

    /// Attempted to insert a key that is already present
    #[error("Key '{0}' already exists in values")]
    DuplicateKey(Key),

    /// Noise model construction or evaluation failed
    #[error("Noise model error: {0}")]
    NoiseModel(String),

    /// Dimension mismatch between matrices, vectors or models
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input parameter or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// values.at::<Point3>(&key)
    ///     .map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
