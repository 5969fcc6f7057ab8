//! Nonlinear factors over landmark positions.
//!
//! A factor represents a measurement constraining one or more variables. Given the
//! current estimate it computes a residual and can be linearized into a
//! [`JacobianFactor`] for the linear solver:
//!
//! ```text
//! minimize Σ_i ρ_i(||R_i (h_i(x) - z_i)||²)
//! ```
//!
//! where `h_i` predicts the measurement `z_i`, `R_i` whitens it according to the
//! factor's [`NoiseModel`] and `ρ_i` is the (optional) robust loss.
//!
//! # Factor Types
//!
//! - [`TriangulationFactor`]: reprojection of an unknown landmark into a known camera
//!   ([`Cal3S2`] intrinsics by default, [`Cal3Bundler`] for radially distorted images)
//! - [`PointPriorFactor`]: direct prior on a landmark position
//!
//! All are collected in the [`GraphFactor`] enum. Equality between factors is
//! typed: two factors are only compared when they are the same variant.
//!
//! # Linearization
//!
//! `linearize` returns `Ok(None)` for a factor that is inactive at the current
//! estimate (see [`NonlinearFactor::active`]). Otherwise it writes `A = ∂h/∂x`
//! and `b = z - h(x)` into the caller's [`LinearizationWorkspace`], whitens the
//! system with the noise model and returns the assembled linear factor.

pub mod prior_factor;
pub mod triangulation_factor;

pub use prior_factor::PointPriorFactor;
pub use triangulation_factor::{CheiralityConfig, TriangulationFactor};

use std::fmt::{self, Display, Formatter};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::core::{CoreError, Equals, Key, noise_model::NoiseModel, values::Values};
use crate::geometry::{Cal3Bundler, GeometryError};
use crate::linear::{JacobianFactor, LinearizationWorkspace};

/// Factor-specific error types
#[derive(Debug, Clone, Error)]
pub enum FactorError {
    /// Noise model dimension does not match the residual dimension
    #[error("Factor requires a {expected}-dimensional noise model, got {actual}")]
    InvalidNoiseModelDimension { expected: usize, actual: usize },

    /// The landmark projected behind the camera
    #[error("Landmark {key} moved behind camera")]
    Cheirality { key: Key, source: GeometryError },

    /// Variable lookup or noise model failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl FactorError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// camera.project(point)
    ///     .map_err(|source| FactorError::Cheirality { key, source }.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for factor operations
pub type FactorResult<T> = Result<T, FactorError>;

/// Check that an optional noise model has the factor's residual dimension.
pub(crate) fn check_noise_model_dim(
    noise_model: Option<&NoiseModel>,
    expected: usize,
) -> FactorResult<()> {
    match noise_model {
        Some(model) if model.dim() != expected => Err(FactorError::InvalidNoiseModelDimension {
            expected,
            actual: model.dim(),
        }
        .log()),
        _ => Ok(()),
    }
}

/// Trait for nonlinear factors with an optional noise model.
///
/// # Thread Safety
///
/// Factors must be `Send + Sync`. All methods take `&self`; the only mutable
/// state involved in linearization is the caller-owned workspace.
pub trait NonlinearFactor: Send + Sync {
    /// Keys of the variables this factor depends on.
    fn keys(&self) -> &[Key];

    /// Dimension of the residual vector.
    fn dim(&self) -> usize;

    fn noise_model(&self) -> Option<&NoiseModel>;

    /// Residual `h(x) - z` before whitening.
    fn unwhitened_error(&self, values: &Values) -> FactorResult<DVector<f64>>;

    /// Residual whitened by the noise model (unchanged without one).
    fn whitened_error(&self, values: &Values) -> FactorResult<DVector<f64>> {
        let residual = self.unwhitened_error(values)?;
        match self.noise_model() {
            Some(model) => Ok(model.whiten(&residual)?),
            None => Ok(residual),
        }
    }

    /// Cost `0.5 · ρ(||whitened residual||²)`.
    fn error(&self, values: &Values) -> FactorResult<f64> {
        let squared_norm = self.whitened_error(values)?.norm_squared();
        Ok(0.5
            * self
                .noise_model()
                .map_or(squared_norm, |model| model.loss(squared_norm)))
    }

    /// Whether the factor contributes to the linear system at `values`.
    ///
    /// A factor with a robust noise model is inactive when the loss gives its
    /// current residual zero weight. If the residual cannot be evaluated the
    /// factor counts as active, so `linearize` surfaces the failure.
    fn active(&self, values: &Values) -> bool {
        match self.noise_model() {
            Some(model) if model.is_robust() => self
                .whitened_error(values)
                .map_or(true, |residual| model.weight(residual.norm_squared()) > 0.0),
            _ => true,
        }
    }

    /// Linearize at `values`, returning `None` if the factor is inactive.
    fn linearize(
        &self,
        values: &Values,
        workspace: &mut LinearizationWorkspace,
    ) -> FactorResult<Option<JacobianFactor>>;
}

/// All factor types that can live in a [`FactorGraph`](crate::core::graph::FactorGraph).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraphFactor {
    Triangulation(TriangulationFactor),
    BundlerTriangulation(TriangulationFactor<Cal3Bundler>),
    PointPrior(PointPriorFactor),
}

impl GraphFactor {
    fn as_factor(&self) -> &dyn NonlinearFactor {
        match self {
            GraphFactor::Triangulation(factor) => factor,
            GraphFactor::BundlerTriangulation(factor) => factor,
            GraphFactor::PointPrior(factor) => factor,
        }
    }
}

impl From<TriangulationFactor> for GraphFactor {
    fn from(factor: TriangulationFactor) -> Self {
        GraphFactor::Triangulation(factor)
    }
}

impl From<TriangulationFactor<Cal3Bundler>> for GraphFactor {
    fn from(factor: TriangulationFactor<Cal3Bundler>) -> Self {
        GraphFactor::BundlerTriangulation(factor)
    }
}

impl From<PointPriorFactor> for GraphFactor {
    fn from(factor: PointPriorFactor) -> Self {
        GraphFactor::PointPrior(factor)
    }
}

impl NonlinearFactor for GraphFactor {
    fn keys(&self) -> &[Key] {
        self.as_factor().keys()
    }

    fn dim(&self) -> usize {
        self.as_factor().dim()
    }

    fn noise_model(&self) -> Option<&NoiseModel> {
        self.as_factor().noise_model()
    }

    fn unwhitened_error(&self, values: &Values) -> FactorResult<DVector<f64>> {
        self.as_factor().unwhitened_error(values)
    }

    fn whitened_error(&self, values: &Values) -> FactorResult<DVector<f64>> {
        self.as_factor().whitened_error(values)
    }

    fn error(&self, values: &Values) -> FactorResult<f64> {
        self.as_factor().error(values)
    }

    fn active(&self, values: &Values) -> bool {
        self.as_factor().active(values)
    }

    fn linearize(
        &self,
        values: &Values,
        workspace: &mut LinearizationWorkspace,
    ) -> FactorResult<Option<JacobianFactor>> {
        self.as_factor().linearize(values, workspace)
    }
}

impl Equals for GraphFactor {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        match (self, other) {
            (GraphFactor::Triangulation(a), GraphFactor::Triangulation(b)) => a.equals(b, tol),
            (GraphFactor::BundlerTriangulation(a), GraphFactor::BundlerTriangulation(b)) => {
                a.equals(b, tol)
            }
            (GraphFactor::PointPrior(a), GraphFactor::PointPrior(b)) => a.equals(b, tol),
            _ => false,
        }
    }
}

impl Display for GraphFactor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GraphFactor::Triangulation(factor) => Display::fmt(factor, f),
            GraphFactor::BundlerTriangulation(factor) => Display::fmt(factor, f),
            GraphFactor::PointPrior(factor) => Display::fmt(factor, f),
        }
    }
}

/// Whether two optional shared noise models agree up to `tol`.
pub(crate) fn noise_models_equal(
    a: Option<&NoiseModel>,
    b: Option<&NoiseModel>,
    tol: f64,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.equals(b, tol),
        (None, None) => true,
        _ => false,
    }
}
