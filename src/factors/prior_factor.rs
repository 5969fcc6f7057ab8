//! Prior factor anchoring a landmark to a known position.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::{FactorError, FactorResult, NonlinearFactor, check_noise_model_dim, noise_models_equal};
use crate::core::{Equals, Key, noise_model::NoiseModel, values::Values};
use crate::geometry::Point3;
use crate::linear::{JacobianFactor, LinearizationWorkspace};

/// Prior (unary constraint) on a landmark position.
///
/// # Mathematical Formulation
///
/// ```text
/// r = p - p_prior
/// J = I₃
/// ```
///
/// # Use Cases
///
/// - **Gauge fixing**: Keep an underconstrained landmark (e.g. seen by a single camera) well-posed
/// - **External measurements**: Incorporate a position from another sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PointPriorFactorData")]
pub struct PointPriorFactor {
    key: Key,
    prior: Point3,
    noise_model: Option<Arc<NoiseModel>>,
}

#[derive(Deserialize)]
struct PointPriorFactorData {
    key: Key,
    prior: Point3,
    noise_model: Option<Arc<NoiseModel>>,
}

impl TryFrom<PointPriorFactorData> for PointPriorFactor {
    type Error = FactorError;

    fn try_from(data: PointPriorFactorData) -> FactorResult<Self> {
        PointPriorFactor::new(data.key, data.prior, data.noise_model)
    }
}

impl PointPriorFactor {
    pub const DIM: usize = 3;

    /// # Errors
    ///
    /// [`FactorError::InvalidNoiseModelDimension`](super::FactorError) if the
    /// noise model is not 3-dimensional.
    pub fn new(
        key: impl Into<Key>,
        prior: Point3,
        noise_model: Option<Arc<NoiseModel>>,
    ) -> FactorResult<Self> {
        check_noise_model_dim(noise_model.as_deref(), Self::DIM)?;
        Ok(PointPriorFactor {
            key: key.into(),
            prior,
            noise_model,
        })
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn prior(&self) -> &Point3 {
        &self.prior
    }

    /// Residual `p - p_prior` and optionally the identity Jacobian.
    pub fn evaluate_error(
        &self,
        point: &Point3,
        compute_jacobian: bool,
    ) -> (Vector3<f64>, Option<Matrix3<f64>>) {
        (point - self.prior, compute_jacobian.then(Matrix3::identity))
    }
}

impl NonlinearFactor for PointPriorFactor {
    fn keys(&self) -> &[Key] {
        std::slice::from_ref(&self.key)
    }

    fn dim(&self) -> usize {
        Self::DIM
    }

    fn noise_model(&self) -> Option<&NoiseModel> {
        self.noise_model.as_deref()
    }

    fn unwhitened_error(&self, values: &Values) -> FactorResult<DVector<f64>> {
        let point: &Point3 = values.at(&self.key)?;
        let (residual, _) = self.evaluate_error(point, false);
        Ok(DVector::from_column_slice(residual.as_slice()))
    }

    fn linearize(
        &self,
        values: &Values,
        workspace: &mut LinearizationWorkspace,
    ) -> FactorResult<Option<JacobianFactor>> {
        if !self.active(values) {
            return Ok(None);
        }

        let point: &Point3 = values.at(&self.key)?;
        let (a, b) = workspace.buffers(Self::DIM, Self::DIM);
        a.copy_from(&DMatrix::<f64>::identity(Self::DIM, Self::DIM));
        b.copy_from(&(self.prior - point));
        if let Some(model) = &self.noise_model {
            model.whiten_system(a, b)?;
        }

        Ok(Some(JacobianFactor::new(
            vec![(self.key.clone(), a.clone())],
            b.clone(),
        )?))
    }
}

impl Equals for PointPriorFactor {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        self.key == other.key
            && noise_models_equal(self.noise_model(), other.noise_model(), tol)
            && self.prior.equals(&other.prior, tol)
    }
}

impl Display for PointPriorFactor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "PointPriorFactor,")?;
        writeln!(
            f,
            "  prior: [{}, {}, {}]",
            self.prior.x, self.prior.y, self.prior.z
        )?;
        writeln!(f, "  keys: [{}]", self.key)?;
        match &self.noise_model {
            Some(model) => write!(f, "  noise model: {model}"),
            None => write!(f, "  no noise model"),
        }
    }
}
