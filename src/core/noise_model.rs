//! Gaussian and robust noise models.
//!
//! A noise model describes the uncertainty of a measurement. Factors use it to
//! *whiten* their residual and linear system, rescaling rows by the inverse
//! standard deviation so every residual component has unit scale:
//!
//! ```text
//! whiten(r)          = R r
//! whiten_system(A,b) = (R A, R b)
//! ```
//!
//! where `R` is the square root of the information matrix (`Rᵀ R = Σ⁻¹`).
//!
//! # Variants
//!
//! | Variant | R | Notes |
//! |---------|---|-------|
//! | `Unit` | I | unweighted |
//! | `Isotropic` | I / σ | same σ on every row |
//! | `Diagonal` | diag(1/σᵢ) | independent rows |
//! | `Gaussian` | full R | correlated rows, built from a covariance |
//! | `Robust` | base R + loss | reweights the whitened system with a robust loss |
//!
//! Constrained (zero variance) models are not supported: a zero sigma is
//! rejected at construction.
//!
//! Factors hold noise models through `Arc` so one model can be shared by many
//! factors.

use std::fmt::{self, Display, Formatter};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::core::{
    CoreError, CoreResult, Equals,
    corrector::Corrector,
    loss_functions::{LossFunction, RobustLoss},
};

/// Measurement noise model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NoiseModelData")]
pub enum NoiseModel {
    /// Identity whitening
    Unit { dim: usize },
    /// Same standard deviation on every row
    Isotropic { dim: usize, sigma: f64 },
    /// Independent standard deviation per row
    Diagonal { sigmas: DVector<f64> },
    /// Full square-root information matrix
    Gaussian { sqrt_information: DMatrix<f64> },
    /// Robust loss applied on top of a Gaussian base model
    Robust {
        loss: RobustLoss,
        base: Box<NoiseModel>,
    },
}

/// Wire form of [`NoiseModel`]. Decoding validates it through the constructors.
#[derive(Deserialize)]
enum NoiseModelData {
    Unit { dim: usize },
    Isotropic { dim: usize, sigma: f64 },
    Diagonal { sigmas: DVector<f64> },
    Gaussian { sqrt_information: DMatrix<f64> },
    Robust { loss: RobustLoss, base: Box<NoiseModel> },
}

impl TryFrom<NoiseModelData> for NoiseModel {
    type Error = CoreError;

    fn try_from(data: NoiseModelData) -> CoreResult<Self> {
        match data {
            NoiseModelData::Unit { dim } => Ok(NoiseModel::unit(dim)),
            NoiseModelData::Isotropic { dim, sigma } => NoiseModel::isotropic(dim, sigma),
            NoiseModelData::Diagonal { sigmas } => NoiseModel::diagonal(sigmas),
            NoiseModelData::Gaussian { sqrt_information } => {
                NoiseModel::gaussian_from_sqrt_information(sqrt_information)
            }
            NoiseModelData::Robust { loss, base } => NoiseModel::robust(loss, *base),
        }
    }
}

fn check_sigma(sigma: f64) -> CoreResult<()> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return Err(CoreError::NoiseModel(format!(
            "standard deviation must be positive and finite, got {sigma} \
             (constrained models are not supported)"
        ))
        .log());
    }
    Ok(())
}

impl NoiseModel {
    pub fn unit(dim: usize) -> Self {
        NoiseModel::Unit { dim }
    }

    pub fn isotropic(dim: usize, sigma: f64) -> CoreResult<Self> {
        check_sigma(sigma)?;
        Ok(NoiseModel::Isotropic { dim, sigma })
    }

    pub fn diagonal(sigmas: DVector<f64>) -> CoreResult<Self> {
        for &sigma in sigmas.iter() {
            check_sigma(sigma)?;
        }
        Ok(NoiseModel::Diagonal { sigmas })
    }

    /// Gaussian model from a covariance matrix `Σ`.
    ///
    /// With the Cholesky factorization `Σ = L Lᵀ`, the square-root information
    /// is `R = L⁻¹`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoiseModel`] if `Σ` is not square or not positive definite.
    pub fn gaussian_from_covariance(covariance: DMatrix<f64>) -> CoreResult<Self> {
        if !covariance.is_square() {
            return Err(CoreError::NoiseModel(format!(
                "covariance must be square, got {}x{}",
                covariance.nrows(),
                covariance.ncols()
            ))
            .log());
        }
        let dim = covariance.nrows();
        let cholesky = covariance.cholesky().ok_or_else(|| {
            CoreError::NoiseModel("covariance is not positive definite".to_string()).log()
        })?;
        let sqrt_information = cholesky
            .l()
            .solve_lower_triangular(&DMatrix::identity(dim, dim))
            .ok_or_else(|| {
                CoreError::NoiseModel("covariance factor is singular".to_string()).log()
            })?;
        Ok(NoiseModel::Gaussian { sqrt_information })
    }

    /// Gaussian model from a square-root information matrix `R`.
    pub fn gaussian_from_sqrt_information(sqrt_information: DMatrix<f64>) -> CoreResult<Self> {
        if !sqrt_information.is_square() {
            return Err(CoreError::NoiseModel(format!(
                "square-root information must be square, got {}x{}",
                sqrt_information.nrows(),
                sqrt_information.ncols()
            ))
            .log());
        }
        if sqrt_information.iter().any(|x| !x.is_finite()) {
            return Err(CoreError::NoiseModel(
                "square-root information contains NaN or Inf".to_string(),
            )
            .log());
        }
        Ok(NoiseModel::Gaussian { sqrt_information })
    }

    /// Wrap a Gaussian model with a robust loss.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoiseModel`] if `base` is itself robust.
    pub fn robust(loss: RobustLoss, base: NoiseModel) -> CoreResult<Self> {
        if base.is_robust() {
            return Err(
                CoreError::NoiseModel("robust models cannot be nested".to_string()).log(),
            );
        }
        Ok(NoiseModel::Robust {
            loss,
            base: Box::new(base),
        })
    }

    /// Dimension of the residuals this model applies to.
    pub fn dim(&self) -> usize {
        match self {
            NoiseModel::Unit { dim } | NoiseModel::Isotropic { dim, .. } => *dim,
            NoiseModel::Diagonal { sigmas } => sigmas.len(),
            NoiseModel::Gaussian { sqrt_information } => sqrt_information.nrows(),
            NoiseModel::Robust { base, .. } => base.dim(),
        }
    }

    pub fn is_robust(&self) -> bool {
        matches!(self, NoiseModel::Robust { .. })
    }

    fn check_rows(&self, rows: usize) -> CoreResult<()> {
        if rows != self.dim() {
            return Err(CoreError::DimensionMismatch(format!(
                "noise model of dimension {} applied to {} rows",
                self.dim(),
                rows
            ))
            .log());
        }
        Ok(())
    }

    /// Whiten a residual vector.
    ///
    /// Robust models only apply their base whitening here; the loss enters
    /// through [`loss`](Self::loss) and [`whiten_system`](Self::whiten_system).
    pub fn whiten(&self, v: &DVector<f64>) -> CoreResult<DVector<f64>> {
        self.check_rows(v.len())?;
        Ok(match self {
            NoiseModel::Unit { .. } => v.clone(),
            NoiseModel::Isotropic { sigma, .. } => v / *sigma,
            NoiseModel::Diagonal { sigmas } => v.component_div(sigmas),
            NoiseModel::Gaussian { sqrt_information } => sqrt_information * v,
            NoiseModel::Robust { base, .. } => base.whiten(v)?,
        })
    }

    /// Whiten the linear system `A x = b` in place.
    ///
    /// For robust models the base-whitened system is additionally reweighted
    /// by the loss through a [`Corrector`] evaluated at `||b||²`.
    pub fn whiten_system(&self, a: &mut DMatrix<f64>, b: &mut DVector<f64>) -> CoreResult<()> {
        self.check_rows(a.nrows())?;
        self.check_rows(b.len())?;
        match self {
            NoiseModel::Unit { .. } => {}
            NoiseModel::Isotropic { sigma, .. } => {
                *a /= *sigma;
                *b /= *sigma;
            }
            NoiseModel::Diagonal { sigmas } => {
                for (i, sigma) in sigmas.iter().enumerate() {
                    a.row_mut(i).unscale_mut(*sigma);
                }
                b.component_div_assign(sigmas);
            }
            NoiseModel::Gaussian { sqrt_information } => {
                *a = sqrt_information * &*a;
                *b = sqrt_information * &*b;
            }
            NoiseModel::Robust { loss, base } => {
                base.whiten_system(a, b)?;
                let corrector = Corrector::new(loss, b.norm_squared());
                corrector.correct_jacobian(b, a);
                corrector.correct_residuals(b);
            }
        }
        Ok(())
    }

    /// Cost `ρ(s)` of a whitened residual with squared norm `s`.
    ///
    /// Non-robust models return `s` unchanged.
    pub fn loss(&self, squared_norm: f64) -> f64 {
        match self {
            NoiseModel::Robust { loss, .. } => loss.evaluate(squared_norm)[0],
            _ => squared_norm,
        }
    }

    /// Weight `ρ'(s)` of a whitened residual with squared norm `s`.
    pub fn weight(&self, squared_norm: f64) -> f64 {
        match self {
            NoiseModel::Robust { loss, .. } => loss.weight(squared_norm),
            _ => 1.0,
        }
    }
}

impl Equals for NoiseModel {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        match (self, other) {
            (NoiseModel::Unit { dim: a }, NoiseModel::Unit { dim: b }) => a == b,
            (
                NoiseModel::Isotropic { dim: da, sigma: sa },
                NoiseModel::Isotropic { dim: db, sigma: sb },
            ) => da == db && (sa - sb).abs() <= tol,
            (NoiseModel::Diagonal { sigmas: a }, NoiseModel::Diagonal { sigmas: b }) => {
                a.len() == b.len() && (a - b).amax() <= tol
            }
            (
                NoiseModel::Gaussian {
                    sqrt_information: a,
                },
                NoiseModel::Gaussian {
                    sqrt_information: b,
                },
            ) => a.shape() == b.shape() && (a - b).amax() <= tol,
            (
                NoiseModel::Robust { loss: la, base: ba },
                NoiseModel::Robust { loss: lb, base: bb },
            ) => la.equals(lb, tol) && ba.equals(bb, tol),
            _ => false,
        }
    }
}

impl Display for NoiseModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NoiseModel::Unit { dim } => write!(f, "Unit (dim {dim})"),
            NoiseModel::Isotropic { dim, sigma } => {
                write!(f, "Isotropic (dim {dim}, sigma {sigma})")
            }
            NoiseModel::Diagonal { sigmas } => {
                write!(f, "Diagonal (sigmas {:?})", sigmas.as_slice())
            }
            NoiseModel::Gaussian { sqrt_information } => {
                write!(f, "Gaussian (dim {})", sqrt_information.nrows())
            }
            NoiseModel::Robust { loss, base } => write!(f, "Robust ({loss:?}) over {base}"),
        }
    }
}
