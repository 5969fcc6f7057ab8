//! Robust loss functions for robust noise models.
//!
//! A loss function ρ(s) replaces the squared norm `s = ||r||²` of a whitened
//! residual in the cost, reducing the influence of outlier measurements. Each
//! loss evaluates `[ρ(s), ρ'(s), ρ''(s)]`; the first derivative is the weight
//! used to reweight the linearized system, and the second feeds the
//! [`Corrector`](crate::core::corrector::Corrector).
//!
//! Losses whose weight drops to exactly zero for large residuals (Tukey) also
//! act as a gate: a factor whose weight is zero at the current estimate is
//! inactive and is not linearized.
//!
//! # Available Loss Functions
//!
//! - [`L2Loss`]: Standard least squares (no robustness)
//! - [`HuberLoss`]: Quadratic for inliers, linear for outliers
//! - [`CauchyLoss`]: Logarithmic growth, strong outlier downweighting
//! - [`GemanMcClureLoss`]: Bounded cost
//! - [`TukeyBiweightLoss`]: Zero weight beyond the scale
//!
//! [`RobustLoss`] wraps these in a serializable enum used by
//! [`NoiseModel::Robust`](crate::core::noise_model::NoiseModel::Robust).

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult, Equals};

/// Trait for robust loss functions evaluated at the squared residual norm.
pub trait LossFunction: Send + Sync {
    /// Evaluate `[ρ(s), ρ'(s), ρ''(s)]` at `s = ||r||²` (always non-negative).
    fn evaluate(&self, s: f64) -> [f64; 3];
}

fn check_scale(scale: f64) -> CoreResult<()> {
    if scale <= 0.0 || !scale.is_finite() {
        return Err(
            CoreError::InvalidInput(format!("loss scale must be positive, got {scale}")).log(),
        );
    }
    Ok(())
}

/// Serialized form of a scaled loss. Decoding goes through the loss's `new`,
/// so a non-positive scale is rejected and derived fields are recomputed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LossScale {
    scale: f64,
}

macro_rules! scaled_loss_serde {
    ($($loss:ident),+) => {
        $(
            impl TryFrom<LossScale> for $loss {
                type Error = CoreError;

                fn try_from(data: LossScale) -> CoreResult<Self> {
                    $loss::new(data.scale)
                }
            }

            impl From<$loss> for LossScale {
                fn from(loss: $loss) -> Self {
                    LossScale { scale: loss.scale }
                }
            }
        )+
    };
}

scaled_loss_serde!(HuberLoss, CauchyLoss, GemanMcClureLoss, TukeyBiweightLoss);

/// Standard least squares: `ρ(s) = s`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct L2Loss;

impl LossFunction for L2Loss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        [s, 1.0, 0.0]
    }
}

/// Huber loss with threshold `δ`.
///
/// ```text
/// ρ(s) = s               if s ≤ δ²
/// ρ(s) = 2δ√s - δ²       if s > δ²
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LossScale", into = "LossScale")]
pub struct HuberLoss {
    scale: f64,
    scale2: f64,
}

impl HuberLoss {
    pub fn new(scale: f64) -> CoreResult<Self> {
        check_scale(scale)?;
        Ok(HuberLoss {
            scale,
            scale2: scale * scale,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl LossFunction for HuberLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        if s > self.scale2 {
            let r = s.sqrt();
            let rho1 = (self.scale / r).max(f64::MIN);
            [2.0 * self.scale * r - self.scale2, rho1, -rho1 / (2.0 * s)]
        } else {
            [s, 1.0, 0.0]
        }
    }
}

/// Cauchy loss: `ρ(s) = δ² ln(1 + s/δ²)`, so that ρ'(0) = 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LossScale", into = "LossScale")]
pub struct CauchyLoss {
    scale: f64,
    scale2: f64,
}

impl CauchyLoss {
    pub fn new(scale: f64) -> CoreResult<Self> {
        check_scale(scale)?;
        Ok(CauchyLoss {
            scale,
            scale2: scale * scale,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl LossFunction for CauchyLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        let c = 1.0 / self.scale2;
        let sum = 1.0 + s * c;
        let inv = 1.0 / sum;
        [self.scale2 * sum.ln(), inv.max(f64::MIN), -c * inv * inv]
    }
}

/// Geman-McClure loss: `ρ(s) = s / (1 + s/δ²)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LossScale", into = "LossScale")]
pub struct GemanMcClureLoss {
    scale: f64,
}

impl GemanMcClureLoss {
    pub fn new(scale: f64) -> CoreResult<Self> {
        check_scale(scale)?;
        Ok(GemanMcClureLoss { scale })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl LossFunction for GemanMcClureLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        let c = 1.0 / (self.scale * self.scale);
        let inv = 1.0 / (1.0 + s * c);
        let inv2 = inv * inv;
        [s * inv, inv2, -2.0 * c * inv2 * inv]
    }
}

/// Tukey biweight loss with cutoff `c`.
///
/// Residuals with `||r|| > c` get zero weight and a constant cost of `c²/6`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LossScale", into = "LossScale")]
pub struct TukeyBiweightLoss {
    scale: f64,
    scale2: f64,
}

impl TukeyBiweightLoss {
    pub fn new(scale: f64) -> CoreResult<Self> {
        check_scale(scale)?;
        Ok(TukeyBiweightLoss {
            scale,
            scale2: scale * scale,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl LossFunction for TukeyBiweightLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        let x = s.sqrt();
        if x > self.scale {
            return [self.scale2 / 6.0, 0.0, 0.0];
        }

        let ratio = x / self.scale;
        let one_minus_ratio2 = 1.0 - ratio * ratio;
        let one_minus_ratio2_sq = one_minus_ratio2 * one_minus_ratio2;
        [
            (self.scale2 / 6.0) * (1.0 - one_minus_ratio2 * one_minus_ratio2_sq),
            0.5 * one_minus_ratio2_sq,
            -(ratio / self.scale2) * one_minus_ratio2,
        ]
    }
}

/// Serializable choice of robust loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobustLoss {
    L2(L2Loss),
    Huber(HuberLoss),
    Cauchy(CauchyLoss),
    GemanMcClure(GemanMcClureLoss),
    Tukey(TukeyBiweightLoss),
}

impl RobustLoss {
    pub fn huber(scale: f64) -> CoreResult<Self> {
        Ok(RobustLoss::Huber(HuberLoss::new(scale)?))
    }

    pub fn cauchy(scale: f64) -> CoreResult<Self> {
        Ok(RobustLoss::Cauchy(CauchyLoss::new(scale)?))
    }

    pub fn geman_mcclure(scale: f64) -> CoreResult<Self> {
        Ok(RobustLoss::GemanMcClure(GemanMcClureLoss::new(scale)?))
    }

    pub fn tukey(scale: f64) -> CoreResult<Self> {
        Ok(RobustLoss::Tukey(TukeyBiweightLoss::new(scale)?))
    }

    fn as_loss(&self) -> &dyn LossFunction {
        match self {
            RobustLoss::L2(loss) => loss,
            RobustLoss::Huber(loss) => loss,
            RobustLoss::Cauchy(loss) => loss,
            RobustLoss::GemanMcClure(loss) => loss,
            RobustLoss::Tukey(loss) => loss,
        }
    }

    fn scale(&self) -> Option<f64> {
        match self {
            RobustLoss::L2(_) => None,
            RobustLoss::Huber(loss) => Some(loss.scale()),
            RobustLoss::Cauchy(loss) => Some(loss.scale()),
            RobustLoss::GemanMcClure(loss) => Some(loss.scale()),
            RobustLoss::Tukey(loss) => Some(loss.scale()),
        }
    }

    /// The weight ρ'(s) applied to a residual with squared norm `s`.
    pub fn weight(&self, s: f64) -> f64 {
        self.evaluate(s)[1]
    }
}

impl LossFunction for RobustLoss {
    fn evaluate(&self, s: f64) -> [f64; 3] {
        self.as_loss().evaluate(s)
    }
}

impl Equals for RobustLoss {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && match (self.scale(), other.scale()) {
                (Some(a), Some(b)) => (a - b).abs() <= tol,
                (None, None) => true,
                _ => false,
            }
    }
}
