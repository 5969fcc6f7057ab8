//! Corrector for applying robust losses to a linearized system.
//!
//! Given a whitened residual `r` with squared norm `s = ||r||²`, a Jacobian `J`
//! and a loss ρ, the corrector rescales the system so that an ordinary least
//! squares step on the corrected `(J̃, r̃)` matches a Newton step on `ρ(s)`:
//!
//! ```text
//! √ρ₁ = √ρ'(s)
//! α   = 1 - √(1 + 2 s ρ''(s) / ρ'(s))
//! r̃   = √ρ₁ / (1 - α) · r
//! J̃   = √ρ₁ · (J - (α / s) · r rᵀ J)
//! ```
//!
//! Reference: Triggs et al., "Bundle Adjustment: A Modern Synthesis" (1999),
//! and the Ceres Solver corrector.
//!
//! A linear factor stores `b = -r` rather than `r`. Both corrections are
//! invariant to the sign of the residual (`r rᵀ` is even, the residual scaling
//! is linear), so they apply to `b` unchanged.

use nalgebra::{DMatrix, DVector};

use crate::core::loss_functions::LossFunction;

/// Precomputed scaling factors for one residual block.
#[derive(Debug, Clone)]
pub struct Corrector {
    sqrt_rho1: f64,
    residual_scaling: f64,
    alpha_sq_norm: f64,
}

impl Corrector {
    /// Evaluate the loss at squared norm `sq_norm` and prepare the corrections.
    pub fn new(loss_function: &dyn LossFunction, sq_norm: f64) -> Self {
        let [_, rho_1, rho_2] = loss_function.evaluate(sq_norm);
        let sqrt_rho1 = rho_1.max(0.0).sqrt();

        // No curvature term: plain reweighting
        if sq_norm == 0.0 || rho_2 <= 0.0 || rho_1 <= 0.0 {
            return Self {
                sqrt_rho1,
                residual_scaling: sqrt_rho1,
                alpha_sq_norm: 0.0,
            };
        }

        // α solves 0.5·α² - α - (ρ''/ρ')·s = 0
        let d = 1.0 + 2.0 * sq_norm * rho_2 / rho_1;
        let alpha = 1.0 - d.sqrt();

        Self {
            sqrt_rho1,
            residual_scaling: sqrt_rho1 / (1.0 - alpha),
            alpha_sq_norm: alpha / sq_norm,
        }
    }

    /// The weight `√ρ'(s)` applied to the residual.
    pub fn sqrt_weight(&self) -> f64 {
        self.sqrt_rho1
    }

    /// Apply the correction to a Jacobian in place.
    pub fn correct_jacobian(&self, residual: &DVector<f64>, jacobian: &mut DMatrix<f64>) {
        if self.alpha_sq_norm == 0.0 {
            *jacobian *= self.sqrt_rho1;
            return;
        }

        let r_rtj = residual * (residual.transpose() * &*jacobian);
        *jacobian -= r_rtj * self.alpha_sq_norm;
        *jacobian *= self.sqrt_rho1;
    }

    /// Apply the correction to a residual (or right-hand side) in place.
    pub fn correct_residuals(&self, residual: &mut DVector<f64>) {
        *residual *= self.residual_scaling;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loss_functions::{CauchyLoss, HuberLoss, L2Loss, TukeyBiweightLoss};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_l2_is_identity() {
        let residual = DVector::from_vec(vec![3.0, -4.0]);
        let corrector = Corrector::new(&L2Loss, residual.norm_squared());

        let mut corrected = residual.clone();
        corrector.correct_residuals(&mut corrected);
        assert_eq!(corrected, residual);

        let mut jacobian = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let original = jacobian.clone();
        corrector.correct_jacobian(&residual, &mut jacobian);
        assert_eq!(jacobian, original);
    }

    #[test]
    fn test_huber_inlier_unchanged() -> TestResult {
        let loss = HuberLoss::new(1.0)?;
        let residual = DVector::from_vec(vec![0.1, 0.2]);
        let corrector = Corrector::new(&loss, residual.norm_squared());

        let mut corrected = residual.clone();
        corrector.correct_residuals(&mut corrected);
        assert!((corrected - residual).norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_huber_outlier_downweighted() -> TestResult {
        let loss = HuberLoss::new(1.0)?;
        let residual = DVector::from_vec(vec![5.0, 5.0]);
        let corrector = Corrector::new(&loss, residual.norm_squared());
        assert!(corrector.sqrt_weight() < 1.0 && corrector.sqrt_weight() > 0.0);

        let mut corrected = residual.clone();
        corrector.correct_residuals(&mut corrected);
        assert!(corrected.norm() < residual.norm());

        let mut jacobian = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let original = jacobian.clone();
        corrector.correct_jacobian(&residual, &mut jacobian);
        assert!((jacobian - original).norm() > 1e-6);
        Ok(())
    }

    #[test]
    fn test_sign_invariance() -> TestResult {
        let loss = CauchyLoss::new(1.0)?;
        let residual = DVector::from_vec(vec![2.0, -3.0]);
        let negated = -residual.clone();
        let corrector = Corrector::new(&loss, residual.norm_squared());

        let mut j1 = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.5, -1.0, 0.0, 3.0]);
        let mut j2 = j1.clone();
        corrector.correct_jacobian(&residual, &mut j1);
        corrector.correct_jacobian(&negated, &mut j2);
        assert!((j1 - j2).norm() < 1e-12);

        let mut r1 = residual.clone();
        let mut r2 = negated.clone();
        corrector.correct_residuals(&mut r1);
        corrector.correct_residuals(&mut r2);
        assert!((r1 + r2).norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_zero_weight_zeroes_system() -> TestResult {
        let loss = TukeyBiweightLoss::new(1.0)?;
        let residual = DVector::from_vec(vec![10.0, 0.0]);
        let corrector = Corrector::new(&loss, residual.norm_squared());

        let mut jacobian = DMatrix::from_element(2, 3, 1.0);
        let mut rhs = residual.clone();
        corrector.correct_jacobian(&residual, &mut jacobian);
        corrector.correct_residuals(&mut rhs);
        assert_eq!(jacobian.norm(), 0.0);
        assert_eq!(rhs.norm(), 0.0);
        Ok(())
    }
}
