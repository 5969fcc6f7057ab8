//! Bundler calibration: single focal length with two radial distortion terms.

use std::fmt::{self, Display, Formatter};

use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

use super::{Calibration, Point2};
use crate::core::Equals;

const CALIBRATE_MAX_ITERATIONS: usize = 30;
const CALIBRATE_TOLERANCE: f64 = 1e-12;

/// Calibration used by Bundler and the BAL datasets.
///
/// ```text
/// r² = x² + y²
/// g  = 1 + k1 r² + k2 r⁴
/// u  = f g x + u0
/// v  = f g y + v0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cal3Bundler {
    f: f64,
    k1: f64,
    k2: f64,
    u0: f64,
    v0: f64,
}

impl Cal3Bundler {
    pub fn new(f: f64, k1: f64, k2: f64, u0: f64, v0: f64) -> Self {
        Cal3Bundler { f, k1, k2, u0, v0 }
    }

    pub fn k1(&self) -> f64 {
        self.k1
    }

    pub fn k2(&self) -> f64 {
        self.k2
    }

    fn radial_gain(&self, p: &Point2) -> (f64, f64) {
        let r2 = p.norm_squared();
        let g = 1.0 + (self.k1 + self.k2 * r2) * r2;
        // ∂g/∂x = dg_factor * x, ∂g/∂y = dg_factor * y
        let dg_factor = 2.0 * self.k1 + 4.0 * self.k2 * r2;
        (g, dg_factor)
    }
}

impl Calibration for Cal3Bundler {
    fn fx(&self) -> f64 {
        self.f
    }

    fn uncalibrate(&self, p: &Point2) -> (Point2, Matrix2<f64>) {
        let (g, dg) = self.radial_gain(p);
        let uv = Point2::new(self.f * g * p.x + self.u0, self.f * g * p.y + self.v0);
        let d_uv_d_p = Matrix2::new(
            self.f * (g + dg * p.x * p.x),
            self.f * dg * p.x * p.y,
            self.f * dg * p.x * p.y,
            self.f * (g + dg * p.y * p.y),
        );
        (uv, d_uv_d_p)
    }

    /// Inverts the distortion by fixed-point iteration, which converges for
    /// the moderate distortion found in real lenses.
    fn calibrate(&self, uv: &Point2) -> Point2 {
        let distorted = Point2::new((uv.x - self.u0) / self.f, (uv.y - self.v0) / self.f);
        let mut p = distorted;
        for _ in 0..CALIBRATE_MAX_ITERATIONS {
            let (g, _) = self.radial_gain(&p);
            let next = distorted / g;
            let step = (next - p).norm();
            p = next;
            if step < CALIBRATE_TOLERANCE {
                break;
            }
        }
        p
    }
}

impl Equals for Cal3Bundler {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        (self.f - other.f).abs() <= tol
            && (self.k1 - other.k1).abs() <= tol
            && (self.k2 - other.k2).abs() <= tol
            && (self.u0 - other.u0).abs() <= tol
            && (self.v0 - other.v0).abs() <= tol
    }
}

impl Display for Cal3Bundler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cal3Bundler(f: {}, k1: {}, k2: {}, u0: {}, v0: {})",
            self.f, self.k1, self.k2, self.u0, self.v0
        )
    }
}
