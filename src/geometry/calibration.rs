//! Camera intrinsics.
//!
//! [`Calibration`] is the interface a [`PinholeCamera`](super::PinholeCamera)
//! needs from its intrinsics: mapping normalized image coordinates to pixels
//! with a Jacobian, and back. [`Cal3S2`] is the five-parameter pinhole model;
//! [`Cal3Bundler`](super::Cal3Bundler) adds radial distortion.

use std::fmt::{self, Debug, Display, Formatter};

use nalgebra::{Matrix2, Matrix3};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::Point2;
use crate::core::Equals;

/// Intrinsic calibration of a camera.
pub trait Calibration:
    Debug + Display + Clone + PartialEq + Equals + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Focal length in x, in pixels.
    fn fx(&self) -> f64;

    /// Convert normalized coordinates to pixels.
    ///
    /// Returns the pixel and its Jacobian with respect to the normalized point.
    fn uncalibrate(&self, p: &Point2) -> (Point2, Matrix2<f64>);

    /// Convert pixels to normalized coordinates.
    fn calibrate(&self, uv: &Point2) -> Point2;
}

/// Pinhole intrinsics with focal lengths, skew and principal point.
///
/// Maps normalized image coordinates `(x, y)` to pixels:
///
/// ```text
/// u = fx * x + s * y + u0
/// v = fy * y + v0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cal3S2 {
    fx: f64,
    fy: f64,
    s: f64,
    u0: f64,
    v0: f64,
}

impl Display for Cal3S2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cal3S2(fx: {}, fy: {}, s: {}, u0: {}, v0: {})",
            self.fx, self.fy, self.s, self.u0, self.v0
        )
    }
}

impl Default for Cal3S2 {
    fn default() -> Self {
        Cal3S2::new(1.0, 1.0, 0.0, 0.0, 0.0)
    }
}

impl Cal3S2 {
    pub fn new(fx: f64, fy: f64, s: f64, u0: f64, v0: f64) -> Self {
        Cal3S2 { fx, fy, s, u0, v0 }
    }

    /// Calibration for an image of `width × height` pixels with a horizontal
    /// field of view of `fov_degrees`, principal point at the image center.
    pub fn from_fov(fov_degrees: f64, width: f64, height: f64) -> Self {
        let u0 = width / 2.0;
        let v0 = height / 2.0;
        let f = u0 / (fov_degrees.to_radians() / 2.0).tan();
        Cal3S2::new(f, f, 0.0, u0, v0)
    }

    /// Focal length in y, in pixels.
    pub fn fy(&self) -> f64 {
        self.fy
    }

    pub fn skew(&self) -> f64 {
        self.s
    }

    pub fn principal_point(&self) -> Point2 {
        Point2::new(self.u0, self.v0)
    }

    /// The calibration matrix `K`.
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.s, self.u0, //
            0.0, self.fy, self.v0, //
            0.0, 0.0, 1.0,
        )
    }
}

impl Calibration for Cal3S2 {
    fn fx(&self) -> f64 {
        self.fx
    }

    fn uncalibrate(&self, p: &Point2) -> (Point2, Matrix2<f64>) {
        let uv = Point2::new(
            self.fx * p.x + self.s * p.y + self.u0,
            self.fy * p.y + self.v0,
        );
        let d_uv_d_p = Matrix2::new(self.fx, self.s, 0.0, self.fy);
        (uv, d_uv_d_p)
    }

    fn calibrate(&self, uv: &Point2) -> Point2 {
        let y = (uv.y - self.v0) / self.fy;
        let x = (uv.x - self.u0 - self.s * y) / self.fx;
        Point2::new(x, y)
    }
}

impl Equals for Cal3S2 {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        (self.fx - other.fx).abs() <= tol
            && (self.fy - other.fy).abs() <= tol
            && (self.s - other.s).abs() <= tol
            && (self.u0 - other.u0).abs() <= tol
            && (self.v0 - other.v0).abs() <= tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fov() {
        let cal = Cal3S2::from_fov(90.0, 640.0, 480.0);
        assert!((cal.fx() - 320.0).abs() < 1e-9);
        assert!((cal.fy() - 320.0).abs() < 1e-9);
        assert_eq!(cal.principal_point(), Point2::new(320.0, 240.0));
        assert_eq!(cal.skew(), 0.0);
    }

    #[test]
    fn test_calibrate_inverts_uncalibrate() {
        let cal = Cal3S2::new(500.0, 480.0, 0.5, 320.0, 240.0);
        let p = Point2::new(0.12, -0.34);
        let (uv, _) = cal.uncalibrate(&p);
        assert!((cal.calibrate(&uv) - p).norm() < 1e-12);
    }

    #[test]
    fn test_uncalibrate_matches_k_matrix() {
        let cal = Cal3S2::new(500.0, 480.0, 0.5, 320.0, 240.0);
        let p = Point2::new(0.2, 0.1);
        let (uv, jac) = cal.uncalibrate(&p);
        let h = cal.k_matrix() * nalgebra::Vector3::new(p.x, p.y, 1.0);
        assert!((uv - Point2::new(h.x, h.y)).norm() < 1e-12);
        assert_eq!(jac, Matrix2::new(500.0, 0.5, 0.0, 480.0));
    }

    #[test]
    fn test_equals() {
        let a = Cal3S2::new(500.0, 500.0, 0.0, 320.0, 240.0);
        let b = Cal3S2::new(500.0 + 1e-12, 500.0, 0.0, 320.0, 240.0);
        assert!(a.equals(&b, 1e-9));
        assert!(!a.equals(&Cal3S2::default(), 1e-9));
    }
}
