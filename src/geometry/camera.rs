//! Pinhole camera with known pose and calibration.

use std::fmt::{self, Display, Formatter};

use nalgebra::{Matrix2x3, Vector3};
use serde::{Deserialize, Serialize};

use super::{Cal3S2, Calibration, GeometryError, GeometryResult, Point2, Point3, Pose3};
use crate::core::Equals;

/// A calibrated pinhole camera at a fixed pose.
///
/// Generic over the intrinsics model, [`Cal3S2`] by default.
///
/// # Example
///
/// ```
/// use apex_triangulation::geometry::{Cal3S2, PinholeCamera, Pose3};
/// use nalgebra::Vector3;
///
/// let camera = PinholeCamera::new(Pose3::identity(), Cal3S2::new(500.0, 500.0, 0.0, 320.0, 240.0));
/// let (uv, jacobian) = camera.project(&Vector3::new(0.0, 0.0, 2.0))?;
/// assert_eq!(uv, nalgebra::Vector2::new(320.0, 240.0));
/// assert_eq!(jacobian.nrows(), 2);
/// # Ok::<(), apex_triangulation::geometry::GeometryError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "C: Calibration")]
pub struct PinholeCamera<C: Calibration = Cal3S2> {
    pose: Pose3,
    calibration: C,
}

impl<C: Calibration> Display for PinholeCamera<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PinholeCamera({}, {})", self.pose, self.calibration)
    }
}

impl<C: Calibration> PinholeCamera<C> {
    pub fn new(pose: Pose3, calibration: C) -> Self {
        PinholeCamera { pose, calibration }
    }

    /// Camera at `eye` looking at `target`, see [`Pose3::look_at`].
    pub fn look_at(
        eye: &Point3,
        target: &Point3,
        up: &Vector3<f64>,
        calibration: C,
    ) -> GeometryResult<Self> {
        Ok(PinholeCamera {
            pose: Pose3::look_at(eye, target, up)?,
            calibration,
        })
    }

    pub fn pose(&self) -> &Pose3 {
        &self.pose
    }

    pub fn calibration(&self) -> &C {
        &self.calibration
    }

    /// Project a world point into the image.
    ///
    /// Returns the predicted pixel and its 2×3 Jacobian with respect to the point:
    ///
    /// ```text
    /// ∂uv/∂p = ∂uv/∂pn · ∂pn/∂pc · ∂pc/∂p
    ///
    /// ∂pn/∂pc = [1/z   0   -x/z²]
    ///           [ 0   1/z  -y/z²]
    /// ```
    ///
    /// # Errors
    ///
    /// [`GeometryError::Cheirality`] when the point has non-positive depth in
    /// the camera frame.
    pub fn project(&self, point: &Point3) -> GeometryResult<(Point2, Matrix2x3<f64>)> {
        let (pc, d_pc_d_p) = self.pose.transform_to(point);
        if pc.z <= 0.0 {
            return Err(GeometryError::Cheirality { depth: pc.z });
        }

        let inv_z = 1.0 / pc.z;
        let pn = Point2::new(pc.x * inv_z, pc.y * inv_z);
        let d_pn_d_pc = Matrix2x3::new(
            inv_z, 0.0, -pn.x * inv_z, //
            0.0, inv_z, -pn.y * inv_z,
        );

        let (uv, d_uv_d_pn) = self.calibration.uncalibrate(&pn);
        Ok((uv, d_uv_d_pn * d_pn_d_pc * d_pc_d_p))
    }

    /// Project a world point into the image without computing the Jacobian.
    pub fn project_point(&self, point: &Point3) -> GeometryResult<Point2> {
        let (pc, _) = self.pose.transform_to(point);
        if pc.z <= 0.0 {
            return Err(GeometryError::Cheirality { depth: pc.z });
        }
        let pn = Point2::new(pc.x / pc.z, pc.y / pc.z);
        Ok(self.calibration.uncalibrate(&pn).0)
    }

    /// World point seen at pixel `uv` at the given depth along the optical axis.
    pub fn backproject(&self, uv: &Point2, depth: f64) -> Point3 {
        let pn = self.calibration.calibrate(uv);
        self.pose
            .transform_from(&Point3::new(pn.x * depth, pn.y * depth, depth))
    }
}

impl<C: Calibration> Equals for PinholeCamera<C> {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        self.pose.equals(&other.pose, tol) && self.calibration.equals(&other.calibration, tol)
    }
}
