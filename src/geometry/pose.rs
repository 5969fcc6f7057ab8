//! Rigid camera pose.

use std::fmt::{self, Display, Formatter};

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::{GeometryError, GeometryResult, Point3};
use crate::core::Equals;

/// Rigid transformation in 3D, used as the pose of a camera in the world.
///
/// Stores the rotation as a unit quaternion and the translation as the camera
/// center expressed in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose3 {
    rotation: UnitQuaternion<f64>,
    translation: Vector3<f64>,
}

impl Display for Pose3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation;
        write!(
            f,
            "Pose3(t: [{:.4}, {:.4}, {:.4}], q: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

impl Pose3 {
    /// Create a pose from a rotation and the camera center.
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Pose3 {
            rotation,
            translation,
        }
    }

    /// The identity pose: camera at the origin looking down world +z.
    pub fn identity() -> Self {
        Pose3 {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create a pose from a translation and roll/pitch/yaw angles (radians).
    pub fn from_translation_euler(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Pose3 {
            rotation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
            translation: Vector3::new(x, y, z),
        }
    }

    /// Pose of a camera at `eye` looking at `target`, with `up` roughly pointing up.
    ///
    /// The camera z axis points from `eye` to `target`, the x axis to the right
    /// of the image and the y axis down, so `up` maps to -y.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidPose`] if `eye == target` or the viewing
    /// direction is parallel to `up`.
    pub fn look_at(eye: &Point3, target: &Point3, up: &Vector3<f64>) -> GeometryResult<Self> {
        let zc = (target - eye).try_normalize(f64::EPSILON).ok_or_else(|| {
            GeometryError::InvalidPose("eye and target coincide".to_string()).log()
        })?;
        let xc = (-up).cross(&zc).try_normalize(f64::EPSILON).ok_or_else(|| {
            GeometryError::InvalidPose("viewing direction is parallel to up".to_string()).log()
        })?;
        let yc = zc.cross(&xc);

        let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[xc, yc, zc]));
        Ok(Pose3 {
            rotation: UnitQuaternion::from_rotation_matrix(&rotation),
            translation: *eye,
        })
    }

    /// Camera center in world coordinates.
    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    /// Camera orientation in the world.
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }

    /// Rotation as a 3×3 matrix whose columns are the camera axes in world frame.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Express a world point in the camera frame.
    ///
    /// Returns `(p_c, ∂p_c/∂p)` where `p_c = Rᵀ (p - t)` and the Jacobian is `Rᵀ`.
    pub fn transform_to(&self, point: &Point3) -> (Point3, Matrix3<f64>) {
        let rt = self.rotation_matrix().transpose();
        (rt * (point - self.translation), rt)
    }

    /// Express a camera-frame point in the world frame: `R p_c + t`.
    pub fn transform_from(&self, point: &Point3) -> Point3 {
        self.rotation * point + self.translation
    }
}

impl Equals for Pose3 {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        self.translation.equals(&other.translation, tol)
            && (self.rotation_matrix() - other.rotation_matrix()).amax() <= tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_identity_transform_is_noop() {
        let pose = Pose3::identity();
        let p = Vector3::new(1.0, -2.0, 3.0);
        let (pc, d) = pose.transform_to(&p);
        assert!((pc - p).norm() < 1e-12);
        assert!((d - Matrix3::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_transform_round_trip() {
        let pose = Pose3::from_translation_euler(0.5, -1.0, 2.0, 0.1, -0.2, 0.3);
        let p = Vector3::new(4.0, 5.0, 6.0);
        let (pc, _) = pose.transform_to(&p);
        assert!((pose.transform_from(&pc) - p).norm() < 1e-12);
    }

    #[test]
    fn test_look_at_points_z_axis_at_target() -> TestResult {
        let eye = Vector3::new(0.0, 0.0, 0.0);
        let target = Vector3::new(1.0, 0.0, 0.0);
        let pose = Pose3::look_at(&eye, &target, &Vector3::z())?;

        let (pc, _) = pose.transform_to(&target);
        assert!(pc.x.abs() < 1e-12);
        assert!(pc.y.abs() < 1e-12);
        assert!((pc.z - 1.0).abs() < 1e-12);

        // World up appears as -y in the camera frame
        let (above, _) = pose.transform_to(&Vector3::new(1.0, 0.0, 1.0));
        assert!(above.y < 0.0);
        Ok(())
    }

    #[test]
    fn test_look_at_degenerate_inputs() {
        let eye = Vector3::new(0.0, 0.0, 0.0);
        assert!(Pose3::look_at(&eye, &eye, &Vector3::y()).is_err());
        assert!(Pose3::look_at(&eye, &Vector3::new(0.0, 0.0, 5.0), &Vector3::z()).is_err());
    }

    #[test]
    fn test_equals_tolerance() {
        let a = Pose3::from_translation_euler(1.0, 2.0, 3.0, 0.0, 0.0, FRAC_PI_2);
        let b = Pose3::from_translation_euler(1.0, 2.0, 3.0 + 1e-12, 0.0, 0.0, FRAC_PI_2);
        let c = Pose3::from_translation_euler(1.0, 2.0, 3.0, 0.0, 0.0, 0.0);
        assert!(a.equals(&b, 1e-9));
        assert!(!a.equals(&c, 1e-9));
    }
}
