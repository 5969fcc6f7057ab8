//! Camera geometry consumed by the projection factors.
//!
//! This module provides the minimal geometry a reprojection factor needs:
//! - **[`Pose3`]**: rigid camera pose (camera-to-world)
//! - **[`Calibration`]**: intrinsics mapping normalized coordinates to pixels
//! - **[`Cal3S2`]**: five-parameter pinhole calibration (fx, fy, skew, u0, v0)
//! - **[`Cal3Bundler`]**: focal length with two radial distortion terms
//! - **[`PinholeCamera`]**: pose plus calibration, projecting world points to pixels
//!
//! # Conventions
//!
//! The camera looks down its +z axis. A world point `p` is expressed in the
//! camera frame as `p_c = Rᵀ (p - t)` where `(R, t)` is the camera pose in the world.
//! Points with `p_c.z <= 0` are behind the camera and cannot be projected: the
//! projection returns [`GeometryError::Cheirality`] instead of a pixel.
//!
//! ```text
//! p_c   = Rᵀ (p - t)
//! x, y  = p_c.x / p_c.z, p_c.y / p_c.z
//! u, v  = uncalibrate(x, y)
//! ```
//!
//! For [`Cal3S2`], `u = fx * x + s * y + u0` and `v = fy * y + v0`.

pub mod bundler;
pub mod calibration;
pub mod camera;
pub mod pose;

pub use bundler::Cal3Bundler;
pub use calibration::{Cal3S2, Calibration};
pub use camera::PinholeCamera;
pub use pose::Pose3;

use nalgebra::{Vector2, Vector3};
use thiserror::Error;
use tracing::error;

/// 2D image point (pixels or normalized coordinates).
pub type Point2 = Vector2<f64>;

/// 3D point in the world frame.
pub type Point3 = Vector3<f64>;

/// Geometry error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Point lies behind the optical center, projection is undefined
    #[error("Cheirality exception: point at depth {depth} is behind the camera")]
    Cheirality { depth: f64 },

    /// Pose could not be constructed from the given inputs
    #[error("Invalid pose: {0}")]
    InvalidPose(String),
}

impl GeometryError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for geometry operations
pub type GeometryResult<T> = Result<T, GeometryError>;
