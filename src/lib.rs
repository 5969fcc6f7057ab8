//! # Apex Triangulation
//!
//! Reprojection factors for triangulating 3D landmarks from calibrated pinhole
//! cameras, in the form a factor-graph optimizer consumes them.
//!
//! ## Features
//!
//! - **Triangulation factor**: residual `π(K, T, p) - z` and its analytic 3×3 Jacobian
//!   with respect to the landmark, for a fixed camera
//! - **Cheirality handling**: configurable fallback, warning or error when a landmark
//!   moves behind the camera
//! - **Noise models**: unit, isotropic, diagonal, full Gaussian and robust (Huber, Cauchy,
//!   Geman-McClure, Tukey) whitening of residuals and linear systems
//! - **Linearization**: whitened [`JacobianFactor`](linear::JacobianFactor)s written through
//!   a reusable, caller-owned [`LinearizationWorkspace`](linear::LinearizationWorkspace)
//! - **Calibration models**: the [`Calibration`] trait with pinhole ([`Cal3S2`]) and
//!   radially distorted ([`Cal3Bundler`]) intrinsics
//! - **Serialization**: all factors, cameras and noise models derive serde, and decoding
//!   runs the same validation as the constructors
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use apex_triangulation::core::{graph::FactorGraph, noise_model::NoiseModel, values::Values};
//! use apex_triangulation::factors::TriangulationFactor;
//! use apex_triangulation::geometry::{Cal3S2, PinholeCamera, Point3};
//! use nalgebra::Vector3;
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let landmark = Point3::new(0.0, 0.0, 4.0);
//! let noise = Arc::new(NoiseModel::isotropic(2, 1.0)?);
//! let mut graph = FactorGraph::new();
//! for x in [-1.0, 1.0] {
//!     let camera = PinholeCamera::look_at(
//!         &Vector3::new(x, 0.0, 0.0),
//!         &landmark,
//!         &Vector3::y(),
//!         Cal3S2::new(500.0, 500.0, 0.0, 320.0, 240.0),
//!     )?;
//!     let z = camera.project_point(&landmark)?;
//!     graph.add(TriangulationFactor::new(camera, z, Some(noise.clone()), "l1")?);
//! }
//!
//! let mut values = Values::new();
//! values.insert("l1", Point3::new(0.1, 0.0, 3.8))?;
//! let linear = graph.linearize(&values)?;
//! assert_eq!(linear.len(), 2);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod core;
pub mod error;
pub mod factors;
pub mod geometry;
pub mod linear;
#[cfg(feature = "logging")]
pub mod logger;

pub use crate::core::{Equals, Key, symbol};
pub use error::{TriangulationError, TriangulationResult};

pub use factors::{
    CheiralityConfig, FactorError, GraphFactor, NonlinearFactor, PointPriorFactor,
    TriangulationFactor,
};
pub use geometry::{Cal3Bundler, Cal3S2, Calibration, PinholeCamera, Point2, Point3, Pose3};
pub use linear::{JacobianFactor, LinearizationWorkspace};

#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
