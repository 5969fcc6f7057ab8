//! Reprojection factor for triangulating a landmark seen by a known camera.
//!
//! The camera pose and calibration are fixed; the only unknown is the 3D
//! landmark position. The factor is generic over the camera's [`Calibration`]
//! and defaults to [`Cal3S2`]. The residual is the difference between the landmark's
//! projection and the measured pixel:
//!
//! ```text
//! r(p) = π(K, T, p) - z          (2×1)
//! J    = ∂π/∂p                    (2×3)
//! ```
//!
//! # Points Behind the Camera
//!
//! When the landmark has non-positive depth in the camera frame the projection
//! is undefined (cheirality failure). [`TriangulationFactor::evaluate_error`]
//! then applies the factor's [`CheiralityConfig`]:
//!
//! 1. the requested Jacobian is the zero 2×3 matrix;
//! 2. with `verbose_cheirality`, a warning names the landmark key;
//! 3. with `throw_cheirality`, [`FactorError::Cheirality`] is returned;
//! 4. otherwise the residual is the constant `(2·fx, 2·fx)`.
//!
//! The constant residual is large enough to push the optimizer away from the
//! degenerate configuration without aborting the solve.
//!
//! [`NonlinearFactor::linearize`] does not apply this policy: a landmark behind
//! the camera always fails linearization with [`FactorError::Cheirality`].
//!
//! # Serialization
//!
//! Decoding goes through [`TriangulationFactor::new`], so a serialized factor
//! whose noise model is not 2-dimensional is rejected.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use nalgebra::{DVector, Matrix2x3, Vector2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    FactorError, FactorResult, NonlinearFactor, check_noise_model_dim, noise_models_equal,
};
use crate::core::{Equals, Key, noise_model::NoiseModel, values::Values};
use crate::geometry::{Cal3S2, Calibration, PinholeCamera, Point2, Point3};
use crate::linear::{JacobianFactor, LinearizationWorkspace};

/// Handling of landmarks that move behind the camera.
///
/// # Example
///
/// ```
/// use apex_triangulation::factors::CheiralityConfig;
///
/// let config = CheiralityConfig::default()
///     .with_throw_cheirality(true)
///     .with_verbose_cheirality(true);
/// assert!(config.throw_cheirality);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheiralityConfig {
    /// Return an error instead of the constant residual
    pub throw_cheirality: bool,
    /// Log a warning naming the landmark
    pub verbose_cheirality: bool,
}

impl CheiralityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_throw_cheirality(mut self, throw_cheirality: bool) -> Self {
        self.throw_cheirality = throw_cheirality;
        self
    }

    pub fn with_verbose_cheirality(mut self, verbose_cheirality: bool) -> Self {
        self.verbose_cheirality = verbose_cheirality;
        self
    }
}

/// Factor constraining a landmark by its 2D observation in a known camera.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use apex_triangulation::core::{noise_model::NoiseModel, values::Values};
/// use apex_triangulation::factors::{NonlinearFactor, TriangulationFactor};
/// use apex_triangulation::geometry::{Cal3S2, PinholeCamera, Point2, Point3, Pose3};
/// use apex_triangulation::linear::LinearizationWorkspace;
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
///
/// let camera = PinholeCamera::new(Pose3::identity(), Cal3S2::new(500.0, 500.0, 0.0, 320.0, 240.0));
/// let noise = Arc::new(NoiseModel::isotropic(2, 1.0)?);
/// let factor = TriangulationFactor::new(camera, Point2::new(330.0, 240.0), Some(noise), "l1")?;
///
/// let mut values = Values::new();
/// values.insert("l1", Point3::new(0.0, 0.0, 10.0))?;
///
/// let mut workspace = LinearizationWorkspace::new();
/// let linear = factor.linearize(&values, &mut workspace)?.ok_or("inactive")?;
/// assert_eq!(linear.rhs()[0], 10.0);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "C: Calibration", try_from = "TriangulationFactorData<C>")]
pub struct TriangulationFactor<C: Calibration = Cal3S2> {
    key: Key,
    noise_model: Option<Arc<NoiseModel>>,
    camera: PinholeCamera<C>,
    measured: Point2,
    config: CheiralityConfig,
}

/// Serialized form, validated by [`TriangulationFactor::new`] on decode.
#[derive(Deserialize)]
#[serde(bound = "C: Calibration")]
struct TriangulationFactorData<C: Calibration> {
    key: Key,
    noise_model: Option<Arc<NoiseModel>>,
    camera: PinholeCamera<C>,
    measured: Point2,
    #[serde(default)]
    config: CheiralityConfig,
}

impl<C: Calibration> TryFrom<TriangulationFactorData<C>> for TriangulationFactor<C> {
    type Error = FactorError;

    fn try_from(data: TriangulationFactorData<C>) -> FactorResult<Self> {
        Ok(
            TriangulationFactor::new(data.camera, data.measured, data.noise_model, data.key)?
                .with_config(data.config),
        )
    }
}

impl<C: Calibration> TriangulationFactor<C> {
    /// Residual dimension.
    pub const DIM: usize = 2;

    /// Create a factor with the default cheirality handling.
    ///
    /// # Arguments
    ///
    /// * `camera` - Camera in which the landmark was observed
    /// * `measured` - Observed pixel
    /// * `noise_model` - Measurement noise, shared with other factors
    /// * `key` - Key of the landmark in [`Values`]
    ///
    /// # Errors
    ///
    /// [`FactorError::InvalidNoiseModelDimension`] if the noise model is not 2-dimensional.
    pub fn new(
        camera: PinholeCamera<C>,
        measured: Point2,
        noise_model: Option<Arc<NoiseModel>>,
        key: impl Into<Key>,
    ) -> FactorResult<Self> {
        check_noise_model_dim(noise_model.as_deref(), Self::DIM)?;
        Ok(TriangulationFactor {
            key: key.into(),
            noise_model,
            camera,
            measured,
            config: CheiralityConfig::default(),
        })
    }

    /// Replace the cheirality handling.
    pub fn with_config(mut self, config: CheiralityConfig) -> Self {
        self.config = config;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn camera(&self) -> &PinholeCamera<C> {
        &self.camera
    }

    /// The measured pixel.
    pub fn measured(&self) -> &Point2 {
        &self.measured
    }

    /// The shared noise model, if any.
    pub fn shared_noise_model(&self) -> Option<&Arc<NoiseModel>> {
        self.noise_model.as_ref()
    }

    pub fn config(&self) -> CheiralityConfig {
        self.config
    }

    pub fn throw_cheirality(&self) -> bool {
        self.config.throw_cheirality
    }

    pub fn verbose_cheirality(&self) -> bool {
        self.config.verbose_cheirality
    }

    /// Reprojection error `π(p) - z` and optionally its Jacobian `∂π/∂p`.
    ///
    /// Behind the camera the configured cheirality handling applies, see the
    /// [module documentation](self).
    ///
    /// # Errors
    ///
    /// [`FactorError::Cheirality`] only when `throw_cheirality` is set.
    pub fn evaluate_error(
        &self,
        point: &Point3,
        compute_jacobian: bool,
    ) -> FactorResult<(Vector2<f64>, Option<Matrix2x3<f64>>)> {
        match self.camera.project(point) {
            Ok((predicted, d_predicted_d_point)) => Ok((
                predicted - self.measured,
                compute_jacobian.then_some(d_predicted_d_point),
            )),
            Err(source) => {
                let jacobian = compute_jacobian.then(Matrix2x3::zeros);
                if self.config.verbose_cheirality {
                    warn!("{}: Landmark {} moved behind camera", source, self.key);
                }
                if self.config.throw_cheirality {
                    return Err(FactorError::Cheirality {
                        key: self.key.clone(),
                        source,
                    });
                }
                let fx = self.camera.calibration().fx();
                Ok((Vector2::repeat(2.0 * fx), jacobian))
            }
        }
    }
}

impl<C: Calibration> NonlinearFactor for TriangulationFactor<C> {
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
        let (residual, _) = self.evaluate_error(point, false)?;
        Ok(DVector::from_column_slice(residual.as_slice()))
    }

    /// Linearize to `A = ∂π/∂p`, `b = z - π(p)`, whitened by the noise model.
    ///
    /// Constrained noise models are not supported.
    fn linearize(
        &self,
        values: &Values,
        workspace: &mut LinearizationWorkspace,
    ) -> FactorResult<Option<JacobianFactor>> {
        if !self.active(values) {
            return Ok(None);
        }

        let point: &Point3 = values.at(&self.key)?;
        let (predicted, d_predicted_d_point) =
            self.camera.project(point).map_err(|source| {
                FactorError::Cheirality {
                    key: self.key.clone(),
                    source,
                }
                .log()
            })?;

        let (a, b) = workspace.buffers(Self::DIM, 3);
        a.copy_from(&d_predicted_d_point);
        b.copy_from(&(self.measured - predicted));
        if let Some(model) = &self.noise_model {
            model.whiten_system(a, b)?;
        }

        Ok(Some(JacobianFactor::new(
            vec![(self.key.clone(), a.clone())],
            b.clone(),
        )?))
    }
}

impl<C: Calibration> Equals for TriangulationFactor<C> {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        self.key == other.key
            && noise_models_equal(self.noise_model(), other.noise_model(), tol)
            && self.camera.equals(&other.camera, tol)
            && self.measured.equals(&other.measured, tol)
    }
}

impl<C: Calibration> Display for TriangulationFactor<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "TriangulationFactor,")?;
        writeln!(f, "  camera: {}", self.camera)?;
        writeln!(f, "  z: [{}, {}]", self.measured.x, self.measured.y)?;
        writeln!(f, "  keys: [{}]", self.key)?;
        match &self.noise_model {
            Some(model) => write!(f, "  noise model: {model}"),
            None => write!(f, "  no noise model"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    use crate::core::loss_functions::RobustLoss;
    use crate::geometry::{Cal3Bundler, GeometryError, Pose3};
    use nalgebra::Vector3;

    type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

    const FX: f64 = 1500.0;

    fn camera() -> Result<PinholeCamera, GeometryError> {
        PinholeCamera::look_at(
            &Vector3::new(0.0, -5.0, 1.0),
            &Vector3::new(0.0, 0.0, 1.0),
            &Vector3::z(),
            Cal3S2::new(FX, 1200.0, 0.0, 640.0, 480.0),
        )
    }

    fn landmark() -> Point3 {
        Point3::new(0.3, 0.8, 1.2)
    }

    fn measurement() -> Result<Point2, GeometryError> {
        camera()?.project_point(&landmark())
    }

    fn factor(noise_model: Option<Arc<NoiseModel>>) -> TestResult<TriangulationFactor> {
        Ok(TriangulationFactor::new(
            camera()?,
            measurement()?,
            noise_model,
            "l1",
        )?)
    }

    fn values_with(point: Point3) -> TestResult<Values> {
        let mut values = Values::new();
        values.insert("l1", point)?;
        Ok(values)
    }

    fn behind_camera() -> Point3 {
        Point3::new(0.0, -10.0, 1.0)
    }

    #[test]
    fn test_zero_residual_on_projection_ray() -> TestResult {
        let factor = factor(None)?;
        let (residual, jacobian) = factor.evaluate_error(&landmark(), true)?;
        assert!(residual.norm() < 1e-9, "residual {residual}");
        assert!(jacobian.is_some());

        // Any point on the ray through the measurement reprojects exactly
        let far = factor.camera().backproject(factor.measured(), 42.0);
        let (residual, _) = factor.evaluate_error(&far, false)?;
        assert!(residual.norm() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_jacobian_matches_finite_differences() -> TestResult {
        let factor = factor(None)?;
        let point = Point3::new(-0.4, 1.5, 0.7);
        let (_, jacobian) = factor.evaluate_error(&point, true)?;
        let jacobian = jacobian.ok_or("missing jacobian")?;

        let h = 1e-6;
        for j in 0..3 {
            let mut plus = point;
            let mut minus = point;
            plus[j] += h;
            minus[j] -= h;
            let (r_plus, _) = factor.evaluate_error(&plus, false)?;
            let (r_minus, _) = factor.evaluate_error(&minus, false)?;
            let numeric = (r_plus - r_minus) / (2.0 * h);
            for i in 0..2 {
                assert!((jacobian[(i, j)] - numeric[i]).abs() < 1e-4);
            }
        }
        Ok(())
    }

    #[test]
    fn test_invalid_noise_model_dimension() -> TestResult {
        let noise = Arc::new(NoiseModel::isotropic(3, 1.0)?);
        let result = TriangulationFactor::new(camera()?, measurement()?, Some(noise), "l1");
        assert!(matches!(
            result,
            Err(FactorError::InvalidNoiseModelDimension {
                expected: 2,
                actual: 3
            })
        ));
        Ok(())
    }

    #[test]
    fn test_behind_camera_default_returns_sentinel() -> TestResult {
        let factor = factor(None)?;
        let (residual, jacobian) = factor.evaluate_error(&behind_camera(), true)?;
        assert_eq!(residual, Vector2::new(2.0 * FX, 2.0 * FX));
        assert_eq!(jacobian, Some(Matrix2x3::zeros()));

        let (_, jacobian) = factor.evaluate_error(&behind_camera(), false)?;
        assert!(jacobian.is_none());
        Ok(())
    }

    /// In-memory log sink for a scoped subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .map_err(|e| io::Error::other(e.to_string()))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> TestResult<String> {
            let bytes = self.0.lock().map_err(|e| e.to_string())?;
            Ok(String::from_utf8(bytes.clone())?)
        }
    }

    /// Run `f` with a subscriber writing into the returned buffer.
    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, CapturedLogs) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, logs)
    }

    #[test]
    fn test_behind_camera_verbose_still_returns_sentinel() -> TestResult {
        let factor =
            factor(None)?.with_config(CheiralityConfig::new().with_verbose_cheirality(true));
        let (result, logs) = capture_logs(|| factor.evaluate_error(&behind_camera(), false));
        let (residual, _) = result?;
        assert_eq!(residual, Vector2::new(2.0 * FX, 2.0 * FX));

        let text = logs.contents()?;
        assert!(text.contains("WARN"), "logged: {text}");
        assert!(text.contains("l1"), "logged: {text}");
        assert!(text.contains("moved behind camera"), "logged: {text}");
        Ok(())
    }

    #[test]
    fn test_behind_camera_quiet_logs_nothing() -> TestResult {
        let factor = factor(None)?;
        let (result, logs) = capture_logs(|| factor.evaluate_error(&behind_camera(), false));
        result?;
        assert!(logs.contents()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_behind_camera_throw() -> TestResult {
        let factor =
            factor(None)?.with_config(CheiralityConfig::new().with_throw_cheirality(true));
        assert!(factor.throw_cheirality());
        match factor.evaluate_error(&behind_camera(), true) {
            Err(FactorError::Cheirality { key, source }) => {
                assert_eq!(key, "l1");
                assert!(matches!(source, GeometryError::Cheirality { .. }));
            }
            other => panic!("expected cheirality error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_linearize_matches_evaluate_error() -> TestResult {
        let factor = factor(None)?;
        let point = Point3::new(0.1, 0.5, 1.4);
        let values = values_with(point)?;
        let (residual, jacobian) = factor.evaluate_error(&point, true)?;
        let jacobian = jacobian.ok_or("missing jacobian")?;

        let mut workspace = LinearizationWorkspace::new();
        let linear = factor
            .linearize(&values, &mut workspace)?
            .ok_or("factor should be active")?;

        assert_eq!(linear.keys(), &["l1".to_string()]);
        let a = linear.block("l1").ok_or("missing block")?;
        for i in 0..2 {
            for j in 0..3 {
                assert!((a[(i, j)] - jacobian[(i, j)]).abs() < 1e-12);
            }
        }
        assert!((linear.rhs()[0] + residual[0]).abs() < 1e-12);
        assert!((linear.rhs()[1] + residual[1]).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_linearize_whitens_with_noise_model() -> TestResult {
        let sigma = 0.5;
        let whitened = factor(Some(Arc::new(NoiseModel::isotropic(2, sigma)?)))?;
        let plain = factor(None)?;
        let values = values_with(Point3::new(0.1, 0.5, 1.4))?;

        let mut ws1 = LinearizationWorkspace::new();
        let mut ws2 = LinearizationWorkspace::new();
        let lw = whitened.linearize(&values, &mut ws1)?.ok_or("inactive")?;
        let lp = plain.linearize(&values, &mut ws2)?.ok_or("inactive")?;

        let aw = lw.block("l1").ok_or("missing block")?;
        let ap = lp.block("l1").ok_or("missing block")?;
        assert!((aw - ap / sigma).amax() < 1e-9);
        assert!((lw.rhs() - lp.rhs() / sigma).amax() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_linearize_reuses_workspace_without_stale_values() -> TestResult {
        let factor = factor(None)?;
        let mut workspace = LinearizationWorkspace::new();
        assert!(!workspace.is_allocated());

        let first = factor
            .linearize(&values_with(Point3::new(0.1, 0.5, 1.4))?, &mut workspace)?
            .ok_or("inactive")?;
        assert!(workspace.is_allocated());

        let second_values = values_with(Point3::new(-0.2, 2.0, 0.9))?;
        let second = factor
            .linearize(&second_values, &mut workspace)?
            .ok_or("inactive")?;
        let fresh = factor
            .linearize(&second_values, &mut LinearizationWorkspace::new())?
            .ok_or("inactive")?;

        assert!(second.equals(&fresh, 0.0));
        assert!(!first.equals(&second, 1e-6));
        Ok(())
    }

    #[test]
    fn test_linearize_behind_camera_fails_even_with_default_flags() -> TestResult {
        // evaluate_error falls back to the constant residual here, linearize does not
        let factor = factor(None)?;
        assert!(!factor.throw_cheirality());
        let values = values_with(behind_camera())?;
        assert!(factor.evaluate_error(&behind_camera(), true).is_ok());

        let result = factor.linearize(&values, &mut LinearizationWorkspace::new());
        assert!(matches!(result, Err(FactorError::Cheirality { .. })));
        Ok(())
    }

    #[test]
    fn test_linearize_missing_key() -> TestResult {
        let factor = factor(None)?;
        let values = Values::new();
        let result = factor.linearize(&values, &mut LinearizationWorkspace::new());
        assert!(matches!(result, Err(FactorError::Core(_))));
        Ok(())
    }

    #[test]
    fn test_inactive_factor_returns_none() -> TestResult {
        let noise = NoiseModel::robust(RobustLoss::tukey(1.0)?, NoiseModel::isotropic(2, 1.0)?)?;
        let factor = factor(Some(Arc::new(noise)))?;

        // Far off the measurement: Tukey weight is zero
        let far = values_with(Point3::new(1.0, 0.5, 1.5))?;
        let mut workspace = LinearizationWorkspace::new();
        assert!(!factor.active(&far));
        assert!(factor.linearize(&far, &mut workspace)?.is_none());
        assert!(!workspace.is_allocated());

        // On the measurement: active
        let near = values_with(landmark())?;
        assert!(factor.active(&near));
        assert!(factor.linearize(&near, &mut workspace)?.is_some());
        Ok(())
    }

    #[test]
    fn test_error_is_half_squared_whitened_norm() -> TestResult {
        let factor = factor(Some(Arc::new(NoiseModel::isotropic(2, 2.0)?)))?;
        let point = Point3::new(0.1, 0.5, 1.4);
        let values = values_with(point)?;
        let (residual, _) = factor.evaluate_error(&point, false)?;
        let expected = 0.5 * (residual / 2.0).norm_squared();
        assert!((factor.error(&values)? - expected).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_clone_is_equal_and_shares_noise_model() -> TestResult {
        let noise = Arc::new(NoiseModel::isotropic(2, 1.0)?);
        let original = factor(Some(noise.clone()))?
            .with_config(CheiralityConfig::new().with_throw_cheirality(true));
        let copy = original.clone();

        assert!(original.equals(&copy, 1e-9));
        assert_eq!(copy.config(), original.config());
        let shared = copy.shared_noise_model().ok_or("missing noise model")?;
        assert!(Arc::ptr_eq(shared, &noise));

        let point = Point3::new(0.1, 0.5, 1.4);
        let (r1, j1) = original.evaluate_error(&point, true)?;
        let (r2, j2) = copy.evaluate_error(&point, true)?;
        assert_eq!(r1, r2);
        assert_eq!(j1, j2);
        Ok(())
    }

    #[test]
    fn test_equals_detects_differences() -> TestResult {
        let base = factor(None)?;
        let other_measurement =
            TriangulationFactor::new(camera()?, measurement()? + Point2::new(1.0, 0.0), None, "l1")?;
        let other_key = TriangulationFactor::new(camera()?, measurement()?, None, "l2")?;
        let other_noise = factor(Some(Arc::new(NoiseModel::unit(2))))?;
        let other_camera = TriangulationFactor::new(
            PinholeCamera::new(Pose3::identity(), Cal3S2::new(FX, 1200.0, 0.0, 640.0, 480.0)),
            measurement()?,
            None,
            "l1",
        )?;

        assert!(!base.equals(&other_measurement, 1e-9));
        assert!(!base.equals(&other_key, 1e-9));
        assert!(!base.equals(&other_noise, 1e-9));
        assert!(!base.equals(&other_camera, 1e-9));
        Ok(())
    }

    #[test]
    fn test_display_contains_camera_and_measurement() -> TestResult {
        let text = factor(None)?.to_string();
        assert!(text.starts_with("TriangulationFactor"));
        assert!(text.contains("camera"));
        assert!(text.contains("z: ["));
        assert!(text.contains("l1"));
        Ok(())
    }

    #[test]
    fn test_decode_rejects_wrong_noise_dimension() -> TestResult {
        let mut json = serde_json::to_value(factor(None)?)?;
        json["noise_model"] = serde_json::to_value(NoiseModel::isotropic(3, 1.0)?)?;
        let err = serde_json::from_value::<TriangulationFactor>(json)
            .err()
            .ok_or("decoding a 3-dimensional noise model should fail")?;
        assert!(err.to_string().contains("2-dimensional"), "error: {err}");
        Ok(())
    }

    #[test]
    fn test_decode_round_trip_keeps_config() -> TestResult {
        let original = factor(Some(Arc::new(NoiseModel::isotropic(2, 0.5)?)))?
            .with_config(CheiralityConfig::new().with_throw_cheirality(true));
        let restored: TriangulationFactor = serde_json::from_str(&serde_json::to_string(&original)?)?;
        assert!(original.equals(&restored, 0.0));
        assert!(restored.throw_cheirality());
        Ok(())
    }

    #[test]
    fn test_distorted_calibration() -> TestResult {
        let f = 900.0;
        let camera = PinholeCamera::look_at(
            &Vector3::new(0.0, -5.0, 1.0),
            &Vector3::new(0.0, 0.0, 1.0),
            &Vector3::z(),
            Cal3Bundler::new(f, -0.1, 0.02, 640.0, 480.0),
        )?;
        let z = camera.project_point(&landmark())?;
        let factor = TriangulationFactor::new(camera, z, None, "l1")?;

        let (residual, _) = factor.evaluate_error(&landmark(), false)?;
        assert!(residual.norm() < 1e-9);

        let point = Point3::new(-0.4, 1.5, 0.7);
        let (_, jacobian) = factor.evaluate_error(&point, true)?;
        let jacobian = jacobian.ok_or("missing jacobian")?;
        let h = 1e-6;
        for j in 0..3 {
            let mut step = Vector3::zeros();
            step[j] = h;
            let (plus, _) = factor.evaluate_error(&(point + step), false)?;
            let (minus, _) = factor.evaluate_error(&(point - step), false)?;
            let numeric = (plus - minus) / (2.0 * h);
            for i in 0..2 {
                assert!((jacobian[(i, j)] - numeric[i]).abs() < 1e-4);
            }
        }

        // Sentinel uses the calibration's focal length
        let (residual, _) = factor.evaluate_error(&behind_camera(), false)?;
        assert_eq!(residual, Vector2::new(2.0 * f, 2.0 * f));

        let restored: TriangulationFactor<Cal3Bundler> =
            serde_json::from_str(&serde_json::to_string(&factor)?)?;
        assert!(factor.equals(&restored, 1e-12));
        Ok(())
    }
}
