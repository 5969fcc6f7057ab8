//! Error types for the apex-triangulation library
//!
//! Each module defines its own error enum (`CoreError`, `GeometryError`,
//! `FactorError`). `TriangulationError` wraps them for callers that want a
//! single error type, preserving the source chain:
//!
//! ```text
//! TriangulationError::Factor(
//!     FactorError::Cheirality {
//!         key: "l7",
//!         source: GeometryError::Cheirality { depth: -0.4 }
//!     }
//! )
//! ```

use crate::{core::CoreError, factors::FactorError, geometry::GeometryError};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the apex-triangulation library
pub type TriangulationResult<T> = Result<T, TriangulationError>;

/// Main error type for the apex-triangulation library
///
/// # Error Chain Access
///
/// ```rust,ignore
/// if let Err(e) = graph.linearize(&values).map_err(TriangulationError::from) {
///     warn!("Full chain: {}", e.chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum TriangulationError {
    /// Values, noise model and linear factor errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Projection and pose construction errors
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Factor construction and evaluation errors
    #[error(transparent)]
    Factor(#[from] FactorError),
}

impl TriangulationError {
    /// Get the full error chain as a multi-line string, one source per line.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// ```rust,ignore
    /// error!("Linearization failed: {}", err.chain_compact());
    /// // Output: "Landmark l7 moved behind camera → Cheirality exception: point at depth -0.4 is behind the camera"
    /// ```
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}
