//! Dense linear factor over a set of keys.

use std::fmt::{self, Display, Formatter};

use nalgebra::{DMatrix, DVector};

use super::VectorValues;
use crate::core::{CoreError, CoreResult, Equals, Key};

/// Linear factor `Σⱼ Aⱼ δⱼ = b` with one coefficient block per key.
///
/// # Example
///
/// ```
/// use apex_triangulation::linear::JacobianFactor;
/// use nalgebra::{DMatrix, DVector};
/// # use apex_triangulation::core::CoreResult;
/// # fn example() -> CoreResult<()> {
///
/// let factor = JacobianFactor::new(
///     vec![("l1".to_string(), DMatrix::identity(2, 3))],
///     DVector::from_vec(vec![1.0, -1.0]),
/// )?;
/// assert_eq!(factor.rows(), 2);
/// assert_eq!(factor.cols(), 3);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianFactor {
    keys: Vec<Key>,
    blocks: Vec<DMatrix<f64>>,
    rhs: DVector<f64>,
}

impl JacobianFactor {
    /// Assemble a linear factor from `(key, block)` terms and a right-hand side.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DimensionMismatch`] if a block's row count differs from `b`
    /// - [`CoreError::DuplicateKey`] if a key appears twice
    pub fn new(terms: Vec<(Key, DMatrix<f64>)>, rhs: DVector<f64>) -> CoreResult<Self> {
        let mut keys = Vec::with_capacity(terms.len());
        let mut blocks = Vec::with_capacity(terms.len());
        for (key, block) in terms {
            if block.nrows() != rhs.len() {
                return Err(CoreError::DimensionMismatch(format!(
                    "block for '{}' has {} rows, right-hand side has {}",
                    key,
                    block.nrows(),
                    rhs.len()
                ))
                .log());
            }
            if keys.contains(&key) {
                return Err(CoreError::DuplicateKey(key).log());
            }
            keys.push(key);
            blocks.push(block);
        }
        Ok(JacobianFactor { keys, blocks, rhs })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Coefficient block for `key`, if the factor involves it.
    pub fn block(&self, key: &str) -> Option<&DMatrix<f64>> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| &self.blocks[i])
    }

    pub fn blocks(&self) -> &[DMatrix<f64>] {
        &self.blocks
    }

    /// Right-hand side `b`.
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    /// Total number of columns over all blocks.
    pub fn cols(&self) -> usize {
        self.blocks.iter().map(|block| block.ncols()).sum()
    }

    /// The augmented matrix `[A₁ … Aₙ | b]`.
    pub fn augmented_matrix(&self) -> DMatrix<f64> {
        let mut ab = DMatrix::zeros(self.rows(), self.cols() + 1);
        let mut col = 0;
        for block in &self.blocks {
            ab.view_mut((0, col), block.shape()).copy_from(block);
            col += block.ncols();
        }
        ab.set_column(col, &self.rhs);
        ab
    }

    /// Residual `Σⱼ Aⱼ δⱼ - b` of the linear system at `delta`.
    pub fn error_vector(&self, delta: &VectorValues) -> CoreResult<DVector<f64>> {
        let mut e = -self.rhs.clone();
        for (key, block) in self.keys.iter().zip(&self.blocks) {
            let x = delta.at(key)?;
            if x.len() != block.ncols() {
                return Err(CoreError::DimensionMismatch(format!(
                    "update for '{}' has length {}, block has {} columns",
                    key,
                    x.len(),
                    block.ncols()
                ))
                .log());
            }
            e += block * x;
        }
        Ok(e)
    }

    /// `0.5 · ||Σⱼ Aⱼ δⱼ - b||²`
    pub fn error(&self, delta: &VectorValues) -> CoreResult<f64> {
        Ok(0.5 * self.error_vector(delta)?.norm_squared())
    }
}

impl Equals for JacobianFactor {
    fn equals(&self, other: &Self, tol: f64) -> bool {
        self.keys == other.keys
            && self.rhs.len() == other.rhs.len()
            && (&self.rhs - &other.rhs).amax() <= tol
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.shape() == b.shape() && (a - b).amax() <= tol)
    }
}

impl Display for JacobianFactor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "JacobianFactor on {:?}", self.keys)?;
        for (key, block) in self.keys.iter().zip(&self.blocks) {
            write!(f, "A[{key}] = {block}")?;
        }
        write!(f, "b = {}", self.rhs)
    }
}
