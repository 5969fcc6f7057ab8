//! Collection of nonlinear factors with per-factor linearization workspaces.

use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::values::Values;
use crate::factors::{FactorResult, GraphFactor, NonlinearFactor};
use crate::linear::{JacobianFactor, LinearizationWorkspace};

/// Nonlinear factor graph.
///
/// Each factor is paired with its own [`LinearizationWorkspace`], so repeated
/// linearizations reuse buffers and factors can be linearized in parallel
/// (with the `parallel` feature) without sharing scratch memory.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    factors: Vec<GraphFactor>,
    workspaces: Vec<LinearizationWorkspace>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factor and return its index.
    pub fn add(&mut self, factor: impl Into<GraphFactor>) -> usize {
        self.factors.push(factor.into());
        self.workspaces.push(LinearizationWorkspace::new());
        self.factors.len() - 1
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GraphFactor> {
        self.factors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphFactor> {
        self.factors.iter()
    }

    /// Total cost `Σᵢ errorᵢ(values)`.
    pub fn error(&self, values: &Values) -> FactorResult<f64> {
        self.factors
            .iter()
            .map(|factor| factor.error(values))
            .sum()
    }

    /// Linearize every active factor at `values`.
    ///
    /// Inactive factors are skipped, so the result may be shorter than the graph.
    /// The first failing factor aborts the whole linearization.
    pub fn linearize(&mut self, values: &Values) -> FactorResult<Vec<JacobianFactor>> {
        #[cfg(feature = "parallel")]
        let linearized: FactorResult<Vec<Option<JacobianFactor>>> = self
            .factors
            .par_iter()
            .zip(self.workspaces.par_iter_mut())
            .map(|(factor, workspace)| factor.linearize(values, workspace))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let linearized: FactorResult<Vec<Option<JacobianFactor>>> = self
            .factors
            .iter()
            .zip(self.workspaces.iter_mut())
            .map(|(factor, workspace)| factor.linearize(values, workspace))
            .collect();

        let linear: Vec<JacobianFactor> = linearized?.into_iter().flatten().collect();
        debug!(
            "Linearized {} of {} factors",
            linear.len(),
            self.factors.len()
        );
        Ok(linear)
    }
}

impl FromIterator<GraphFactor> for FactorGraph {
    fn from_iter<I: IntoIterator<Item = GraphFactor>>(iter: I) -> Self {
        let mut graph = FactorGraph::new();
        for factor in iter {
            graph.add(factor);
        }
        graph
    }
}
