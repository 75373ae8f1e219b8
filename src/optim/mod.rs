//! Pluggable optimizers over the free reward weights of a query.
//!
//! The planner stays a pure forward computation. An optimizer only sees a
//! [`BatchObjective`], which maps a batch of candidate parameter matrices to
//! one scalar each in a single call, so a whole finite-difference stencil or a
//! random-search population is planned together.

pub mod gradient;
pub mod sampler;
pub mod search;

use std::fmt;

use ndarray::Array2;

pub use gradient::GradientDescent;
pub use sampler::WeightSampler;
pub use search::RandomSearch;

use crate::Result;

/// Scalar objective to minimize, evaluated for many parameter matrices at once.
pub trait BatchObjective {
    fn value_batch(&self, params: &[Array2<f64>]) -> Result<Vec<f64>>;

    fn value(&self, params: &Array2<f64>) -> Result<f64> {
        let values = self.value_batch(std::slice::from_ref(params))?;
        Ok(values.first().copied().unwrap_or(f64::INFINITY))
    }
}

/// Result of an optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimized {
    pub params: Array2<f64>,
    pub value: f64,
    /// Objective value after every step, starting with the initial point.
    pub history: Vec<f64>,
}

pub trait Optimizer: fmt::Debug {
    fn minimize(&self, objective: &dyn BatchObjective, init: Array2<f64>) -> Result<Optimized>;
}
