//! Batched planners.
//!
//! A [`Planner`] takes an MDP and a batch of reward vectors (one per row) and
//! returns, for every reward, the discounted feature counts a Boltzmann-rational
//! agent optimizing that reward would collect. The planners are pure functions
//! of their inputs, so the gradient-based search in [`crate::optim`] can
//! differentiate through them numerically.
//!
//! - [`GridworldPlanner`]: value iteration over the lattice, then forward
//!   propagation of the state occupancy under the softmax policy.
//! - [`BanditsPlanner`]: one-step softmax choice among the reachable states.

pub mod bandits;
pub mod gridworld;
pub mod policy;

use std::fmt;

use ndarray::{Array2, ArrayView2};

pub use bandits::BanditsPlanner;
pub use gridworld::GridworldPlanner;
pub use policy::{boltzmann, boltzmann_in_place};

use crate::{Error, Result, config::MdpKind, mdp::Mdp};

/// Knobs shared by every planning strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerSettings {
    pub gamma: f64,
    /// Inverse temperature of the policy; `f64::INFINITY` plans rationally.
    pub beta_planner: f64,
    /// Number of value-iteration sweeps, which is also the occupancy horizon.
    pub value_iters: usize,
    /// Early stop once value and occupancy deltas fall below this.
    pub convergence_tolerance: Option<f64>,
}

/// Shared capability of the grid and bandit planners.
pub trait Planner: fmt::Debug + Send + Sync {
    /// Environment family this planner understands.
    fn kind(&self) -> MdpKind;

    /// Discounted feature expectations, one row per row of `rewards`.
    ///
    /// # Errors
    ///
    /// Fails when `mdp` is of a different kind or the reward width does not
    /// match the MDP's feature dimension.
    fn feature_expectations(&self, mdp: &Mdp, rewards: ArrayView2<'_, f64>)
    -> Result<Array2<f64>>;
}

/// Construct the planner for `kind`.
pub fn build_planner(kind: MdpKind, settings: PlannerSettings) -> Box<dyn Planner> {
    match kind {
        MdpKind::Gridworld => Box::new(GridworldPlanner::new(settings)),
        MdpKind::Bandits => Box::new(BanditsPlanner::new(settings)),
    }
}

pub(crate) fn check_reward_width(mdp: &Mdp, rewards: ArrayView2<'_, f64>) -> Result<()> {
    if rewards.ncols() != mdp.feature_dim() {
        return Err(Error::DimensionMismatch {
            context: "reward batch width".to_string(),
            expected: mdp.feature_dim(),
            got: rewards.ncols(),
        });
    }
    Ok(())
}

pub(crate) fn mismatch(planner: MdpKind, mdp: &Mdp) -> Error {
    Error::PlannerMismatch {
        model: planner.to_string(),
        mdp: mdp.kind().to_string(),
    }
}
