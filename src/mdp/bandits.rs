//! Enumerated-state environment: from the start state the agent picks one of
//! the reachable states and collects its features.

use ndarray::{Array2, ArrayView1};

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct BanditsMdp {
    state_features: Array2<f64>,
    start_state: usize,
    reachable: Vec<usize>,
}

impl BanditsMdp {
    /// Every state is reachable from `start_state`.
    pub fn new(state_features: Array2<f64>, start_state: usize) -> Result<Self> {
        let reachable = (0..state_features.nrows()).collect();
        Self::with_reachable(state_features, start_state, reachable)
    }

    /// Only the states listed in `reachable` can be chosen from the start state.
    pub fn with_reachable(
        state_features: Array2<f64>,
        start_state: usize,
        reachable: Vec<usize>,
    ) -> Result<Self> {
        let num_states = state_features.nrows();
        if num_states == 0 {
            return Err(Error::InvalidMdp {
                message: "bandit MDP needs at least one state".to_string(),
            });
        }
        if start_state >= num_states {
            return Err(Error::InvalidMdp {
                message: format!("start state {start_state} out of range ({num_states} states)"),
            });
        }
        if reachable.is_empty() {
            return Err(Error::InvalidMdp {
                message: "bandit MDP needs at least one reachable state".to_string(),
            });
        }
        if let Some(&bad) = reachable.iter().find(|&&s| s >= num_states) {
            return Err(Error::InvalidMdp {
                message: format!("reachable state {bad} out of range ({num_states} states)"),
            });
        }
        Ok(Self {
            state_features,
            start_state,
            reachable,
        })
    }

    pub fn state_features(&self) -> &Array2<f64> {
        &self.state_features
    }

    pub fn feature(&self, state: usize) -> ArrayView1<'_, f64> {
        self.state_features.row(state)
    }

    pub fn start_state(&self) -> usize {
        self.start_state
    }

    /// Transition table out of the start state: action `i` leads to `reachable()[i]`.
    pub fn reachable(&self) -> &[usize] {
        &self.reachable
    }

    pub fn num_states(&self) -> usize {
        self.state_features.nrows()
    }
}
