//! Declarative environment descriptions consumed by the planners.
//!
//! An [`Mdp`] is produced by an external environment generator and carries
//! everything a planner needs: the state space, a feature for every state and
//! the transition structure. Its [`MdpKind`] tag selects the planning strategy.

pub mod bandits;
pub mod gridworld;

use ndarray::{Array2, ArrayView1};

pub use bandits::BanditsMdp;
pub use gridworld::{GridMove, GridworldMdp};

use crate::config::MdpKind;

/// Environment description with a fixed-length feature per state.
#[derive(Debug, Clone)]
pub enum Mdp {
    Gridworld(GridworldMdp),
    Bandits(BanditsMdp),
}

impl Mdp {
    pub fn kind(&self) -> MdpKind {
        match self {
            Mdp::Gridworld(_) => MdpKind::Gridworld,
            Mdp::Bandits(_) => MdpKind::Bandits,
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.state_features().ncols()
    }

    pub fn num_states(&self) -> usize {
        self.state_features().nrows()
    }

    /// `(height, width)` for lattice environments.
    pub fn grid_dims(&self) -> Option<(usize, usize)> {
        match self {
            Mdp::Gridworld(grid) => Some((grid.height(), grid.width())),
            Mdp::Bandits(_) => None,
        }
    }

    /// One feature row per state.
    pub fn state_features(&self) -> &Array2<f64> {
        match self {
            Mdp::Gridworld(grid) => grid.features(),
            Mdp::Bandits(bandits) => bandits.state_features(),
        }
    }

    /// Feature vector of a single state.
    pub fn feature(&self, state: usize) -> ArrayView1<'_, f64> {
        self.state_features().row(state)
    }
}

impl From<GridworldMdp> for Mdp {
    fn from(grid: GridworldMdp) -> Self {
        Mdp::Gridworld(grid)
    }
}

impl From<BanditsMdp> for Mdp {
    fn from(bandits: BanditsMdp) -> Self {
        Mdp::Bandits(bandits)
    }
}
