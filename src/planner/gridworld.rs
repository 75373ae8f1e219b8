//! Value iteration and occupancy propagation on a lattice.

use ndarray::{Array2, ArrayView2};

use super::{Planner, PlannerSettings, check_reward_width, mismatch, policy::boltzmann_in_place};
use crate::{
    Result,
    config::MdpKind,
    mdp::{GridMove, GridworldMdp, Mdp},
};

const NUM_MOVES: usize = GridMove::ALL.len();

#[derive(Debug, Clone)]
pub struct GridworldPlanner {
    settings: PlannerSettings,
}

impl GridworldPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// `next[s * NUM_MOVES + a]` is the cell reached from `s` by move `a`.
    fn transition_table(grid: &GridworldMdp) -> Vec<usize> {
        (0..grid.num_states())
            .flat_map(|s| GridMove::ALL.into_iter().map(move |mv| (s, mv)))
            .map(|(s, mv)| grid.next_state(s, mv))
            .collect()
    }

    /// Bellman optimality sweeps; returns `values[batch, state]`.
    fn value_iteration(
        &self,
        grid: &GridworldMdp,
        next: &[usize],
        state_rewards: &Array2<f64>,
    ) -> Array2<f64> {
        let (batch, states) = state_rewards.dim();
        let gamma = self.settings.gamma;
        let mut values = Array2::<f64>::zeros((batch, states));
        let mut updated = Array2::<f64>::zeros((batch, states));

        for sweep in 0..self.settings.value_iters {
            let mut max_delta: f64 = 0.0;
            for b in 0..batch {
                for s in 0..states {
                    if grid.is_wall(s) {
                        continue;
                    }
                    let best = next[s * NUM_MOVES..(s + 1) * NUM_MOVES]
                        .iter()
                        .map(|&n| values[[b, n]])
                        .fold(f64::NEG_INFINITY, f64::max);
                    let value = state_rewards[[b, s]] + gamma * best;
                    max_delta = max_delta.max((value - values[[b, s]]).abs());
                    updated[[b, s]] = value;
                }
            }
            std::mem::swap(&mut values, &mut updated);
            if let Some(tol) = self.settings.convergence_tolerance
                && max_delta < tol
            {
                tracing::debug!(sweep, max_delta, "value iteration converged");
                break;
            }
        }
        values
    }

    /// Softmax policy `policy[[b, s * NUM_MOVES + a]]` over one-step lookahead Q-values.
    fn policy(
        &self,
        grid: &GridworldMdp,
        next: &[usize],
        state_rewards: &Array2<f64>,
        values: &Array2<f64>,
    ) -> Array2<f64> {
        let (batch, states) = state_rewards.dim();
        let mut policy = Array2::<f64>::zeros((batch, states * NUM_MOVES));
        let mut q = [0.0; NUM_MOVES];
        for b in 0..batch {
            for s in 0..states {
                if grid.is_wall(s) {
                    continue;
                }
                for (a, q_value) in q.iter_mut().enumerate() {
                    let n = next[s * NUM_MOVES + a];
                    *q_value = state_rewards[[b, s]] + self.settings.gamma * values[[b, n]];
                }
                boltzmann_in_place(&mut q, self.settings.beta_planner);
                for (a, &p) in q.iter().enumerate() {
                    policy[[b, s * NUM_MOVES + a]] = p;
                }
            }
        }
        policy
    }

    /// `fe = Σ_t γ^t E[φ(s_t)]` from the start cell under `policy`.
    fn occupancy_features(
        &self,
        grid: &GridworldMdp,
        next: &[usize],
        policy: &Array2<f64>,
    ) -> Array2<f64> {
        let batch = policy.nrows();
        let states = grid.num_states();
        let features = grid.features();
        let mut occupancy = Array2::<f64>::zeros((batch, states));
        occupancy.column_mut(grid.start_state()).fill(1.0);
        let mut feature_exps = Array2::<f64>::zeros((batch, features.ncols()));
        let gamma = self.settings.gamma;
        let max_feature = features.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let mut discount = 1.0;

        for step in 0..self.settings.value_iters {
            feature_exps.scaled_add(discount, &occupancy.dot(features));
            // Occupancy rows sum to one, so every later step adds at most
            // `γ^t · max|φ|` per feature.
            if let Some(tol) = self.settings.convergence_tolerance
                && gamma < 1.0
            {
                let tail = discount * gamma * max_feature / (1.0 - gamma);
                if tail < tol {
                    tracing::debug!(step, tail, "occupancy tail below tolerance");
                    break;
                }
            }

            let mut propagated = Array2::<f64>::zeros((batch, states));
            for b in 0..batch {
                for s in 0..states {
                    let mass = occupancy[[b, s]];
                    if mass == 0.0 {
                        continue;
                    }
                    for a in 0..NUM_MOVES {
                        propagated[[b, next[s * NUM_MOVES + a]]] +=
                            mass * policy[[b, s * NUM_MOVES + a]];
                    }
                }
            }
            occupancy = propagated;
            discount *= gamma;
        }
        feature_exps
    }
}

impl Planner for GridworldPlanner {
    fn kind(&self) -> MdpKind {
        MdpKind::Gridworld
    }

    fn feature_expectations(
        &self,
        mdp: &Mdp,
        rewards: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>> {
        let Mdp::Gridworld(grid) = mdp else {
            return Err(mismatch(self.kind(), mdp));
        };
        check_reward_width(mdp, rewards)?;

        let next = Self::transition_table(grid);
        let state_rewards = rewards.dot(&grid.features().t());
        let values = self.value_iteration(grid, &next, &state_rewards);
        let policy = self.policy(grid, &next, &state_rewards, &values);
        Ok(self.occupancy_features(grid, &next, &policy))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    fn corridor() -> Mdp {
        // 1x4 corridor; feature 0 marks the right end, feature 1 the left end.
        let mut features = Array2::zeros((4, 2));
        features[[3, 0]] = 1.0;
        features[[0, 1]] = 1.0;
        GridworldMdp::new(1, 4, vec![false; 4], features, (0, 1))
            .unwrap()
            .into()
    }

    fn settings(beta_planner: f64) -> PlannerSettings {
        PlannerSettings {
            gamma: 0.9,
            beta_planner,
            value_iters: 12,
            convergence_tolerance: None,
        }
    }

    #[test]
    fn rational_agent_walks_to_the_rewarded_end() {
        let planner = GridworldPlanner::new(settings(f64::INFINITY));
        let fe = planner
            .feature_expectations(&corridor(), array![[1.0, 0.0], [0.0, 1.0]].view())
            .unwrap();
        assert!(fe[[0, 0]] > fe[[1, 0]]);
        assert!(fe[[1, 1]] > fe[[0, 1]]);
        assert_eq!(fe[[0, 1]], 0.0, "right-seeking agent never visits the left end");
    }

    #[test]
    fn batch_rows_match_individual_plans() {
        let planner = GridworldPlanner::new(settings(2.0));
        let mdp = corridor();
        let batch = array![[1.0, 0.0], [0.3, -0.7]];
        let together = planner.feature_expectations(&mdp, batch.view()).unwrap();
        for (i, row) in batch.outer_iter().enumerate() {
            let single = planner
                .feature_expectations(&mdp, row.insert_axis(ndarray::Axis(0)))
                .unwrap();
            for j in 0..2 {
                assert!((single[[0, j]] - together[[i, j]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn total_discounted_mass_matches_horizon() {
        // With a constant feature, fe equals Σ_t γ^t over the horizon.
        let features = Array2::from_elem((4, 1), 1.0);
        let mdp: Mdp = GridworldMdp::new(2, 2, vec![false; 4], features, (0, 0))
            .unwrap()
            .into();
        let planner = GridworldPlanner::new(settings(0.5));
        let fe = planner.feature_expectations(&mdp, array![[1.0]].view()).unwrap();
        let expected: f64 = (0..12).map(|t| 0.9_f64.powi(t)).sum();
        assert!((fe[[0, 0]] - expected).abs() < 1e-9);
    }

    fn far_goal_corridor() -> Mdp {
        // Only the last cell carries a feature; the agent starts at the other end.
        let mut features = Array2::zeros((4, 1));
        features[[3, 0]] = 1.0;
        GridworldMdp::new(1, 4, vec![false; 4], features, (0, 0))
            .unwrap()
            .into()
    }

    #[test]
    fn tolerance_does_not_stop_before_reaching_features() {
        let mdp = far_goal_corridor();
        let fixed = GridworldPlanner::new(settings(f64::INFINITY));
        let early = GridworldPlanner::new(PlannerSettings {
            convergence_tolerance: Some(1e-6),
            ..settings(f64::INFINITY)
        });
        let reward = array![[1.0]];
        let without = fixed.feature_expectations(&mdp, reward.view()).unwrap();
        let with = early.feature_expectations(&mdp, reward.view()).unwrap();
        assert!(without[[0, 0]] > 4.0);
        assert!((without[[0, 0]] - with[[0, 0]]).abs() < 1e-6);
    }

    #[test]
    fn early_stop_agrees_with_long_horizon_within_tolerance() {
        let mdp = far_goal_corridor();
        let long = PlannerSettings {
            value_iters: 400,
            ..settings(f64::INFINITY)
        };
        let tol = 1e-6;
        let fixed = GridworldPlanner::new(long);
        let early = GridworldPlanner::new(PlannerSettings {
            convergence_tolerance: Some(tol),
            ..long
        });
        let reward = array![[1.0]];
        let without = fixed.feature_expectations(&mdp, reward.view()).unwrap();
        let with = early.feature_expectations(&mdp, reward.view()).unwrap();
        // Three steps to the goal, then the agent stays: Σ_{t≥3} γ^t.
        let limit = 0.9_f64.powi(3) / (1.0 - 0.9);
        assert!((without[[0, 0]] - limit).abs() < 1e-9);
        assert!((without[[0, 0]] - with[[0, 0]]).abs() < tol);
    }

    #[test]
    fn bandit_mdp_is_rejected() {
        let planner = GridworldPlanner::new(settings(1.0));
        let mdp: Mdp = crate::mdp::BanditsMdp::new(array![[1.0]], 0).unwrap().into();
        assert!(planner.feature_expectations(&mdp, array![[1.0]].view()).is_err());
    }
}
