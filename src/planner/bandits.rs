//! One-step Boltzmann choice among the states reachable from the start.

use ndarray::{Array2, ArrayView2, Axis};

use super::{Planner, PlannerSettings, check_reward_width, mismatch, policy::boltzmann_in_place};
use crate::{Result, config::MdpKind, mdp::Mdp};

#[derive(Debug, Clone)]
pub struct BanditsPlanner {
    settings: PlannerSettings,
}

impl BanditsPlanner {
    /// Only `beta_planner` matters here; discounting has no effect on a single step.
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }
}

impl Planner for BanditsPlanner {
    fn kind(&self) -> MdpKind {
        MdpKind::Bandits
    }

    fn feature_expectations(
        &self,
        mdp: &Mdp,
        rewards: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>> {
        let Mdp::Bandits(bandits) = mdp else {
            return Err(mismatch(self.kind(), mdp));
        };
        check_reward_width(mdp, rewards)?;

        let reachable = bandits.state_features().select(Axis(0), bandits.reachable());
        let mut policy = rewards.dot(&reachable.t());
        for mut row in policy.outer_iter_mut() {
            if let Some(values) = row.as_slice_mut() {
                boltzmann_in_place(values, self.settings.beta_planner);
            } else {
                let mut values = row.to_vec();
                boltzmann_in_place(&mut values, self.settings.beta_planner);
                row.iter_mut().zip(values).for_each(|(v, p)| *v = p);
            }
        }
        Ok(policy.dot(&reachable))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::mdp::BanditsMdp;

    fn settings(beta_planner: f64) -> PlannerSettings {
        PlannerSettings {
            gamma: 1.0,
            beta_planner,
            value_iters: 1,
            convergence_tolerance: None,
        }
    }

    fn three_arms() -> Mdp {
        BanditsMdp::new(array![[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]], 0)
            .unwrap()
            .into()
    }

    #[test]
    fn rational_choice_picks_the_best_arm() {
        let planner = BanditsPlanner::new(settings(f64::INFINITY));
        let fe = planner
            .feature_expectations(&three_arms(), array![[2.0, -1.0]].view())
            .unwrap();
        assert_eq!(fe, array![[1.0, 0.0]]);
    }

    #[test]
    fn soft_choice_mixes_arms() {
        let planner = BanditsPlanner::new(settings(1.0));
        let fe = planner
            .feature_expectations(&three_arms(), array![[0.0, 0.0]].view())
            .unwrap();
        assert!((fe[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((fe[[0, 1]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unreachable_states_are_never_chosen() {
        let mdp: Mdp = BanditsMdp::with_reachable(array![[1.0, 0.0], [0.0, 1.0]], 0, vec![1])
            .unwrap()
            .into();
        let planner = BanditsPlanner::new(settings(3.0));
        let fe = planner
            .feature_expectations(&mdp, array![[10.0, 0.0]].view())
            .unwrap();
        assert_eq!(fe, array![[0.0, 1.0]]);
    }

    #[test]
    fn width_mismatch_is_reported() {
        let planner = BanditsPlanner::new(settings(1.0));
        let err = planner
            .feature_expectations(&three_arms(), array![[1.0, 0.0, 0.0]].view())
            .unwrap_err();
        assert!(matches!(err, crate::Error::DimensionMismatch { .. }));
    }
}
