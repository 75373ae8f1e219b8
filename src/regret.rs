//! Regret of acting on an estimated reward instead of the true one.
//!
//! Regret is measured with a test planner that, by default, acts rationally:
//! `regret = fe(true) · true - fe(proxy) · true`. With a converged rational
//! planner it is never negative; small negative values come from planner
//! approximation error and are only logged.

use ndarray::{Array1, ArrayView1, Axis, concatenate};
use tracing::warn;

use crate::{
    Error, Result,
    config::IrdConfig,
    inference::Inference,
    mdp::Mdp,
    planner::{PlannerSettings, build_planner},
};

/// Regret below this is reported as an anomaly.
const NEGATIVE_REGRET_TOLERANCE: f64 = -1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegretEvaluator {
    settings: PlannerSettings,
}

impl RegretEvaluator {
    /// Planner settings from `config`; `rational_test_planner` forces a hard-max policy.
    pub fn new(config: &IrdConfig) -> Self {
        let beta_planner = if config.rational_test_planner() {
            f64::INFINITY
        } else {
            config.beta_planner()
        };
        Self {
            settings: PlannerSettings {
                gamma: config.gamma(),
                beta_planner,
                value_iters: config.value_iters(),
                convergence_tolerance: config.convergence_tolerance(),
            },
        }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// True-reward return lost by planning for `proxy` on `mdp`.
    pub fn compute_regret(
        &self,
        mdp: &Mdp,
        proxy: ArrayView1<'_, f64>,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<f64> {
        let batch = concatenate(
            Axis(0),
            &[
                true_reward.reborrow().insert_axis(Axis(0)),
                proxy.reborrow().insert_axis(Axis(0)),
            ],
        )?;
        let planner = build_planner(mdp.kind(), self.settings);
        let feature_exps = planner.feature_expectations(mdp, batch.view())?;
        let optimal = feature_exps.row(0).dot(&true_reward);
        let achieved = feature_exps.row(1).dot(&true_reward);
        let regret = optimal - achieved;
        if regret < NEGATIVE_REGRET_TOLERANCE {
            warn!(regret, "negative regret; planner may not have converged");
        }
        Ok(regret)
    }

    /// Mean regret of `proxy` over held-out test environments.
    pub fn test_regret(
        &self,
        mdps: &[Mdp],
        proxy: ArrayView1<'_, f64>,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<f64> {
        if mdps.is_empty() {
            return Err(Error::InvalidMdp {
                message: "test regret needs at least one environment".to_string(),
            });
        }
        let total = mdps
            .iter()
            .map(|mdp| self.compute_regret(mdp, proxy, true_reward))
            .sum::<Result<f64>>()?;
        Ok(total / mdps.len() as f64)
    }

    /// Prior-expected regret of acting on the prior mean reward.
    ///
    /// Every true reward and the prior mean are planned in one batch.
    pub fn expected_regret_from_prior(&self, inference: &Inference) -> Result<f64> {
        let true_rewards = inference.true_space().rewards();
        let prior_avg = inference.prior_avg();
        let batch = concatenate(
            Axis(0),
            &[true_rewards.view(), prior_avg.view().insert_axis(Axis(0))],
        )?;
        let mdp = inference.mdp();
        let planner = build_planner(mdp.kind(), self.settings);
        let feature_exps = planner.feature_expectations(mdp, batch.view())?;
        let avg_fe = feature_exps.row(true_rewards.nrows());

        let mut expected = 0.0;
        for ((reward, fe), &log_p) in true_rewards
            .outer_iter()
            .zip(feature_exps.outer_iter())
            .zip(inference.log_prior())
        {
            let regret = fe.dot(&reward) - avg_fe.dot(&reward);
            expected += log_p.exp() * regret;
        }
        if expected < NEGATIVE_REGRET_TOLERANCE {
            warn!(expected, "negative expected prior regret");
        }
        Ok(expected)
    }
}

/// Distance between the centred, unit-normalized `post_avg` and `true_reward`.
///
/// Insensitive to shifting or positively rescaling either vector. A constant
/// vector centres to zero and is compared as such.
pub fn normalized_reward_diff(post_avg: ArrayView1<'_, f64>, true_reward: ArrayView1<'_, f64>) -> f64 {
    let diff = normalize(post_avg) - normalize(true_reward);
    diff.dot(&diff).sqrt()
}

fn normalize(reward: ArrayView1<'_, f64>) -> Array1<f64> {
    let mean = reward.mean().unwrap_or(0.0);
    let centred = reward.mapv(|w| w - mean);
    let norm = centred.dot(&centred).sqrt();
    if norm > 0.0 { centred / norm } else { centred }
}
