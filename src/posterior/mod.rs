//! Bayesian posterior engine over true-reward hypotheses.
//!
//! A query is a list of alternatives, each summarized by the feature
//! expectations a planner collects when optimizing it. A β-rational human with
//! true reward `w` picks alternative `i` with probability
//! `softmax_i(β · fe_i · w)`. Everything is kept in log space until entropies
//! and means are taken.

pub mod sampling;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

pub use sampling::{TrueRewardSample, subsample_true_rewards, uniform_true_rewards};

use crate::{
    Error, Result,
    config::Objective,
    utils::{argmax, entropy_from_log_probs, log_sum_exp},
};

/// Borrowed hypothesis set: one true reward per row with an aligned log-prior.
#[derive(Debug, Clone, Copy)]
pub struct Hypotheses<'a> {
    rewards: ArrayView2<'a, f64>,
    log_prior: ArrayView1<'a, f64>,
}

impl<'a> Hypotheses<'a> {
    pub fn new<'r: 'a, 'p: 'a>(rewards: ArrayView2<'r, f64>, log_prior: ArrayView1<'p, f64>) -> Self {
        Self {
            rewards: rewards.reborrow(),
            log_prior: log_prior.reborrow(),
        }
    }

    /// The same hypotheses borrowed for a shorter lifetime.
    pub fn reborrow<'b>(self) -> Hypotheses<'b>
    where
        'a: 'b,
    {
        Hypotheses {
            rewards: self.rewards.reborrow(),
            log_prior: self.log_prior.reborrow(),
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.nrows() == 0
    }

    pub fn rewards(&self) -> ArrayView2<'a, f64> {
        self.rewards
    }

    pub fn log_prior(&self) -> ArrayView1<'a, f64> {
        self.log_prior
    }

    fn check(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::EmptyRewardSpace {
                space: "true".to_string(),
            });
        }
        if self.log_prior.len() != self.len() {
            return Err(Error::DimensionMismatch {
                context: "hypothesis log-prior".to_string(),
                expected: self.len(),
                got: self.log_prior.len(),
            });
        }
        Ok(())
    }
}

/// Scores queries against a hypothesis set for a human of rationality `beta`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosteriorEngine {
    beta: f64,
}

impl PosteriorEngine {
    pub fn new(beta: f64) -> Self {
        Self { beta }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// `log P(answer = i | w)` for every hypothesis row and alternative column.
    pub fn answer_log_likelihoods(
        &self,
        feature_exps: ArrayView2<'_, f64>,
        true_rewards: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>> {
        if feature_exps.ncols() != true_rewards.ncols() {
            return Err(Error::DimensionMismatch {
                context: "query feature expectations".to_string(),
                expected: true_rewards.ncols(),
                got: feature_exps.ncols(),
            });
        }
        let mut log_lik = true_rewards.dot(&feature_exps.t());
        log_lik.mapv_inplace(|v| self.beta * v);
        for mut row in log_lik.axis_iter_mut(Axis(0)) {
            let normalizer = log_sum_exp(row.iter());
            row.mapv_inplace(|v| v - normalizer);
        }
        Ok(log_lik)
    }

    /// Posterior over `hypotheses` for every possible answer to the query.
    pub fn analyze<'h>(
        &self,
        feature_exps: ArrayView2<'_, f64>,
        hypotheses: Hypotheses<'h>,
    ) -> Result<QueryAnalysis<'h>> {
        hypotheses.check()?;
        let mut log_posteriors = self.answer_log_likelihoods(feature_exps, hypotheses.rewards)?;
        for mut column in log_posteriors.axis_iter_mut(Axis(1)) {
            column += &hypotheses.log_prior;
        }
        let log_answer_probs = Array1::from_iter(
            log_posteriors
                .axis_iter(Axis(1))
                .map(|column| log_sum_exp(column.iter())),
        );
        for (mut column, &log_p) in log_posteriors
            .axis_iter_mut(Axis(1))
            .zip(log_answer_probs.iter())
        {
            column.mapv_inplace(|v| v - log_p);
        }
        Ok(QueryAnalysis {
            hypotheses,
            log_posteriors,
            log_answer_probs,
        })
    }

    /// Shorthand for scoring a query under one objective.
    pub fn objective(
        &self,
        objective: Objective,
        feature_exps: ArrayView2<'_, f64>,
        hypotheses: Hypotheses<'_>,
    ) -> Result<f64> {
        Ok(self.analyze(feature_exps, hypotheses)?.objective(objective))
    }
}

/// The alternative a human with `true_reward` prefers: the one with the
/// highest expected return, first maximum on ties. `None` for an empty query.
pub fn honest_answer(
    feature_exps: ArrayView2<'_, f64>,
    true_reward: ArrayView1<'_, f64>,
) -> Option<usize> {
    argmax(feature_exps.dot(&true_reward).view())
}

/// Posterior-weighted average reward.
pub fn posterior_mean(rewards: ArrayView2<'_, f64>, log_probs: ArrayView1<'_, f64>) -> Array1<f64> {
    log_probs.mapv(f64::exp).dot(&rewards)
}

/// Sum over feature dimensions of the posterior variance of each weight.
pub fn posterior_variance(rewards: ArrayView2<'_, f64>, log_probs: ArrayView1<'_, f64>) -> f64 {
    let probs = log_probs.mapv(f64::exp);
    let mean = probs.dot(&rewards);
    let second_moment = probs.dot(&rewards.mapv(|w| w * w));
    (second_moment - mean.mapv(|m| m * m))
        .iter()
        .map(|v| v.max(0.0))
        .sum()
}

/// Per-answer posteriors for one query over one hypothesis set.
#[derive(Debug, Clone)]
pub struct QueryAnalysis<'h> {
    hypotheses: Hypotheses<'h>,
    /// `[hypothesis, answer]`, each column normalized.
    log_posteriors: Array2<f64>,
    log_answer_probs: Array1<f64>,
}

impl<'h> QueryAnalysis<'h> {
    pub fn num_answers(&self) -> usize {
        self.log_answer_probs.len()
    }

    pub fn hypotheses(&self) -> Hypotheses<'h> {
        self.hypotheses
    }

    /// `log P(answer = i)` under the prior predictive.
    pub fn log_answer_probs(&self) -> &Array1<f64> {
        &self.log_answer_probs
    }

    pub fn answer_probabilities(&self) -> Array1<f64> {
        self.log_answer_probs.mapv(f64::exp)
    }

    /// Log-posterior after observing `answer`; for an empty query the prior.
    pub fn log_posterior(&self, answer: Option<usize>) -> Result<Array1<f64>> {
        match answer {
            None if self.num_answers() == 0 => Ok(self.hypotheses.log_prior.to_owned()),
            Some(idx) if idx < self.num_answers() => Ok(self.log_posteriors.column(idx).to_owned()),
            _ => Err(Error::InvalidQuery {
                message: format!(
                    "answer {answer:?} is not one of the {} alternatives",
                    self.num_answers()
                ),
            }),
        }
    }

    /// Expected posterior entropy `H(W | A)`.
    ///
    /// An empty query teaches nothing; its entropy is that of a uniform
    /// distribution over the hypothesis set.
    pub fn conditional_entropy(&self) -> f64 {
        if self.num_answers() == 0 {
            return (self.hypotheses.len() as f64).ln();
        }
        self.weighted_over_answers(entropy_from_log_probs)
    }

    /// Entropy of the predictive answer distribution `H(A)`.
    pub fn answer_entropy(&self) -> f64 {
        entropy_from_log_probs(self.log_answer_probs.view())
    }

    /// Expected posterior variance, summed over feature dimensions.
    pub fn expected_variance(&self) -> f64 {
        let rewards = self.hypotheses.rewards;
        if self.num_answers() == 0 {
            return posterior_variance(rewards, self.hypotheses.log_prior);
        }
        self.weighted_over_answers(|column| posterior_variance(rewards, column))
    }

    /// Value of `objective`; lower is better for every objective.
    pub fn objective(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Entropy => self.conditional_entropy(),
            Objective::QueryNegEntropy => -self.answer_entropy(),
            Objective::Variance => self.expected_variance(),
        }
    }

    fn weighted_over_answers(&self, per_answer: impl Fn(ArrayView1<'_, f64>) -> f64) -> f64 {
        self.log_posteriors
            .axis_iter(Axis(1))
            .zip(self.log_answer_probs.iter())
            .filter(|(_, log_p)| log_p.is_finite())
            .map(|(column, log_p)| log_p.exp() * per_answer(column))
            .sum()
    }
}
