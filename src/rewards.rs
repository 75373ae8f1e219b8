//! Reward vectors and the two reward spaces inference runs over.

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::{
    Error, Result,
    utils::{normalize_log_probs, total_probability},
};

/// Linear reward weights over feature dimensions.
pub type RewardVector = Array1<f64>;

/// Tolerance on `Σ exp(log_prior) == 1`.
pub const PRIOR_TOLERANCE: f64 = 1e-6;

/// Bit-exact key for a reward vector; `-0.0` and `0.0` are folded together.
pub(crate) fn reward_key(reward: ArrayView1<'_, f64>) -> Vec<u64> {
    reward
        .iter()
        .map(|&w| (if w == 0.0 { 0.0_f64 } else { w }).to_bits())
        .collect()
}

/// Ordered set of distinct candidate rewards a human may be asked to compare.
///
/// Each vector's row index is stable for the lifetime of the space and is used
/// to look up its cached feature expectations.
#[derive(Debug, Clone)]
pub struct ProxyRewardSpace {
    rewards: Array2<f64>,
    index: HashMap<Vec<u64>, usize>,
}

impl ProxyRewardSpace {
    /// Build from one reward per row. Duplicated rows are rejected.
    pub fn new(rewards: Array2<f64>) -> Result<Self> {
        if rewards.nrows() == 0 {
            return Err(Error::EmptyRewardSpace {
                space: "proxy".to_string(),
            });
        }
        let mut index = HashMap::with_capacity(rewards.nrows());
        for (row_idx, row) in rewards.axis_iter(Axis(0)).enumerate() {
            if index.insert(reward_key(row), row_idx).is_some() {
                return Err(Error::DuplicateProxy {
                    reward: row.to_vec(),
                });
            }
        }
        Ok(Self { rewards, index })
    }

    pub fn len(&self) -> usize {
        self.rewards.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.nrows() == 0
    }

    pub fn feature_dim(&self) -> usize {
        self.rewards.ncols()
    }

    pub fn rewards(&self) -> &Array2<f64> {
        &self.rewards
    }

    pub fn get(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.rewards.row(idx)
    }

    /// Stable index of `reward`, if it belongs to the space.
    pub fn index_of(&self, reward: ArrayView1<'_, f64>) -> Option<usize> {
        self.index.get(&reward_key(reward)).copied()
    }

    /// Rows of the space selected by `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Array2<f64> {
        self.rewards.select(Axis(0), indices)
    }
}

/// Hypothesis space of "true" rewards with an aligned log-prior.
#[derive(Debug, Clone)]
pub struct TrueRewardSpace {
    rewards: Array2<f64>,
    log_prior: Array1<f64>,
}

impl TrueRewardSpace {
    /// Build from rewards (one per row) and a normalized log-prior.
    pub fn new(rewards: Array2<f64>, log_prior: Array1<f64>) -> Result<Self> {
        if rewards.nrows() == 0 {
            return Err(Error::EmptyRewardSpace {
                space: "true".to_string(),
            });
        }
        if log_prior.len() != rewards.nrows() {
            return Err(Error::DimensionMismatch {
                context: "true reward log-prior".to_string(),
                expected: rewards.nrows(),
                got: log_prior.len(),
            });
        }
        check_normalized(log_prior.view())?;
        Ok(Self { rewards, log_prior })
    }

    /// Build with a uniform prior over the rows.
    pub fn uniform(rewards: Array2<f64>) -> Result<Self> {
        let n = rewards.nrows();
        let log_prior = Array1::from_elem(n, -(n.max(1) as f64).ln());
        Self::new(rewards, log_prior)
    }

    pub fn len(&self) -> usize {
        self.rewards.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.nrows() == 0
    }

    pub fn feature_dim(&self) -> usize {
        self.rewards.ncols()
    }

    pub fn rewards(&self) -> &Array2<f64> {
        &self.rewards
    }

    pub fn log_prior(&self) -> &Array1<f64> {
        &self.log_prior
    }

    /// Replace the log-prior, renormalizing away floating drift first.
    pub fn set_log_prior(&mut self, log_prior: Array1<f64>) -> Result<()> {
        if log_prior.len() != self.len() {
            return Err(Error::DimensionMismatch {
                context: "updated log-prior".to_string(),
                expected: self.len(),
                got: log_prior.len(),
            });
        }
        let normalized = normalize_log_probs(&log_prior);
        check_normalized(normalized.view())?;
        self.log_prior = normalized;
        Ok(())
    }

    /// Prior-weighted mean reward.
    pub fn mean_reward(&self) -> RewardVector {
        let probs = self.log_prior.mapv(f64::exp);
        probs.dot(&self.rewards)
    }
}

/// Fail unless `Σ exp(log_probs)` is within [`PRIOR_TOLERANCE`] of one.
pub fn check_normalized(log_probs: ArrayView1<'_, f64>) -> Result<()> {
    let sum = total_probability(log_probs);
    if (sum - 1.0).abs() > PRIOR_TOLERANCE || !sum.is_finite() {
        return Err(Error::UnnormalizedPrior { sum });
    }
    Ok(())
}
