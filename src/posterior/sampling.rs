//! Importance subsampling of large true-reward spaces.

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, distr::Distribution, distr::weighted::WeightedIndex};

use super::Hypotheses;
use crate::{
    Error, Result,
    rewards::TrueRewardSpace,
    utils::{normalize_weights, random_combination},
};

/// An owned set of hypotheses drawn from a [`TrueRewardSpace`].
#[derive(Debug, Clone)]
pub struct TrueRewardSample {
    indices: Vec<usize>,
    rewards: Array2<f64>,
    log_prior: Array1<f64>,
}

impl TrueRewardSample {
    /// Rows of the source space that made it into the sample; may repeat
    /// when duplicate re-weighting is off.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn rewards(&self) -> &Array2<f64> {
        &self.rewards
    }

    pub fn log_prior(&self) -> &Array1<f64> {
        &self.log_prior
    }

    pub fn hypotheses(&self) -> Hypotheses<'_> {
        Hypotheses::new(self.rewards.view(), self.log_prior.view())
    }
}

/// Draw `num_subsamples` hypotheses from `space` in proportion to its prior.
///
/// With `weighting` on, repeated draws are collapsed and each surviving row is
/// weighted by `prior * count`, renormalized. Otherwise every draw is kept and
/// the sample carries a uniform log-prior, since the prior is already encoded
/// in how often each row was drawn.
pub fn subsample_true_rewards<R: Rng + ?Sized>(
    rng: &mut R,
    space: &TrueRewardSpace,
    num_subsamples: usize,
    weighting: bool,
) -> Result<TrueRewardSample> {
    if num_subsamples == 0 {
        return Err(Error::InvalidConfiguration {
            message: "num_subsamples must be at least 1".to_string(),
        });
    }
    let probs = space.log_prior().mapv(f64::exp);
    let sampler = WeightedIndex::<f64>::new(probs.iter().copied())?;
    let draws: Vec<usize> = sampler.sample_iter(&mut *rng).take(num_subsamples).collect();

    if weighting {
        let mut counts = vec![0usize; space.len()];
        for &idx in &draws {
            counts[idx] += 1;
        }
        let indices: Vec<usize> = (0..space.len()).filter(|&i| counts[i] > 0).collect();
        let weights = indices.iter().map(|&i| probs[i] * counts[i] as f64);
        let normalized = normalize_weights(weights).ok_or_else(|| Error::Sampling {
            message: "subsampled prior mass is zero".to_string(),
        })?;
        let log_prior = Array1::from_iter(normalized.into_iter().map(f64::ln));
        let rewards = space.rewards().select(Axis(0), &indices);
        return Ok(TrueRewardSample {
            indices,
            rewards,
            log_prior,
        });
    }

    let rewards = space.rewards().select(Axis(0), &draws);
    let log_prior = Array1::from_elem(draws.len(), -(draws.len() as f64).ln());
    Ok(TrueRewardSample {
        indices: draws,
        rewards,
        log_prior,
    })
}

/// Uniformly chosen distinct rows of `space`, at most `count` of them.
pub fn uniform_true_rewards<R: Rng + ?Sized>(
    rng: &mut R,
    space: &TrueRewardSpace,
    count: usize,
) -> TrueRewardSample {
    let indices = random_combination(rng, space.len(), count);
    let rewards = space.rewards().select(Axis(0), &indices);
    let log_prior = Array1::from_elem(indices.len(), -(indices.len().max(1) as f64).ln());
    TrueRewardSample {
        indices,
        rewards,
        log_prior,
    }
}

/// Borrow the whole space as a hypothesis set.
impl<'a> From<&'a TrueRewardSpace> for Hypotheses<'a> {
    fn from(space: &'a TrueRewardSpace) -> Self {
        Hypotheses::new(space.rewards().view(), space.log_prior().view())
    }
}
