//! Query selection strategies.
//!
//! [`QueryChooser::find_query`] picks what to ask the human: either a handful
//! of proxy rewards to choose between ([`Query::Discrete`]) or a set of
//! feature indices whose weights the human reveals ([`Query::Feature`]). The
//! chosen query is then answered by a simulated human holding the true reward,
//! and the resulting posterior is returned in a [`QueryOutcome`].

mod chooser;
mod discrete;
mod feature;

use std::{fmt, str::FromStr, time::Duration};

use ndarray::{Array1, Array2};

pub use chooser::QueryChooser;
pub use discrete::growth_steps;

use crate::{Error, Result};

/// Name of a query selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chooser {
    /// Proxies drawn uniformly with replacement; no search.
    Random,
    /// The whole proxy space, or a sample of the true space.
    Full,
    /// Best combination of `query_size` proxies, enumerated or capped-sampled.
    Exhaustive,
    /// Grow the query one proxy at a time.
    GreedyDiscrete,
    /// Grow the query one optimized reward vector at a time.
    IncrementalOptimize,
    /// Optimize all reward vectors of the query jointly.
    JointOptimize,
    /// Greedy feature selection; free weights refined by gradient steps.
    FeatureEntropy,
    /// Greedy feature selection; free weights chosen by random search.
    FeatureEntropySearch,
    /// Random search, then gradient refinement.
    FeatureEntropySearchThenOptim,
    /// Like [`Chooser::FeatureEntropy`], with free weights re-drawn per candidate.
    FeatureEntropyRandomInitNone,
    /// Random distinct features with sampled weights; no search.
    FeatureRandom,
    /// Greedy feature selection minimizing expected posterior variance.
    FeatureVariance,
}

impl Chooser {
    pub const ALL: [Chooser; 12] = [
        Chooser::Random,
        Chooser::Full,
        Chooser::Exhaustive,
        Chooser::GreedyDiscrete,
        Chooser::IncrementalOptimize,
        Chooser::JointOptimize,
        Chooser::FeatureEntropy,
        Chooser::FeatureEntropySearch,
        Chooser::FeatureEntropySearchThenOptim,
        Chooser::FeatureEntropyRandomInitNone,
        Chooser::FeatureRandom,
        Chooser::FeatureVariance,
    ];

    /// Whether the strategy produces a [`Query::Feature`].
    pub fn is_feature_query(self) -> bool {
        matches!(
            self,
            Chooser::FeatureEntropy
                | Chooser::FeatureEntropySearch
                | Chooser::FeatureEntropySearchThenOptim
                | Chooser::FeatureEntropyRandomInitNone
                | Chooser::FeatureRandom
                | Chooser::FeatureVariance
        )
    }
}

impl fmt::Display for Chooser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Chooser::Random => "random",
            Chooser::Full => "full",
            Chooser::Exhaustive => "exhaustive_entropy",
            Chooser::GreedyDiscrete => "greedy_entropy_discrete_tf",
            Chooser::IncrementalOptimize => "incremental_optimize",
            Chooser::JointOptimize => "joint_optimize",
            Chooser::FeatureEntropy => "feature_entropy",
            Chooser::FeatureEntropySearch => "feature_entropy_search",
            Chooser::FeatureEntropySearchThenOptim => "feature_entropy_search_then_optim",
            Chooser::FeatureEntropyRandomInitNone => "feature_entropy_random_init_none",
            Chooser::FeatureRandom => "feature_random",
            Chooser::FeatureVariance => "feature_variance",
        })
    }
}

impl FromStr for Chooser {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let chooser = match name.as_str() {
            "exhaustive" => Chooser::Exhaustive,
            "greedy_discrete" => Chooser::GreedyDiscrete,
            "feature_entropy_init_none" => Chooser::FeatureEntropy,
            other => Chooser::ALL
                .into_iter()
                .find(|c| c.to_string() == other)
                .ok_or_else(|| Error::UnknownChooser {
                    input: s.to_string(),
                    expected: Chooser::ALL
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                })?,
        };
        Ok(chooser)
    }
}

/// A question put to the human.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Reward vectors (one per row) to choose between.
    Discrete(Array2<f64>),
    /// Features whose weights are asked about; `weights` fixes the remaining
    /// features in ascending index order.
    Feature {
        indices: Vec<usize>,
        weights: Array1<f64>,
    },
}

impl Query {
    /// Alternatives of a discrete query, or queried features.
    pub fn len(&self) -> usize {
        match self {
            Query::Discrete(rewards) => rewards.nrows(),
            Query::Feature { indices, .. } => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selected query together with the posterior its honest answer implies.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query: Query,
    /// Objective of the query over the full true space.
    pub objective: f64,
    /// Log-posterior over the true space after the simulated answer.
    pub true_log_posterior: Array1<f64>,
    pub true_entropy: f64,
    /// Posterior mean reward.
    pub post_avg: Array1<f64>,
    pub selection_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_round_trip() {
        for chooser in Chooser::ALL {
            assert_eq!(chooser.to_string().parse::<Chooser>().unwrap(), chooser);
        }
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!("exhaustive".parse::<Chooser>().unwrap(), Chooser::Exhaustive);
        assert_eq!(" Greedy_Discrete ".parse::<Chooser>().unwrap(), Chooser::GreedyDiscrete);
        assert_eq!(
            "feature_entropy_init_none".parse::<Chooser>().unwrap(),
            Chooser::FeatureEntropy
        );
    }

    #[test]
    fn unknown_name_lists_alternatives() {
        let err = "maxmin".parse::<Chooser>().unwrap_err();
        match err {
            Error::UnknownChooser { input, expected } => {
                assert_eq!(input, "maxmin");
                assert!(expected.contains("joint_optimize"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
