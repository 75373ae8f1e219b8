use std::{sync::Arc, time::Instant};

use ndarray::{Array1, Array2, ArrayView1};
use rand::{SeedableRng, rngs::StdRng};
use tracing::info;

use super::{Chooser, Query, QueryOutcome};
use crate::{
    Error, Result,
    config::IrdConfig,
    inference::Inference,
    model::{ComputeRequest, Model, ModelCache, ModelKey, ModelOutput, ModelOutputs, ModelSpec},
    posterior::{Hypotheses, TrueRewardSample, subsample_true_rewards},
    rewards::ProxyRewardSpace,
};

/// Outputs requested when scoring the query finally posed to the human.
pub(super) const FINAL_OUTPUTS: [ModelOutput; 4] = [
    ModelOutput::Objective,
    ModelOutput::TrueLogPosterior,
    ModelOutput::TrueEntropy,
    ModelOutput::PostAvg,
];

/// Entry point for query selection within one inference run.
///
/// Owns the run's [`Inference`] state, the model cache and the single random
/// stream every sampling step draws from.
///
/// # Examples
///
/// ```
/// use ird_query::{
///     config::IrdConfig,
///     inference::Inference,
///     mdp::BanditsMdp,
///     query::{Chooser, QueryChooser},
///     rewards::{ProxyRewardSpace, TrueRewardSpace},
/// };
/// use ndarray::{Array2, array};
///
/// let mdp = BanditsMdp::new(Array2::eye(3), 0)?;
/// let proxies = ProxyRewardSpace::new(Array2::eye(3))?;
/// let truth = TrueRewardSpace::uniform(Array2::eye(3))?;
/// let inference = Inference::new(mdp.into(), proxies, truth)?;
/// let config = IrdConfig::builder().feature_dim(3).subsampling(false).build()?;
///
/// let mut chooser = QueryChooser::new(config, inference, 7)?;
/// let outcome = chooser.find_query(2, Chooser::Exhaustive, array![0.0, 1.0, 0.0].view())?;
/// assert_eq!(outcome.query.len(), 2);
/// # Ok::<(), ird_query::Error>(())
/// ```
#[derive(Debug)]
pub struct QueryChooser {
    pub(super) config: IrdConfig,
    pub(super) inference: Inference,
    cache: ModelCache,
    pub(super) rng: StdRng,
}

impl QueryChooser {
    pub fn new(config: IrdConfig, inference: Inference, seed: u64) -> Result<Self> {
        check_dim(&config, &inference)?;
        Ok(Self {
            config,
            inference,
            cache: ModelCache::new(),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Restart the random stream for a new trial.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &IrdConfig {
        &self.config
    }

    pub fn inference(&self) -> &Inference {
        &self.inference
    }

    pub fn inference_mut(&mut self) -> &mut Inference {
        &mut self.inference
    }

    /// Start a new run. Built models stay cached; they do not capture the MDP.
    pub fn set_inference(&mut self, inference: Inference) -> Result<()> {
        check_dim(&self.config, &inference)?;
        self.inference = inference;
        Ok(())
    }

    pub fn model_cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Cache-backed model constructor.
    pub fn get_model(&mut self, spec: ModelSpec) -> Arc<Model> {
        let key = ModelKey::new(&self.config, self.inference.mdp(), spec);
        self.cache.get_or_build(key)
    }

    /// Install `reward_space` as the proxy space and plan every proxy once.
    pub fn cache_feature_expectations(&mut self, reward_space: ProxyRewardSpace) -> Result<&Array2<f64>> {
        info!(proxies = reward_space.len(), "caching proxy feature expectations");
        self.inference.set_proxy_space(reward_space)?;
        let model = self.get_model(ModelSpec::new(self.inference.proxy_space().len()));
        let matrix = model.feature_expectations(
            self.inference.mdp(),
            self.inference.proxy_space().rewards().view(),
        )?;
        self.inference.set_feature_exp_matrix(matrix)?;
        self.inference
            .feature_exp_matrix()
            .ok_or_else(|| Error::MissingInput {
                input: "feature_exp_matrix".to_string(),
            })
    }

    /// Parse `chooser` and run it.
    pub fn find_query_by_name(
        &mut self,
        query_size: usize,
        chooser: &str,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<QueryOutcome> {
        let chooser: Chooser = chooser.parse()?;
        self.find_query(query_size, chooser, true_reward)
    }

    /// Select a query of `query_size` with `chooser` and answer it with `true_reward`.
    pub fn find_query(
        &mut self,
        query_size: usize,
        chooser: Chooser,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<QueryOutcome> {
        if true_reward.len() != self.inference.feature_dim() {
            return Err(Error::DimensionMismatch {
                context: "true reward".to_string(),
                expected: self.inference.feature_dim(),
                got: true_reward.len(),
            });
        }
        info!(%chooser, query_size, "selecting query");
        let start = Instant::now();

        let (query, outputs) = if query_size == 0 && chooser != Chooser::Full {
            self.empty_query(chooser, true_reward)?
        } else {
            match chooser {
                Chooser::Random => self.random_discrete_query(query_size, true_reward)?,
                Chooser::Full => self.full_query(true_reward)?,
                Chooser::Exhaustive => self.discrete_query(query_size, query_size, true_reward)?,
                Chooser::GreedyDiscrete => self.discrete_query(query_size, 1, true_reward)?,
                Chooser::IncrementalOptimize => {
                    self.optimized_discrete_query(query_size, 1, true_reward)?
                }
                Chooser::JointOptimize => {
                    self.optimized_discrete_query(query_size, query_size, true_reward)?
                }
                Chooser::FeatureRandom => self.random_feature_query(query_size, true_reward)?,
                feature_chooser => self.feature_query(query_size, feature_chooser, true_reward)?,
            }
        };

        let selection_time = start.elapsed();
        let outcome = QueryOutcome {
            query,
            objective: outputs.objective()?,
            true_log_posterior: outputs.true_log_posterior()?.clone(),
            true_entropy: outputs.true_entropy()?,
            post_avg: outputs.post_avg()?.clone(),
            selection_time,
        };
        info!(
            %chooser,
            size = outcome.query.len(),
            objective = outcome.objective,
            true_entropy = outcome.true_entropy,
            elapsed_ms = selection_time.as_millis() as u64,
            "query selected"
        );
        Ok(outcome)
    }

    /// Subsample of the true space for search steps, or `None` to search
    /// over the full space.
    pub(super) fn draw_hypotheses(&mut self) -> Result<Option<TrueRewardSample>> {
        if !self.config.subsampling() {
            return Ok(None);
        }
        subsample_true_rewards(
            &mut self.rng,
            self.inference.true_space(),
            self.config.num_subsamples(),
            self.config.weighting(),
        )
        .map(Some)
    }

    /// Plan the proxies if no feature expectations are cached yet.
    pub(super) fn ensure_feature_exps(&mut self) -> Result<()> {
        if self.inference.feature_exp_matrix().is_none() {
            let proxies = self.inference.proxy_space().clone();
            self.cache_feature_expectations(proxies)?;
        }
        Ok(())
    }

    /// An empty query leaves the prior untouched.
    fn empty_query(
        &mut self,
        chooser: Chooser,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        let dim = self.inference.feature_dim();
        let model = self.get_model(ModelSpec::new(0).no_planning());
        let feature_exps = Array2::<f64>::zeros((0, dim));
        let outputs = model.compute(
            ComputeRequest::new(&FINAL_OUTPUTS)
                .feature_exps(feature_exps.view())
                .hypotheses(self.inference.hypotheses())
                .true_reward(true_reward),
        )?;
        let query = if chooser.is_feature_query() {
            Query::Feature {
                indices: Vec::new(),
                weights: Array1::zeros(dim),
            }
        } else {
            Query::Discrete(Array2::zeros((0, dim)))
        };
        Ok((query, outputs))
    }
}

/// Hypotheses searched over: the drawn subsample, else the whole true space.
pub(super) fn search_hypotheses<'a>(
    sample: &'a Option<TrueRewardSample>,
    inference: &'a Inference,
) -> Hypotheses<'a> {
    match sample {
        Some(sample) => sample.hypotheses(),
        None => inference.hypotheses(),
    }
}

fn check_dim(config: &IrdConfig, inference: &Inference) -> Result<()> {
    if config.feature_dim() != inference.feature_dim() {
        return Err(Error::DimensionMismatch {
            context: "configured feature_dim".to_string(),
            expected: inference.feature_dim(),
            got: config.feature_dim(),
        });
    }
    Ok(())
}
