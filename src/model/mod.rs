//! Configured planning-and-scoring models and their cache.
//!
//! A [`Model`] couples a planner (or none, for scoring cached feature
//! expectations) with the posterior engine and one objective. Its
//! [`Model::compute`] call takes a query, optionally optimizes the query's free
//! reward weights, and returns whichever [`ModelOutput`]s were requested.
//! Models are built once per [`ModelKey`] and shared through the
//! [`ModelCache`].

pub mod cache;
pub mod key;
pub mod layout;

use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::debug;

pub use cache::ModelCache;
pub use key::{ModelKey, ModelSpec};
pub use layout::{QueryLayout, feature_query_rewards, unqueried_features};

use crate::{
    Error, Result,
    mdp::Mdp,
    optim::{GradientDescent, Optimizer},
    planner::{Planner, build_planner},
    posterior::{Hypotheses, PosteriorEngine, honest_answer, posterior_mean},
    utils::entropy_from_log_probs,
};
use layout::PlannedObjective;

/// Quantities a [`Model::compute`] call can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelOutput {
    FeatureExps,
    Objective,
    TrueLogPosterior,
    TrueEntropy,
    PostAvg,
    WeightsToTrain,
}

impl fmt::Display for ModelOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelOutput::FeatureExps => "feature_exps",
            ModelOutput::Objective => "objective",
            ModelOutput::TrueLogPosterior => "true_log_posterior",
            ModelOutput::TrueEntropy => "true_entropy",
            ModelOutput::PostAvg => "post_avg",
            ModelOutput::WeightsToTrain => "weights_to_train",
        })
    }
}

/// Inputs of one [`Model::compute`] call.
///
/// # Examples
///
/// ```
/// use ird_query::model::{ComputeRequest, ModelOutput, QueryLayout};
/// use ndarray::array;
///
/// let proxies = array![[1.0, 0.0], [0.0, 1.0]];
/// let request = ComputeRequest::new(&[ModelOutput::FeatureExps])
///     .query(QueryLayout::Rewards(proxies.view()));
/// assert!(request.wants(ModelOutput::FeatureExps));
/// ```
#[derive(Debug, Clone)]
pub struct ComputeRequest<'a> {
    outputs: Vec<ModelOutput>,
    mdp: Option<&'a Mdp>,
    layout: Option<QueryLayout<'a>>,
    feature_exps: Option<ArrayView2<'a, f64>>,
    hypotheses: Option<Hypotheses<'a>>,
    true_reward: Option<ArrayView1<'a, f64>>,
    weight_inits: Option<Array2<f64>>,
    gradient_steps: usize,
    optimizer: Option<&'a dyn Optimizer>,
}

impl<'a> ComputeRequest<'a> {
    pub fn new(outputs: &[ModelOutput]) -> Self {
        Self {
            outputs: outputs.to_vec(),
            mdp: None,
            layout: None,
            feature_exps: None,
            hypotheses: None,
            true_reward: None,
            weight_inits: None,
            gradient_steps: 0,
            optimizer: None,
        }
    }

    pub fn mdp(mut self, mdp: &'a Mdp) -> Self {
        self.mdp = Some(mdp);
        self
    }

    pub fn query<'b: 'a>(mut self, layout: QueryLayout<'b>) -> Self {
        self.layout = Some(layout.reborrow());
        self
    }

    /// Use these feature expectations instead of planning.
    pub fn feature_exps<'b: 'a>(mut self, feature_exps: ArrayView2<'b, f64>) -> Self {
        self.feature_exps = Some(feature_exps.reborrow());
        self
    }

    pub fn hypotheses<'b: 'a>(mut self, hypotheses: Hypotheses<'b>) -> Self {
        self.hypotheses = Some(hypotheses.reborrow());
        self
    }

    /// Ground truth used to simulate the human's answer.
    pub fn true_reward<'b: 'a>(mut self, true_reward: ArrayView1<'b, f64>) -> Self {
        self.true_reward = Some(true_reward.reborrow());
        self
    }

    /// Starting values of the free reward weights.
    pub fn weight_inits(mut self, weight_inits: Array2<f64>) -> Self {
        self.weight_inits = Some(weight_inits);
        self
    }

    /// Steps of the default gradient optimizer.
    pub fn gradient_steps(mut self, steps: usize) -> Self {
        self.gradient_steps = steps;
        self
    }

    /// Replace the default gradient optimizer.
    pub fn optimizer(mut self, optimizer: &'a dyn Optimizer) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn wants(&self, output: ModelOutput) -> bool {
        self.outputs.contains(&output)
    }
}

/// Results of a [`Model::compute`] call; only requested outputs are present.
#[derive(Debug, Clone, Default)]
pub struct ModelOutputs {
    feature_exps: Option<Array2<f64>>,
    objective: Option<f64>,
    true_log_posterior: Option<Array1<f64>>,
    true_entropy: Option<f64>,
    post_avg: Option<Array1<f64>>,
    weights_to_train: Option<Array2<f64>>,
}

fn missing(output: ModelOutput) -> Error {
    Error::MissingOutput {
        output: output.to_string(),
    }
}

impl ModelOutputs {
    pub fn feature_exps(&self) -> Result<&Array2<f64>> {
        self.feature_exps
            .as_ref()
            .ok_or_else(|| missing(ModelOutput::FeatureExps))
    }

    pub fn objective(&self) -> Result<f64> {
        self.objective.ok_or_else(|| missing(ModelOutput::Objective))
    }

    pub fn true_log_posterior(&self) -> Result<&Array1<f64>> {
        self.true_log_posterior
            .as_ref()
            .ok_or_else(|| missing(ModelOutput::TrueLogPosterior))
    }

    pub fn true_entropy(&self) -> Result<f64> {
        self.true_entropy
            .ok_or_else(|| missing(ModelOutput::TrueEntropy))
    }

    pub fn post_avg(&self) -> Result<&Array1<f64>> {
        self.post_avg
            .as_ref()
            .ok_or_else(|| missing(ModelOutput::PostAvg))
    }

    pub fn weights_to_train(&self) -> Result<&Array2<f64>> {
        self.weights_to_train
            .as_ref()
            .ok_or_else(|| missing(ModelOutput::WeightsToTrain))
    }
}

/// A planner plus posterior engine configured by a [`ModelKey`].
#[derive(Debug)]
pub struct Model {
    key: ModelKey,
    planner: Option<Box<dyn Planner>>,
    engine: PosteriorEngine,
}

impl Model {
    pub fn new(key: ModelKey) -> Self {
        let planner = (!key.no_planning).then(|| build_planner(key.mdp_kind, key.planner_settings()));
        Self {
            key,
            planner,
            engine: PosteriorEngine::new(key.beta()),
        }
    }

    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    pub fn planner(&self) -> Option<&dyn Planner> {
        self.planner.as_deref()
    }

    pub fn engine(&self) -> PosteriorEngine {
        self.engine
    }

    /// Plan `rewards` on `mdp` and return one feature-expectation row per reward.
    pub fn feature_expectations(&self, mdp: &Mdp, rewards: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let outputs = self.compute(
            ComputeRequest::new(&[ModelOutput::FeatureExps])
                .mdp(mdp)
                .query(QueryLayout::Rewards(rewards)),
        )?;
        outputs.feature_exps().cloned()
    }

    /// Evaluate the requested outputs for one query.
    ///
    /// # Errors
    ///
    /// [`Error::MissingInput`] when an output needs an input the request does
    /// not carry, [`Error::InvalidQuery`] when the query does not match the
    /// model's shape.
    pub fn compute(&self, request: ComputeRequest<'_>) -> Result<ModelOutputs> {
        let dim = self.key.feature_dim;
        if let Some(layout) = &request.layout {
            layout.validate(dim)?;
        }
        let mut outputs = ModelOutputs::default();

        let feature_exps = match request.feature_exps {
            Some(fe) => {
                if fe.ncols() != dim {
                    return Err(Error::DimensionMismatch {
                        context: "supplied feature expectations".to_string(),
                        expected: dim,
                        got: fe.ncols(),
                    });
                }
                if self.key.discrete && fe.nrows() != self.key.query_size {
                    return Err(Error::InvalidQuery {
                        message: format!(
                            "{} alternatives supplied to a model of query size {}",
                            fe.nrows(),
                            self.key.query_size
                        ),
                    });
                }
                fe.to_owned()
            }
            None => self.plan(&request, &mut outputs)?,
        };

        let wants_truth = [
            ModelOutput::TrueLogPosterior,
            ModelOutput::TrueEntropy,
            ModelOutput::PostAvg,
        ]
        .into_iter()
        .any(|o| request.wants(o));

        if request.wants(ModelOutput::Objective) || wants_truth {
            let hypotheses = request.hypotheses.ok_or_else(|| Error::MissingInput {
                input: "true_reward_matrix".to_string(),
            })?;
            let analysis = self.engine.analyze(feature_exps.view(), hypotheses)?;
            if request.wants(ModelOutput::Objective) {
                outputs.objective = Some(analysis.objective(self.key.objective));
            }
            if wants_truth {
                let true_reward = request.true_reward.ok_or_else(|| Error::MissingInput {
                    input: "true_reward".to_string(),
                })?;
                if true_reward.len() != dim {
                    return Err(Error::DimensionMismatch {
                        context: "true reward".to_string(),
                        expected: dim,
                        got: true_reward.len(),
                    });
                }
                let answer = honest_answer(feature_exps.view(), true_reward);
                let log_posterior = analysis.log_posterior(answer)?;
                let entropy = match answer {
                    Some(_) => entropy_from_log_probs(log_posterior.view()),
                    None => (hypotheses.len() as f64).ln(),
                };
                outputs.post_avg = Some(posterior_mean(hypotheses.rewards(), log_posterior.view()));
                outputs.true_entropy = Some(entropy);
                outputs.true_log_posterior = Some(log_posterior);
            }
        }

        if request.wants(ModelOutput::FeatureExps) {
            outputs.feature_exps = Some(feature_exps);
        }
        Ok(outputs)
    }

    /// Run the planner (and optimizer, if configured) for the request's query.
    fn plan(&self, request: &ComputeRequest<'_>, outputs: &mut ModelOutputs) -> Result<Array2<f64>> {
        let planner = self.planner.as_deref().ok_or_else(|| Error::MissingInput {
            input: "feature_expectations_input".to_string(),
        })?;
        let mdp = request.mdp.ok_or_else(|| Error::MissingInput {
            input: "mdp".to_string(),
        })?;
        if mdp.kind() != self.key.mdp_kind {
            return Err(Error::PlannerMismatch {
                model: self.key.mdp_kind.to_string(),
                mdp: mdp.kind().to_string(),
            });
        }
        let layout = request.layout.ok_or_else(|| Error::MissingInput {
            input: "query".to_string(),
        })?;
        let dim = self.key.feature_dim;
        let num_unknown = self.key.num_unknown.unwrap_or(0);

        let fixed_fe = match layout {
            QueryLayout::Rewards(fixed) => {
                if fixed.nrows() + num_unknown != self.key.query_size {
                    return Err(Error::InvalidQuery {
                        message: format!(
                            "{} fixed and {num_unknown} free rows for a model of query size {}",
                            fixed.nrows(),
                            self.key.query_size
                        ),
                    });
                }
                if fixed.nrows() > 0 {
                    planner.feature_expectations(mdp, fixed)?
                } else {
                    Array2::zeros((0, dim))
                }
            }
            QueryLayout::Features { indices, .. } => {
                if indices.len() != self.key.query_size {
                    return Err(Error::InvalidQuery {
                        message: format!(
                            "{} queried features for a model of query size {}",
                            indices.len(),
                            self.key.query_size
                        ),
                    });
                }
                Array2::zeros((0, dim))
            }
        };

        let free_shape = layout.free_shape(dim, num_unknown);
        let init = if free_shape.0 * free_shape.1 == 0 {
            Array2::zeros(free_shape)
        } else {
            let init = request
                .weight_inits
                .clone()
                .ok_or_else(|| Error::MissingInput {
                    input: "weight_inits".to_string(),
                })?;
            if init.dim() != free_shape {
                return Err(Error::DimensionMismatch {
                    context: "weight_inits elements".to_string(),
                    expected: free_shape.0 * free_shape.1,
                    got: init.len(),
                });
            }
            init
        };

        let objective = PlannedObjective {
            planner,
            mdp,
            layout: layout.reborrow(),
            fixed_fe,
            engine: self.engine,
            objective: self.key.objective,
            hypotheses: request.hypotheses.map(|h| h.reborrow()),
        };

        let run_optimizer = self.key.optimize
            && !init.is_empty()
            && (request.gradient_steps > 0 || request.optimizer.is_some());
        let params = if run_optimizer {
            let default = GradientDescent::new(self.key.lr(), request.gradient_steps);
            let optimizer: &dyn Optimizer = match request.optimizer {
                Some(optimizer) => optimizer,
                None => &default,
            };
            let result = optimizer.minimize(&objective, init)?;
            debug!(value = result.value, "free weights optimized");
            result.params
        } else {
            init
        };

        let feature_exps = objective
            .feature_exps_batch(std::slice::from_ref(&params))?
            .pop()
            .unwrap_or_else(|| Array2::zeros((0, dim)));
        if request.wants(ModelOutput::WeightsToTrain) {
            outputs.weights_to_train = Some(params);
        }
        Ok(feature_exps)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;
    use crate::{
        config::{IrdConfig, Objective},
        mdp::BanditsMdp,
        optim::RandomSearch,
    };

    fn setup() -> (IrdConfig, Mdp) {
        let config = IrdConfig::builder()
            .feature_dim(2)
            .beta(2.0)
            .beta_planner(5.0)
            .lr(0.5)
            .build()
            .unwrap();
        let mdp = BanditsMdp::new(array![[1.0, 0.0], [0.0, 1.0], [0.6, 0.6]], 0)
            .unwrap()
            .into();
        (config, mdp)
    }

    fn uniform_hypotheses() -> (Array2<f64>, Array1<f64>) {
        (array![[1.0, 0.0], [0.0, 1.0]], array![0.5_f64.ln(), 0.5_f64.ln()])
    }

    #[test]
    fn no_planning_model_requires_feature_exps() {
        let (config, mdp) = setup();
        let model = Model::new(ModelKey::new(&config, &mdp, ModelSpec::new(2).no_planning()));
        let (rewards, prior) = uniform_hypotheses();
        let err = model
            .compute(
                ComputeRequest::new(&[ModelOutput::Objective])
                    .hypotheses(Hypotheses::new(rewards.view(), prior.view())),
            )
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput { .. }));
    }

    #[test]
    fn planned_and_cached_scores_agree() {
        let (config, mdp) = setup();
        let (rewards, prior) = uniform_hypotheses();
        let hyp = Hypotheses::new(rewards.view(), prior.view());
        let planned = Model::new(ModelKey::new(&config, &mdp, ModelSpec::new(2)));
        let fe = planned.feature_expectations(&mdp, rewards.view()).unwrap();
        let from_plan = planned
            .compute(
                ComputeRequest::new(&[ModelOutput::Objective])
                    .mdp(&mdp)
                    .query(QueryLayout::Rewards(rewards.view()))
                    .hypotheses(hyp),
            )
            .unwrap()
            .objective()
            .unwrap();
        let cached = Model::new(ModelKey::new(&config, &mdp, ModelSpec::new(2).no_planning()));
        let from_cache = cached
            .compute(
                ComputeRequest::new(&[ModelOutput::Objective])
                    .feature_exps(fe.view())
                    .hypotheses(hyp),
            )
            .unwrap()
            .objective()
            .unwrap();
        assert!((from_plan - from_cache).abs() < 1e-12);
    }

    #[test]
    fn true_outputs_follow_the_honest_answer() {
        let (config, mdp) = setup();
        let (rewards, prior) = uniform_hypotheses();
        let model = Model::new(ModelKey::new(&config, &mdp, ModelSpec::new(2)));
        let truth = array![1.0, 0.0];
        let outputs = model
            .compute(
                ComputeRequest::new(&[
                    ModelOutput::TrueLogPosterior,
                    ModelOutput::TrueEntropy,
                    ModelOutput::PostAvg,
                ])
                .mdp(&mdp)
                .query(QueryLayout::Rewards(rewards.view()))
                .hypotheses(Hypotheses::new(rewards.view(), prior.view()))
                .true_reward(truth.view()),
            )
            .unwrap();
        let post = outputs.true_log_posterior().unwrap();
        assert!(post[0] > post[1]);
        assert!(outputs.true_entropy().unwrap() < 2.0_f64.ln());
        assert!(outputs.post_avg().unwrap()[0] > 0.5);
        assert!(matches!(
            outputs.objective(),
            Err(Error::MissingOutput { .. })
        ));
    }

    #[test]
    fn optimizing_free_rows_does_not_worsen_the_objective() {
        let (config, mdp) = setup();
        let (rewards, prior) = uniform_hypotheses();
        let hyp = Hypotheses::new(rewards.view(), prior.view());
        let fixed = array![[1.0, -1.0]];
        let init = array![[0.0, 0.0]];
        let key = ModelKey::new(
            &config,
            &mdp,
            ModelSpec::new(2).with_unknown(1).optimizing(),
        );
        let model = Model::new(key);
        let compute = |steps: usize| {
            model
                .compute(
                    ComputeRequest::new(&[ModelOutput::Objective, ModelOutput::WeightsToTrain])
                        .mdp(&mdp)
                        .query(QueryLayout::Rewards(fixed.view()))
                        .hypotheses(hyp)
                        .weight_inits(init.clone())
                        .gradient_steps(steps),
                )
                .unwrap()
        };
        let before = compute(0).objective().unwrap();
        let after = compute(15);
        assert!(after.objective().unwrap() < before);
        assert_eq!(after.weights_to_train().unwrap().dim(), (1, 2));
    }

    #[test]
    fn feature_query_search_keeps_best_weights() {
        let (config, mdp) = setup();
        let (rewards, prior) = uniform_hypotheses();
        let grid = [-1.0, 1.0];
        let key = ModelKey::new(
            &config,
            &mdp,
            ModelSpec::new(1)
                .feature(2)
                .optimizing()
                .with_objective(Objective::Entropy),
        );
        let model = Model::new(key);
        let search = RandomSearch::new(vec![array![[-1.0]], array![[0.0]], array![[1.0]]]);
        let outputs = model
            .compute(
                ComputeRequest::new(&[ModelOutput::FeatureExps, ModelOutput::WeightsToTrain])
                    .mdp(&mdp)
                    .query(QueryLayout::Features {
                        indices: &[0],
                        grid: &grid,
                    })
                    .hypotheses(Hypotheses::new(rewards.view(), prior.view()))
                    .weight_inits(array![[0.5]])
                    .optimizer(&search),
            )
            .unwrap();
        assert_eq!(outputs.feature_exps().unwrap().nrows(), 2);
        assert_eq!(outputs.weights_to_train().unwrap().dim(), (1, 1));
    }

    fn score_with_truth(
        model: &Model,
        feature_exps: ArrayView2<'_, f64>,
        hypotheses: Hypotheses<'_>,
        truth: ArrayView1<'_, f64>,
    ) -> ModelOutputs {
        model
            .compute(
                ComputeRequest::new(&[ModelOutput::Objective, ModelOutput::TrueEntropy])
                    .feature_exps(feature_exps)
                    .hypotheses(hypotheses)
                    .true_reward(truth),
            )
            .unwrap()
    }

    #[test]
    fn views_from_unrelated_owners_share_one_request() {
        let (config, mdp) = setup();
        let (rewards, prior) = uniform_hypotheses();
        let hyp = Hypotheses::new(rewards.view(), prior.view());
        let model = Model::new(ModelKey::new(&config, &mdp, ModelSpec::new(2).no_planning()));
        let truth = array![0.0, 1.0];
        let mut entropies = Vec::new();
        for scale in [1.0, 2.0] {
            let fe = array![[1.0, 0.0], [0.0, 1.0]] * scale;
            let outputs = score_with_truth(&model, fe.view(), hyp, truth.view());
            entropies.push(outputs.true_entropy().unwrap());
        }
        assert!(entropies[1] <= entropies[0]);
    }

    #[test]
    fn wrong_query_size_is_rejected() {
        let (config, mdp) = setup();
        let model = Model::new(ModelKey::new(&config, &mdp, ModelSpec::new(3)));
        let rewards = array![[1.0, 0.0]];
        assert!(matches!(
            model.feature_expectations(&mdp, rewards.view()),
            Err(Error::InvalidQuery { .. })
        ));
    }
}
