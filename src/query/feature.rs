//! Choosers whose queries are feature indices plus weights for the rest.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::debug;

use super::{
    Chooser, Query, QueryChooser,
    chooser::{FINAL_OUTPUTS, search_hypotheses},
};
use crate::{
    Error, Result,
    config::Objective,
    model::{ComputeRequest, ModelOutput, ModelOutputs, ModelSpec, QueryLayout, unqueried_features},
    optim::{GradientDescent, Optimizer, RandomSearch, WeightSampler},
    utils::{random_combination, symmetric_grid},
};

/// How the unqueried weights of each candidate feature query are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refinement {
    Gradient,
    Search,
    SearchThenGradient,
}

#[derive(Debug, Clone, Copy)]
struct FeatureSearch {
    objective: Objective,
    refinement: Refinement,
    /// Start each candidate from the previous step's best weights.
    reuse_weights: bool,
}

impl FeatureSearch {
    fn for_chooser(chooser: Chooser, configured: Objective) -> Option<Self> {
        let (objective, refinement, reuse_weights) = match chooser {
            Chooser::FeatureEntropy => (configured, Refinement::Gradient, true),
            Chooser::FeatureEntropySearch => (configured, Refinement::Search, true),
            Chooser::FeatureEntropySearchThenOptim => {
                (configured, Refinement::SearchThenGradient, true)
            }
            Chooser::FeatureEntropyRandomInitNone => (configured, Refinement::Gradient, false),
            Chooser::FeatureVariance => (Objective::Variance, Refinement::Gradient, true),
            _ => return None,
        };
        Some(Self {
            objective,
            refinement,
            reuse_weights,
        })
    }
}

/// Best candidate of one greedy step.
#[derive(Debug, Clone)]
struct Candidate {
    indices: Vec<usize>,
    weights: Array1<f64>,
    cost: f64,
}

impl QueryChooser {
    /// Greedily add `query_size` features, each time keeping the one whose
    /// query has the lowest objective plus asking cost.
    pub(super) fn feature_query(
        &mut self,
        query_size: usize,
        chooser: Chooser,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        let search = FeatureSearch::for_chooser(chooser, self.config.objective()).ok_or_else(|| {
            Error::InvalidQuery {
                message: format!("{chooser} does not build feature queries"),
            }
        })?;
        self.require_feature_size(query_size)?;

        let mut indices: Vec<usize> = Vec::with_capacity(query_size);
        let mut weights: Option<Array1<f64>> = None;
        while indices.len() < query_size {
            let best = self.find_next_feature(&indices, weights.as_ref(), search)?;
            debug!(
                size = best.indices.len(),
                feature = best.indices.last().copied(),
                cost = best.cost,
                "feature query grown"
            );
            indices = best.indices;
            weights = Some(best.weights);
        }
        let dim = self.inference.feature_dim();
        let weights = weights.unwrap_or_else(|| Array1::zeros(dim - indices.len()));
        self.score_feature_query(indices, weights, search.objective, true_reward)
    }

    /// Random distinct features with weights drawn from `weights_dist_init`.
    pub(super) fn random_feature_query(
        &mut self,
        query_size: usize,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        self.require_feature_size(query_size)?;
        let dim = self.inference.feature_dim();
        let indices = random_combination(&mut self.rng, dim, query_size);
        let weights = self
            .init_sampler()
            .sample(&mut self.rng, 1, dim - query_size)?
            .index_axis_move(Axis(0), 0);
        self.score_feature_query(indices, weights, self.config.objective(), true_reward)
    }

    fn find_next_feature(
        &mut self,
        curr: &[usize],
        curr_weights: Option<&Array1<f64>>,
        search: FeatureSearch,
    ) -> Result<Candidate> {
        let dim = self.inference.feature_dim();
        let free = dim - curr.len() - 1;
        let grid = symmetric_grid(self.config.discretization_size());
        let steps = self.config.num_iters_optim();
        let tolerance = self.config.tie_tolerance();
        let cost_of_asking = self.config.cost_of_asking();
        let refine_every = search.refinement == Refinement::SearchThenGradient
            && !self.config.only_optim_biggest();

        let sample = self.draw_hypotheses()?;
        let model = self.get_model(
            ModelSpec::new(curr.len() + 1)
                .feature(self.config.discretization_size())
                .optimizing()
                .with_objective(search.objective),
        );
        let init_sampler = self.init_sampler();
        let search_sampler = WeightSampler::new(
            self.config.weights_dist_search(),
            self.config.discretization_size(),
        );
        let gradient_descent = GradientDescent::new(self.config.lr(), steps);
        let gradient: &dyn Optimizer = &gradient_descent;
        let hypotheses = search_hypotheses(&sample, &self.inference);
        let mdp = self.inference.mdp();

        let evaluate = |query: &[usize], init: Array2<f64>, optimizer: &dyn Optimizer| {
            let outputs = model.compute(
                ComputeRequest::new(&[ModelOutput::Objective, ModelOutput::WeightsToTrain])
                    .mdp(mdp)
                    .query(QueryLayout::Features {
                        indices: query,
                        grid: &grid,
                    })
                    .hypotheses(hypotheses)
                    .weight_inits(init)
                    .optimizer(optimizer),
            )?;
            Ok::<_, Error>((outputs.objective()?, outputs.weights_to_train()?.clone()))
        };

        let mut best: Option<Candidate> = None;
        for (pos, feature) in unqueried_features(dim, curr).into_iter().enumerate() {
            let mut query = curr.to_vec();
            query.push(feature);

            let init = match curr_weights {
                Some(weights) if search.reuse_weights => {
                    let kept: Vec<f64> = weights
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != pos)
                        .map(|(_, &w)| w)
                        .collect();
                    Array2::from_shape_vec((1, free), kept)?
                }
                _ => init_sampler.sample(&mut self.rng, 1, free)?,
            };

            let (objective, weights) = match search.refinement {
                Refinement::Gradient => evaluate(&query, init, gradient)?,
                Refinement::Search | Refinement::SearchThenGradient => {
                    let population_search = RandomSearch::sampled(
                        &search_sampler,
                        &mut self.rng,
                        self.config.weight_search_samples(),
                        1,
                        free,
                    )?;
                    let searched = evaluate(&query, init, &population_search)?;
                    if refine_every {
                        evaluate(&query, searched.1, gradient)?
                    } else {
                        searched
                    }
                }
            };

            let cost = objective + cost_of_asking * query.len() as f64;
            if best
                .as_ref()
                .is_none_or(|current| cost <= current.cost + tolerance)
            {
                best = Some(Candidate {
                    indices: query,
                    weights: weights.index_axis_move(Axis(0), 0),
                    cost,
                });
            }
        }

        let mut best = best.ok_or_else(|| Error::InvalidQuery {
            message: format!("no feature left to add to a query of size {}", curr.len()),
        })?;
        if search.refinement == Refinement::SearchThenGradient && !refine_every {
            let init = best.weights.clone().insert_axis(Axis(0));
            let (objective, weights) = evaluate(&best.indices, init, gradient)?;
            best.weights = weights.index_axis_move(Axis(0), 0);
            best.cost = objective + cost_of_asking * best.indices.len() as f64;
        }
        Ok(best)
    }

    /// Final outputs of a feature query on the human's answer grid.
    fn score_feature_query(
        &mut self,
        indices: Vec<usize>,
        weights: Array1<f64>,
        objective: Objective,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        let human_size = self.config.discretization_size_human();
        let grid = symmetric_grid(human_size);
        let model = self.get_model(
            ModelSpec::new(indices.len())
                .feature(human_size)
                .with_objective(objective),
        );
        let outputs = model.compute(
            ComputeRequest::new(&FINAL_OUTPUTS)
                .mdp(self.inference.mdp())
                .query(QueryLayout::Features {
                    indices: &indices,
                    grid: &grid,
                })
                .hypotheses(self.inference.hypotheses())
                .true_reward(true_reward)
                .weight_inits(weights.clone().insert_axis(Axis(0))),
        )?;
        Ok((Query::Feature { indices, weights }, outputs))
    }

    fn init_sampler(&self) -> WeightSampler {
        WeightSampler::new(
            self.config.weights_dist_init(),
            self.config.discretization_size(),
        )
    }

    fn require_feature_size(&self, query_size: usize) -> Result<()> {
        let dim = self.inference.feature_dim();
        if query_size > dim {
            return Err(Error::InvalidQuery {
                message: format!("cannot query {query_size} of {dim} features"),
            });
        }
        Ok(())
    }
}
