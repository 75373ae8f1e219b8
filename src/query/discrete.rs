//! Choosers whose queries are whole reward vectors.

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, Axis, concatenate};
use rand::Rng;
use tracing::{debug, warn};

use super::{
    Query, QueryChooser,
    chooser::{FINAL_OUTPUTS, search_hypotheses},
};
use crate::{
    Error, Result,
    config::FullQueryMode,
    model::{ComputeRequest, ModelOutput, ModelOutputs, ModelSpec, QueryLayout},
    optim::WeightSampler,
    posterior::{subsample_true_rewards, uniform_true_rewards},
    utils::{Combinations, combination_count, random_combination},
};

/// Increments by which a discrete query grows from empty to `query_size`,
/// `growth_rate` alternatives at a time.
///
/// A single alternative carries no information, so a first increment of one
/// becomes two.
///
/// # Examples
///
/// ```
/// use ird_query::query::growth_steps;
///
/// assert_eq!(growth_steps(4, 1), vec![2, 1, 1]);
/// assert_eq!(growth_steps(5, 2), vec![2, 2, 1]);
/// assert_eq!(growth_steps(3, 3), vec![3]);
/// ```
pub fn growth_steps(query_size: usize, growth_rate: usize) -> Vec<usize> {
    let rate = growth_rate.max(1);
    let mut steps = Vec::new();
    let mut size = 0;
    while size < query_size {
        let mut step = rate.min(query_size - size);
        if size == 0 && step == 1 {
            step = 2;
        }
        steps.push(step);
        size += step;
    }
    steps
}

impl QueryChooser {
    /// Candidate proxy combinations of `query_size`: all of them, or
    /// `num_queries_max` distinct random ones when there are more than that.
    pub fn generate_set_of_queries(&mut self, query_size: usize) -> Vec<Vec<usize>> {
        let n = self.inference.proxy_space().len();
        let cap = self.config.num_queries_max();
        let count = combination_count(n, query_size);
        if count > cap as f64 {
            warn!(
                combinations = count,
                cap, "too many proxy combinations to enumerate; sampling instead"
            );
            self.distinct_random_combinations(n, query_size, cap)
        } else {
            Combinations::new(n, query_size).collect()
        }
    }

    /// Extensions scored by one growth step. Greedy growth tries every single
    /// proxy, or at most `2n` random pairs; larger steps fall back to
    /// [`QueryChooser::generate_set_of_queries`].
    fn extension_candidates(&mut self, num_to_add: usize, greedy: bool) -> Vec<Vec<usize>> {
        let n = self.inference.proxy_space().len();
        match num_to_add {
            1 if greedy => (0..n).map(|i| vec![i]).collect(),
            2 if greedy => {
                let cap = 2 * n;
                if combination_count(n, 2) <= cap as f64 {
                    Combinations::new(n, 2).collect()
                } else {
                    self.distinct_random_combinations(n, 2, cap)
                }
            }
            _ => self.generate_set_of_queries(num_to_add),
        }
    }

    /// Callers guarantee at least `count` distinct size-`k` subsets exist.
    fn distinct_random_combinations(&mut self, n: usize, k: usize, count: usize) -> Vec<Vec<usize>> {
        let mut seen = HashSet::with_capacity(count);
        let mut combos = Vec::with_capacity(count);
        while combos.len() < count {
            let combo = random_combination(&mut self.rng, n, k);
            if seen.insert(combo.clone()) {
                combos.push(combo);
            }
        }
        combos
    }

    pub(super) fn random_discrete_query(
        &mut self,
        query_size: usize,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        self.ensure_feature_exps()?;
        let n = self.inference.proxy_space().len();
        let indices = (0..query_size).map(|_| self.rng.random_range(0..n)).collect();
        self.score_cached(indices, true_reward)
    }

    pub(super) fn full_query(&mut self, true_reward: ArrayView1<'_, f64>) -> Result<(Query, ModelOutputs)> {
        match self.config.full_query_mode() {
            FullQueryMode::No => {
                self.ensure_feature_exps()?;
                let indices = (0..self.inference.proxy_space().len()).collect();
                self.score_cached(indices, true_reward)
            }
            FullQueryMode::Yes => {
                let sample = subsample_true_rewards(
                    &mut self.rng,
                    self.inference.true_space(),
                    self.config.num_subsamples(),
                    self.config.weighting(),
                )?;
                self.score_planned(sample.rewards().clone(), true_reward)
            }
            FullQueryMode::Uniform => {
                let sample = uniform_true_rewards(
                    &mut self.rng,
                    self.inference.true_space(),
                    self.config.num_subsamples(),
                );
                self.score_planned(sample.rewards().clone(), true_reward)
            }
        }
    }

    /// Grow a query of cached proxies `growth_rate` at a time.
    pub(super) fn discrete_query(
        &mut self,
        query_size: usize,
        growth_rate: usize,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        require_discrete_size(query_size)?;
        self.ensure_feature_exps()?;
        let greedy = growth_rate < query_size;
        let mut indices = Vec::with_capacity(query_size);
        for step in growth_steps(query_size, growth_rate) {
            indices = self.extend_with_discretization(&indices, step, greedy)?;
        }
        self.score_cached(indices, true_reward)
    }

    /// Grow a query of free reward vectors, each step optimized by gradient descent.
    pub(super) fn optimized_discrete_query(
        &mut self,
        query_size: usize,
        growth_rate: usize,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        require_discrete_size(query_size)?;
        let mut query = Array2::zeros((0, self.inference.feature_dim()));
        for step in growth_steps(query_size, growth_rate) {
            query = self.extend_with_optimization(query, step)?;
        }
        self.score_planned(query, true_reward)
    }

    fn extend_with_discretization(
        &mut self,
        curr: &[usize],
        num_to_add: usize,
        greedy: bool,
    ) -> Result<Vec<usize>> {
        let extensions = self.extension_candidates(num_to_add, greedy);
        let sample = self.draw_hypotheses()?;
        let model = self.get_model(ModelSpec::new(curr.len() + num_to_add).no_planning());
        let hypotheses = search_hypotheses(&sample, &self.inference);

        let mut best: Option<(f64, Vec<usize>)> = None;
        for extension in extensions {
            let mut query = curr.to_vec();
            query.extend(extension);
            let feature_exps = self.inference.proxy_feature_exps(&query)?;
            let objective = model
                .compute(
                    ComputeRequest::new(&[ModelOutput::Objective])
                        .feature_exps(feature_exps.view())
                        .hypotheses(hypotheses),
                )?
                .objective()?;
            if best.as_ref().is_none_or(|(current, _)| objective < *current) {
                best = Some((objective, query));
            }
        }

        let (objective, query) = best.ok_or_else(|| Error::InvalidQuery {
            message: format!(
                "no way to add {num_to_add} of {} proxies to a query of size {}",
                self.inference.proxy_space().len(),
                curr.len()
            ),
        })?;
        debug!(size = query.len(), objective, "discrete query grown");
        Ok(query)
    }

    fn extend_with_optimization(&mut self, curr: Array2<f64>, num_to_add: usize) -> Result<Array2<f64>> {
        let dim = self.inference.feature_dim();
        let sample = self.draw_hypotheses()?;
        let model = self.get_model(
            ModelSpec::new(curr.nrows() + num_to_add)
                .with_unknown(num_to_add)
                .optimizing(),
        );
        let sampler = WeightSampler::new(
            self.config.weights_dist_init(),
            self.config.discretization_size(),
        );
        let inits = sampler.sample(&mut self.rng, num_to_add, dim)?;
        let hypotheses = search_hypotheses(&sample, &self.inference);

        let outputs = model.compute(
            ComputeRequest::new(&[ModelOutput::Objective, ModelOutput::WeightsToTrain])
                .mdp(self.inference.mdp())
                .query(QueryLayout::Rewards(curr.view()))
                .hypotheses(hypotheses)
                .weight_inits(inits)
                .gradient_steps(self.config.num_iters_optim()),
        )?;
        let query = concatenate(Axis(0), &[curr.view(), outputs.weights_to_train()?.view()])?;
        debug!(
            size = query.nrows(),
            objective = outputs.objective()?,
            "optimized query grown"
        );
        Ok(query)
    }

    /// Final outputs of a query of cached proxies, over the full true space.
    fn score_cached(
        &mut self,
        indices: Vec<usize>,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        let model = self.get_model(ModelSpec::new(indices.len()).no_planning());
        let feature_exps = self.inference.proxy_feature_exps(&indices)?;
        let outputs = model.compute(
            ComputeRequest::new(&FINAL_OUTPUTS)
                .feature_exps(feature_exps.view())
                .hypotheses(self.inference.hypotheses())
                .true_reward(true_reward),
        )?;
        let rewards = self.inference.proxy_space().select(&indices);
        Ok((Query::Discrete(rewards), outputs))
    }

    /// Final outputs of arbitrary reward vectors, planned on the current MDP.
    fn score_planned(
        &mut self,
        rewards: Array2<f64>,
        true_reward: ArrayView1<'_, f64>,
    ) -> Result<(Query, ModelOutputs)> {
        let model = self.get_model(ModelSpec::new(rewards.nrows()));
        let outputs = model.compute(
            ComputeRequest::new(&FINAL_OUTPUTS)
                .mdp(self.inference.mdp())
                .query(QueryLayout::Rewards(rewards.view()))
                .hypotheses(self.inference.hypotheses())
                .true_reward(true_reward),
        )?;
        Ok((Query::Discrete(rewards), outputs))
    }
}

fn require_discrete_size(query_size: usize) -> Result<()> {
    if query_size < 2 {
        return Err(Error::InvalidQuery {
            message: format!("a discrete query needs at least 2 alternatives, got {query_size}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;
    use crate::{
        config::IrdConfig,
        inference::Inference,
        mdp::BanditsMdp,
        query::Chooser,
        rewards::{ProxyRewardSpace, TrueRewardSpace},
    };

    fn chooser(num_queries_max: usize) -> QueryChooser {
        let eye = Array2::eye(4);
        let mdp = BanditsMdp::new(eye.clone(), 0).unwrap().into();
        let proxies = ProxyRewardSpace::new(eye.clone()).unwrap();
        let truth = TrueRewardSpace::uniform(eye).unwrap();
        let inference = Inference::new(mdp, proxies, truth).unwrap();
        let config = IrdConfig::builder()
            .feature_dim(4)
            .beta(2.0)
            .beta_planner(10.0)
            .subsampling(false)
            .num_queries_max(num_queries_max)
            .build()
            .unwrap();
        QueryChooser::new(config, inference, 11).unwrap()
    }

    #[test]
    fn growth_from_empty_skips_single_alternative() {
        assert_eq!(growth_steps(2, 1), vec![2]);
        assert_eq!(growth_steps(3, 1), vec![2, 1]);
        assert_eq!(growth_steps(0, 1), Vec::<usize>::new());
    }

    #[test]
    fn query_set_enumerates_below_the_cap() {
        let mut chooser = chooser(100);
        let set = chooser.generate_set_of_queries(2);
        assert_eq!(set.len(), 6);
        assert_eq!(set[0], vec![0, 1]);
    }

    #[test]
    fn query_set_samples_distinct_combinations_above_the_cap() {
        let mut chooser = chooser(4);
        let set = chooser.generate_set_of_queries(2);
        assert_eq!(set.len(), 4);
        let distinct: HashSet<_> = set.iter().cloned().collect();
        assert_eq!(distinct.len(), 4);
        assert!(set.iter().all(|combo| combo.len() == 2 && combo[0] < combo[1]));
    }

    #[test]
    fn greedy_query_reaches_requested_size() {
        let mut chooser = chooser(100);
        let truth = array![0.0, 0.0, 1.0, 0.0];
        let outcome = chooser
            .find_query(3, Chooser::GreedyDiscrete, truth.view())
            .unwrap();
        assert_eq!(outcome.query.len(), 3);
        assert!(outcome.true_entropy < 4.0_f64.ln());
    }

    #[test]
    fn single_alternative_discrete_query_is_rejected() {
        let mut chooser = chooser(100);
        let truth = array![1.0, 0.0, 0.0, 0.0];
        assert!(matches!(
            chooser.find_query(1, Chooser::Exhaustive, truth.view()),
            Err(Error::InvalidQuery { .. })
        ));
    }

    #[test]
    fn full_query_asks_every_proxy() {
        let mut chooser = chooser(100);
        let truth = array![0.0, 1.0, 0.0, 0.0];
        let outcome = chooser.find_query(2, Chooser::Full, truth.view()).unwrap();
        assert_eq!(outcome.query.len(), 4);
    }

    #[test]
    fn random_query_draws_proxies() {
        let mut chooser = chooser(100);
        let truth = array![0.0, 1.0, 0.0, 0.0];
        let outcome = chooser.find_query(3, Chooser::Random, truth.view()).unwrap();
        let Query::Discrete(rows) = &outcome.query else {
            panic!("random chooser returns a discrete query");
        };
        assert_eq!(rows.nrows(), 3);
        assert!(
            chooser
                .inference()
                .proxy_indices(rows)
                .is_ok()
        );
    }
}
