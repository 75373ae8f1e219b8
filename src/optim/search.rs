//! Random search over sampled candidate weights.

use ndarray::Array2;
use rand::Rng;
use tracing::debug;

use super::{BatchObjective, Optimized, Optimizer, WeightSampler};
use crate::Result;

/// Scores the starting point and a fixed population of sampled candidates in
/// one batch and keeps the lowest. The starting point wins ties.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    candidates: Vec<Array2<f64>>,
}

impl RandomSearch {
    pub fn new(candidates: Vec<Array2<f64>>) -> Self {
        Self { candidates }
    }

    /// Population of `samples` matrices of shape `rows × cols` drawn from `sampler`.
    pub fn sampled<R: Rng + ?Sized>(
        sampler: &WeightSampler,
        rng: &mut R,
        samples: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let candidates = (0..samples)
            .map(|_| sampler.sample(rng, rows, cols))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(candidates))
    }

    pub fn candidates(&self) -> &[Array2<f64>] {
        &self.candidates
    }
}

impl Optimizer for RandomSearch {
    fn minimize(&self, objective: &dyn BatchObjective, init: Array2<f64>) -> Result<Optimized> {
        let shape = init.raw_dim();
        let mut population = Vec::with_capacity(self.candidates.len() + 1);
        population.push(init);
        population.extend(
            self.candidates
                .iter()
                .filter(|candidate| candidate.raw_dim() == shape)
                .cloned(),
        );

        let values = objective.value_batch(&population)?;
        let mut best = 0;
        for (idx, &value) in values.iter().enumerate().skip(1) {
            if value < values[best] {
                best = idx;
            }
        }
        let value = values.get(best).copied().unwrap_or(f64::INFINITY);
        debug!(candidates = population.len(), best, value, "random search finished");
        let params = population.swap_remove(best);
        Ok(Optimized {
            params,
            value,
            history: values,
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{config::WeightDistribution, optim::test_support::Quadratic};

    #[test]
    fn keeps_the_best_candidate() {
        let search = RandomSearch::new(vec![array![[3.0]], array![[0.9]], array![[-2.0]]]);
        let result = search.minimize(&Quadratic::new(1.0), array![[5.0]]).unwrap();
        assert_eq!(result.params, array![[0.9]]);
        assert_eq!(result.history.len(), 4);
    }

    #[test]
    fn start_wins_ties() {
        let search = RandomSearch::new(vec![array![[-1.0]]]);
        let result = search.minimize(&Quadratic::new(0.0), array![[1.0]]).unwrap();
        assert_eq!(result.params, array![[1.0]]);
    }

    #[test]
    fn sampled_population_has_requested_shape() {
        let sampler = WeightSampler::new(WeightDistribution::Uniform, 3);
        let mut rng = StdRng::seed_from_u64(9);
        let search = RandomSearch::sampled(&sampler, &mut rng, 6, 2, 4).unwrap();
        assert_eq!(search.candidates().len(), 6);
        assert!(search.candidates().iter().all(|c| c.dim() == (2, 4)));
    }
}
