//! Initial and search-time draws of free reward weights.

use ndarray::Array2;
use rand::{Rng, seq::IndexedRandom};
use rand_distr::{Distribution, Normal};

use crate::{Error, Result, config::WeightDistribution, utils::symmetric_grid};

#[derive(Debug, Clone, PartialEq)]
pub struct WeightSampler {
    distribution: WeightDistribution,
    grid: Vec<f64>,
}

impl WeightSampler {
    /// `discretization_size` only matters for [`WeightDistribution::Uniform`].
    pub fn new(distribution: WeightDistribution, discretization_size: usize) -> Self {
        Self {
            distribution,
            grid: symmetric_grid(discretization_size.max(1)),
        }
    }

    pub fn distribution(&self) -> WeightDistribution {
        self.distribution
    }

    /// A `rows × cols` matrix of independent draws.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, rows: usize, cols: usize) -> Result<Array2<f64>> {
        let std_dev = match self.distribution {
            WeightDistribution::Normal => 1.0,
            WeightDistribution::Normal2 => 2.0,
            WeightDistribution::Normal4 => 4.0,
            WeightDistribution::Uniform => {
                let mut draws = Array2::zeros((rows, cols));
                for w in draws.iter_mut() {
                    *w = *self.grid.choose(rng).ok_or_else(|| Error::Sampling {
                        message: "uniform weight grid is empty".to_string(),
                    })?;
                }
                return Ok(draws);
            }
        };
        let normal = Normal::new(0.0, std_dev).map_err(|e| Error::Sampling {
            message: e.to_string(),
        })?;
        Ok(Array2::from_shape_simple_fn((rows, cols), || normal.sample(&mut *rng)))
    }
}
