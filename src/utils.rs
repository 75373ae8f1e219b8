//! Numeric and combinatorial helpers shared by the planner, posterior engine and
//! query search.

use ndarray::{Array1, ArrayView1};
use rand::{Rng, seq::index};
use statrs::function::factorial::binomial;

/// Shannon entropy of a distribution given in log space.
pub fn entropy_from_log_probs(log_probs: ArrayView1<'_, f64>) -> f64 {
    log_probs
        .iter()
        .filter(|lp| lp.is_finite())
        .map(|&lp| -lp.exp() * lp)
        .sum::<f64>()
        .max(0.0)
}

/// Numerically stable log-sum-exp.
///
/// Returns `-inf` for an empty input or when every entry is `-inf`.
pub fn log_sum_exp<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let max = iter.clone().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum = iter.map(|v| (v - max).exp()).sum::<f64>();
    max + sum.ln()
}

/// Subtract the log-normaliser so that `exp(log_probs)` sums to one.
pub fn normalize_log_probs(log_probs: &Array1<f64>) -> Array1<f64> {
    let normaliser = log_sum_exp(log_probs.iter());
    log_probs.mapv(|lp| lp - normaliser)
}

/// Sum of `exp(log_probs)`.
pub fn total_probability(log_probs: ArrayView1<'_, f64>) -> f64 {
    log_probs.iter().map(|lp| lp.exp()).sum()
}

/// Rescale `weights` to sum to one; `None` when the total is not positive
/// or not finite.
///
/// # Examples
///
/// ```
/// use ird_query::utils::normalize_weights;
///
/// assert_eq!(normalize_weights(vec![1.0, 2.0, 1.0]), Some(vec![0.25, 0.5, 0.25]));
/// assert_eq!(normalize_weights(vec![0.0, 0.0]), None);
/// ```
pub fn normalize_weights<I>(weights: I) -> Option<Vec<f64>>
where
    I: IntoIterator<Item = f64>,
{
    let weights: Vec<f64> = weights.into_iter().collect();
    let sum: f64 = weights.iter().sum();
    if weights.is_empty() || !sum.is_finite() || sum <= 0.0 {
        return None;
    }
    Some(weights.into_iter().map(|w| w / sum).collect())
}

/// `n` evenly spaced values covering `[-1, 1]`; a single value collapses to 0.
pub fn symmetric_grid(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| -1.0 + 2.0 * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Number of size-`k` subsets of `n` items, as a float so huge counts do not overflow.
pub fn combination_count(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    binomial(n as u64, k as u64)
}

/// Lexicographic iterator over the size-`k` index subsets of `0..n`.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();
        let k = self.indices.len();

        // Advance the rightmost index that still has room.
        let mut pos = k;
        while pos > 0 {
            pos -= 1;
            if self.indices[pos] < self.n - k + pos {
                self.indices[pos] += 1;
                for j in pos + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return Some(current);
            }
        }
        self.done = true;
        Some(current)
    }
}

/// Uniformly random size-`k` subset of `0..n`, returned sorted.
pub fn random_combination<R: Rng + ?Sized>(rng: &mut R, n: usize, k: usize) -> Vec<usize> {
    let mut picked = index::sample(rng, n, k.min(n)).into_vec();
    picked.sort_unstable();
    picked
}

/// Index of the largest value; the first maximum wins.
pub fn argmax(values: ArrayView1<'_, f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}
