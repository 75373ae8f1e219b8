//! Gradient descent with central finite differences.

use ndarray::Array2;
use tracing::debug;

use super::{BatchObjective, Optimized, Optimizer};
use crate::Result;

/// Step used by the central-difference stencil.
pub const DEFAULT_FD_STEP: f64 = 1e-4;

/// Plain gradient descent, `x ← x - lr · ∇f(x)`, for a fixed number of steps.
///
/// Each step evaluates the current point and the `2·P` perturbed points of
/// the stencil as one batch. The point reached after the last step is
/// returned even if an earlier one scored lower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
    lr: f64,
    steps: usize,
    fd_step: f64,
}

impl GradientDescent {
    pub fn new(lr: f64, steps: usize) -> Self {
        Self {
            lr,
            steps,
            fd_step: DEFAULT_FD_STEP,
        }
    }

    pub fn with_fd_step(mut self, fd_step: f64) -> Self {
        self.fd_step = fd_step;
        self
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Current value and central-difference gradient at `params`.
    fn value_and_gradient(
        &self,
        objective: &dyn BatchObjective,
        params: &Array2<f64>,
    ) -> Result<(f64, Array2<f64>)> {
        let num_params = params.len();
        let mut batch = Vec::with_capacity(2 * num_params + 1);
        batch.push(params.clone());
        for k in 0..num_params {
            for sign in [1.0, -1.0] {
                let mut shifted = params.clone();
                if let Some(x) = shifted.iter_mut().nth(k) {
                    *x += sign * self.fd_step;
                }
                batch.push(shifted);
            }
        }
        let values = objective.value_batch(&batch)?;
        let current = values.first().copied().unwrap_or(f64::INFINITY);
        let mut gradient = Array2::zeros(params.raw_dim());
        for (k, g) in gradient.iter_mut().enumerate() {
            let plus = values.get(1 + 2 * k).copied().unwrap_or(current);
            let minus = values.get(2 + 2 * k).copied().unwrap_or(current);
            *g = (plus - minus) / (2.0 * self.fd_step);
        }
        Ok((current, gradient))
    }
}

impl Optimizer for GradientDescent {
    fn minimize(&self, objective: &dyn BatchObjective, init: Array2<f64>) -> Result<Optimized> {
        let mut params = init;
        let mut history = Vec::with_capacity(self.steps + 1);
        if params.is_empty() {
            let value = objective.value(&params)?;
            history.push(value);
            return Ok(Optimized {
                params,
                value,
                history,
            });
        }

        for step in 0..self.steps {
            let (value, gradient) = self.value_and_gradient(objective, &params)?;
            history.push(value);
            debug!(step, value, "gradient step");
            params.scaled_add(-self.lr, &gradient);
        }
        let value = objective.value(&params)?;
        history.push(value);
        debug!(steps = self.steps, value, "gradient descent finished");
        Ok(Optimized {
            params,
            value,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::optim::test_support::Quadratic;

    #[test]
    fn descends_a_quadratic_bowl() {
        let objective = Quadratic::new(1.5);
        let result = GradientDescent::new(0.25, 20)
            .minimize(&objective, array![[0.0, 3.0]])
            .unwrap();
        assert!(result.value < 1e-6);
        assert!(result.params.iter().all(|x| (x - 1.5).abs() < 1e-3));
        assert_eq!(result.history.len(), 21);
    }

    #[test]
    fn one_batch_per_step_plus_final_evaluation() {
        let objective = Quadratic::new(0.0);
        GradientDescent::new(0.1, 4)
            .minimize(&objective, array![[1.0, 2.0, 3.0]])
            .unwrap();
        assert_eq!(objective.calls.get(), 5);
    }

    #[test]
    fn zero_steps_only_evaluates_the_start() {
        let objective = Quadratic::new(0.0);
        let result = GradientDescent::new(1.0, 0)
            .minimize(&objective, array![[2.0]])
            .unwrap();
        assert_eq!(result.params, array![[2.0]]);
        assert_eq!(result.value, 4.0);
    }
}
