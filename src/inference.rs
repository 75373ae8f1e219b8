//! State of one inference run: the environment, both reward spaces, the
//! running prior and the proxies' cached feature expectations.

use ndarray::{Array1, Array2, Axis};

use crate::{
    Error, Result,
    mdp::Mdp,
    posterior::Hypotheses,
    rewards::{ProxyRewardSpace, RewardVector, TrueRewardSpace},
};

#[derive(Debug, Clone)]
pub struct Inference {
    mdp: Mdp,
    proxy_space: ProxyRewardSpace,
    true_space: TrueRewardSpace,
    initial_log_prior: Array1<f64>,
    feature_exp_matrix: Option<Array2<f64>>,
}

impl Inference {
    /// # Errors
    ///
    /// Fails if the two reward spaces and the MDP disagree on the feature dimension.
    pub fn new(mdp: Mdp, proxy_space: ProxyRewardSpace, true_space: TrueRewardSpace) -> Result<Self> {
        let dim = mdp.feature_dim();
        for (context, got) in [
            ("proxy reward width", proxy_space.feature_dim()),
            ("true reward width", true_space.feature_dim()),
        ] {
            if got != dim {
                return Err(Error::DimensionMismatch {
                    context: context.to_string(),
                    expected: dim,
                    got,
                });
            }
        }
        let initial_log_prior = true_space.log_prior().clone();
        Ok(Self {
            mdp,
            proxy_space,
            true_space,
            initial_log_prior,
            feature_exp_matrix: None,
        })
    }

    pub fn mdp(&self) -> &Mdp {
        &self.mdp
    }

    /// Swap the environment. Cached feature expectations belong to the old
    /// one and are dropped.
    pub fn set_mdp(&mut self, mdp: Mdp) -> Result<()> {
        if mdp.feature_dim() != self.mdp.feature_dim() {
            return Err(Error::DimensionMismatch {
                context: "replacement MDP feature dimension".to_string(),
                expected: self.mdp.feature_dim(),
                got: mdp.feature_dim(),
            });
        }
        self.mdp = mdp;
        self.feature_exp_matrix = None;
        Ok(())
    }

    pub fn feature_dim(&self) -> usize {
        self.mdp.feature_dim()
    }

    pub fn proxy_space(&self) -> &ProxyRewardSpace {
        &self.proxy_space
    }

    /// Replace the proxy space; its cached feature expectations are dropped.
    pub fn set_proxy_space(&mut self, proxy_space: ProxyRewardSpace) -> Result<()> {
        if proxy_space.feature_dim() != self.feature_dim() {
            return Err(Error::DimensionMismatch {
                context: "proxy reward width".to_string(),
                expected: self.feature_dim(),
                got: proxy_space.feature_dim(),
            });
        }
        self.proxy_space = proxy_space;
        self.feature_exp_matrix = None;
        Ok(())
    }

    pub fn true_space(&self) -> &TrueRewardSpace {
        &self.true_space
    }

    pub fn log_prior(&self) -> &Array1<f64> {
        self.true_space.log_prior()
    }

    pub fn prior(&self) -> Array1<f64> {
        self.log_prior().mapv(f64::exp)
    }

    /// The full true space under the current prior.
    pub fn hypotheses(&self) -> Hypotheses<'_> {
        Hypotheses::from(&self.true_space)
    }

    /// Adopt a posterior as the prior for the next query.
    pub fn update_prior(&mut self, log_posterior: Array1<f64>) -> Result<()> {
        self.true_space.set_log_prior(log_posterior)
    }

    /// Return to the prior the run started with.
    pub fn reset_prior(&mut self) -> Result<()> {
        self.true_space.set_log_prior(self.initial_log_prior.clone())
    }

    /// Prior-weighted mean of the true rewards.
    pub fn prior_avg(&self) -> RewardVector {
        self.true_space.mean_reward()
    }

    pub fn feature_exp_matrix(&self) -> Option<&Array2<f64>> {
        self.feature_exp_matrix.as_ref()
    }

    /// Store the proxies' feature expectations, one row per proxy index.
    pub fn set_feature_exp_matrix(&mut self, matrix: Array2<f64>) -> Result<()> {
        if matrix.nrows() != self.proxy_space.len() {
            return Err(Error::DimensionMismatch {
                context: "cached feature expectation rows".to_string(),
                expected: self.proxy_space.len(),
                got: matrix.nrows(),
            });
        }
        if matrix.ncols() != self.feature_dim() {
            return Err(Error::DimensionMismatch {
                context: "cached feature expectation width".to_string(),
                expected: self.feature_dim(),
                got: matrix.ncols(),
            });
        }
        self.feature_exp_matrix = Some(matrix);
        Ok(())
    }

    /// Cached feature expectations of the proxies at `indices`, in order.
    pub fn proxy_feature_exps(&self, indices: &[usize]) -> Result<Array2<f64>> {
        let matrix = self.feature_exp_matrix.as_ref().ok_or_else(|| Error::MissingInput {
            input: "feature_exp_matrix".to_string(),
        })?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= matrix.nrows()) {
            return Err(Error::InvalidQuery {
                message: format!("proxy index {bad} out of range ({} proxies)", matrix.nrows()),
            });
        }
        Ok(matrix.select(Axis(0), indices))
    }

    /// Stable indices of the given proxy rewards.
    pub fn proxy_indices(&self, rewards: &Array2<f64>) -> Result<Vec<usize>> {
        rewards
            .outer_iter()
            .map(|row| {
                self.proxy_space
                    .index_of(row)
                    .ok_or_else(|| Error::UnknownProxy { reward: row.to_vec() })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{mdp::BanditsMdp, utils::total_probability};

    fn inference() -> Inference {
        let mdp = BanditsMdp::new(array![[1.0, 0.0], [0.0, 1.0]], 0).unwrap().into();
        let proxies = ProxyRewardSpace::new(array![[1.0, 0.0], [0.0, 1.0]]).unwrap();
        let truth = TrueRewardSpace::uniform(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]).unwrap();
        Inference::new(mdp, proxies, truth).unwrap()
    }

    #[test]
    fn prior_updates_and_resets() {
        let mut inference = inference();
        let posterior = array![0.8_f64.ln(), 0.1_f64.ln(), 0.1_f64.ln()];
        inference.update_prior(posterior).unwrap();
        assert!((inference.prior()[0] - 0.8).abs() < 1e-12);
        assert!((total_probability(inference.log_prior().view()) - 1.0).abs() < 1e-12);
        inference.reset_prior().unwrap();
        assert!((inference.prior()[0] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn prior_avg_is_prior_weighted() {
        let inference = inference();
        let avg = inference.prior_avg();
        assert!((avg[0] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn cached_rows_are_required_and_checked() {
        let mut inference = inference();
        assert!(matches!(
            inference.proxy_feature_exps(&[0]),
            Err(Error::MissingInput { .. })
        ));
        assert!(inference.set_feature_exp_matrix(Array2::zeros((3, 2))).is_err());
        inference
            .set_feature_exp_matrix(array![[0.9, 0.1], [0.2, 0.8]])
            .unwrap();
        assert_eq!(
            inference.proxy_feature_exps(&[1, 0]).unwrap(),
            array![[0.2, 0.8], [0.9, 0.1]]
        );
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mdp = BanditsMdp::new(array![[1.0, 0.0]], 0).unwrap().into();
        let proxies = ProxyRewardSpace::new(array![[1.0, 0.0, 0.0]]).unwrap();
        let truth = TrueRewardSpace::uniform(array![[1.0, 0.0]]).unwrap();
        assert!(Inference::new(mdp, proxies, truth).is_err());
    }

    #[test]
    fn unknown_proxy_lookup_fails() {
        let inference = inference();
        assert!(matches!(
            inference.proxy_indices(&array![[0.5, 0.5]]),
            Err(Error::UnknownProxy { .. })
        ));
    }
}
