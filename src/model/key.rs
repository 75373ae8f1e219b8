//! Cache keys for configured models.

use crate::{
    config::{IrdConfig, MdpKind, Objective},
    mdp::Mdp,
    planner::PlannerSettings,
};

/// Shape of the model a caller needs, on top of the experiment configuration.
///
/// # Examples
///
/// ```
/// use ird_query::model::ModelSpec;
///
/// let spec = ModelSpec::new(3).with_unknown(1).optimizing();
/// assert_eq!(spec.query_size, 3);
/// assert!(spec.discrete && spec.optimize);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    /// Number of alternatives, or of queried features for a feature query.
    pub query_size: usize,
    /// Grid size per queried feature; only read by feature queries.
    pub discretization_size: usize,
    /// Rows of a discrete query that are free parameters.
    pub num_unknown: Option<usize>,
    /// Whole reward vectors (`true`) or feature indices plus weights (`false`).
    pub discrete: bool,
    pub optimize: bool,
    /// Skip dynamics and score supplied feature expectations only.
    pub no_planning: bool,
    /// Falls back to the configured objective when unset.
    pub objective: Option<Objective>,
}

impl ModelSpec {
    pub fn new(query_size: usize) -> Self {
        Self {
            query_size,
            discretization_size: 2,
            num_unknown: None,
            discrete: true,
            optimize: false,
            no_planning: false,
            objective: None,
        }
    }

    pub fn no_planning(mut self) -> Self {
        self.no_planning = true;
        self
    }

    pub fn with_unknown(mut self, num_unknown: usize) -> Self {
        self.num_unknown = Some(num_unknown);
        self
    }

    /// Feature query with `discretization_size` values per queried feature.
    pub fn feature(mut self, discretization_size: usize) -> Self {
        self.discrete = false;
        self.discretization_size = discretization_size;
        self
    }

    pub fn optimizing(mut self) -> Self {
        self.optimize = true;
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = Some(objective);
        self
    }
}

/// Every field that changes what a model computes.
///
/// Floats are stored by bit pattern so the key can be hashed; two configs
/// that differ only in the last bit of `gamma` get distinct models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub no_planning: bool,
    pub mdp_kind: MdpKind,
    pub feature_dim: usize,
    gamma_bits: u64,
    pub query_size: usize,
    pub discretization_size: usize,
    pub num_unknown: Option<usize>,
    beta_bits: u64,
    beta_planner_bits: u64,
    lr_bits: u64,
    pub discrete: bool,
    pub optimize: bool,
    pub height: Option<usize>,
    pub width: Option<usize>,
    pub value_iters: usize,
    convergence_bits: Option<u64>,
    pub objective: Objective,
}

impl ModelKey {
    pub fn new(config: &IrdConfig, mdp: &Mdp, spec: ModelSpec) -> Self {
        let (height, width) = mdp.grid_dims().unzip();
        Self {
            no_planning: spec.no_planning,
            mdp_kind: mdp.kind(),
            feature_dim: config.feature_dim(),
            gamma_bits: config.gamma().to_bits(),
            query_size: spec.query_size,
            discretization_size: spec.discretization_size,
            num_unknown: spec.num_unknown,
            beta_bits: config.beta().to_bits(),
            beta_planner_bits: config.beta_planner().to_bits(),
            lr_bits: config.lr().to_bits(),
            discrete: spec.discrete,
            optimize: spec.optimize,
            height,
            width,
            value_iters: config.value_iters(),
            convergence_bits: config.convergence_tolerance().map(f64::to_bits),
            objective: spec.objective.unwrap_or(config.objective()),
        }
    }

    pub fn gamma(&self) -> f64 {
        f64::from_bits(self.gamma_bits)
    }

    pub fn beta(&self) -> f64 {
        f64::from_bits(self.beta_bits)
    }

    pub fn beta_planner(&self) -> f64 {
        f64::from_bits(self.beta_planner_bits)
    }

    pub fn lr(&self) -> f64 {
        f64::from_bits(self.lr_bits)
    }

    pub fn convergence_tolerance(&self) -> Option<f64> {
        self.convergence_bits.map(f64::from_bits)
    }

    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            gamma: self.gamma(),
            beta_planner: self.beta_planner(),
            value_iters: self.value_iters,
            convergence_tolerance: self.convergence_tolerance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::mdp::BanditsMdp;

    fn mdp() -> Mdp {
        BanditsMdp::new(array![[1.0, 0.0], [0.0, 1.0]], 0).unwrap().into()
    }

    #[test]
    fn identical_inputs_give_equal_keys() {
        let config = IrdConfig::builder().feature_dim(2).build().unwrap();
        let a = ModelKey::new(&config, &mdp(), ModelSpec::new(2));
        let b = ModelKey::new(&config, &mdp(), ModelSpec::new(2));
        assert_eq!(a, b);
    }

    #[test]
    fn any_field_change_gives_a_new_key() {
        let config = IrdConfig::builder().feature_dim(2).build().unwrap();
        let base = ModelKey::new(&config, &mdp(), ModelSpec::new(2));
        assert_ne!(base, ModelKey::new(&config, &mdp(), ModelSpec::new(3)));
        assert_ne!(base, ModelKey::new(&config, &mdp(), ModelSpec::new(2).no_planning()));
        let other = IrdConfig::builder().feature_dim(2).beta(0.3).build().unwrap();
        assert_ne!(base, ModelKey::new(&other, &mdp(), ModelSpec::new(2)));
    }

    #[test]
    fn float_fields_round_trip() {
        let config = IrdConfig::builder()
            .feature_dim(2)
            .gamma(0.95)
            .beta_planner(f64::INFINITY)
            .build()
            .unwrap();
        let key = ModelKey::new(&config, &mdp(), ModelSpec::new(1));
        assert_eq!(key.gamma(), 0.95);
        assert!(key.beta_planner().is_infinite());
        assert_eq!(key.height, None);
    }
}
