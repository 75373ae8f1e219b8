//! Experiment configuration and the enumerated option types it carries.
//!
//! [`IrdConfig`] is validated once when it is built (or loaded from JSON) and
//! is read-only afterwards. Every knob the planner, posterior engine and query
//! search consult lives here so a [`crate::model::ModelKey`] can be derived
//! from it without consulting ambient state.

use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment family an MDP belongs to; selects the planning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdpKind {
    /// 2-D lattice with walls, five moves per cell.
    Gridworld,
    /// Enumerated states reachable in one step from the start state.
    Bandits,
}

impl fmt::Display for MdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MdpKind::Gridworld => "gridworld",
            MdpKind::Bandits => "bandits",
        })
    }
}

impl FromStr for MdpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gridworld" | "grid" => Ok(MdpKind::Gridworld),
            "bandits" | "bandit" => Ok(MdpKind::Bandits),
            _ => Err(Error::UnknownMdpType {
                input: s.to_string(),
                expected: "gridworld, bandits".to_string(),
            }),
        }
    }
}

/// Scalar objective minimized by query search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Expected posterior entropy over the true-reward hypotheses, `H(W | A)`.
    #[default]
    Entropy,
    /// Negative entropy of the predictive answer distribution, `-H(A)`.
    QueryNegEntropy,
    /// Expected posterior variance summed over feature dimensions.
    Variance,
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Objective::Entropy => "entropy",
            Objective::QueryNegEntropy => "query_neg_entropy",
            Objective::Variance => "variance",
        })
    }
}

impl FromStr for Objective {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entropy" => Ok(Objective::Entropy),
            "query_neg_entropy" | "query-neg-entropy" => Ok(Objective::QueryNegEntropy),
            "variance" => Ok(Objective::Variance),
            _ => Err(Error::UnknownObjective {
                input: s.to_string(),
                expected: "entropy, query_neg_entropy, variance".to_string(),
            }),
        }
    }
}

/// Distribution used to draw free reward weights before optimization or search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightDistribution {
    /// Standard normal.
    Normal,
    /// Normal with standard deviation 2.
    #[default]
    Normal2,
    /// Normal with standard deviation 4.
    Normal4,
    /// Uniform over the `discretization_size` grid on `[-1, 1]`.
    Uniform,
}

impl fmt::Display for WeightDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WeightDistribution::Normal => "normal",
            WeightDistribution::Normal2 => "normal2",
            WeightDistribution::Normal4 => "normal4",
            WeightDistribution::Uniform => "uniform",
        })
    }
}

impl FromStr for WeightDistribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(WeightDistribution::Normal),
            "normal2" => Ok(WeightDistribution::Normal2),
            "normal4" => Ok(WeightDistribution::Normal4),
            "uniform" => Ok(WeightDistribution::Uniform),
            _ => Err(Error::UnknownWeightDistribution {
                input: s.to_string(),
                expected: "normal, normal2, normal4, uniform".to_string(),
            }),
        }
    }
}

/// What the `full` chooser puts in front of the human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullQueryMode {
    /// The whole proxy space.
    #[default]
    No,
    /// A prior-weighted sample of the true reward space.
    Yes,
    /// A uniform sample of the true reward space.
    Uniform,
}

impl fmt::Display for FullQueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FullQueryMode::No => "no",
            FullQueryMode::Yes => "yes",
            FullQueryMode::Uniform => "uniform",
        })
    }
}

impl FromStr for FullQueryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no" => Ok(FullQueryMode::No),
            "yes" => Ok(FullQueryMode::Yes),
            "uniform" => Ok(FullQueryMode::Uniform),
            _ => Err(Error::UnknownFullQueryMode {
                input: s.to_string(),
                expected: "no, yes, uniform".to_string(),
            }),
        }
    }
}

/// Serialize `f64::INFINITY` as the string `"inf"` and accept it back.
mod planner_beta {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "inf" | "infinity" => Ok(f64::INFINITY),
                other => other
                    .parse::<f64>()
                    .map_err(|_| D::Error::custom(format!("invalid planner beta '{text}'"))),
            },
        }
    }
}

/// Immutable configuration for one inference experiment.
///
/// # Examples
///
/// ```
/// use ird_query::config::{IrdConfig, Objective};
///
/// let config = IrdConfig::builder()
///     .feature_dim(4)
///     .beta(0.5)
///     .objective(Objective::QueryNegEntropy)
///     .build()?;
/// assert_eq!(config.feature_dim(), 4);
/// # Ok::<(), ird_query::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrdConfig {
    feature_dim: usize,
    gamma: f64,
    beta: f64,
    #[serde(with = "planner_beta")]
    beta_planner: f64,
    lr: f64,
    num_iters_optim: usize,
    discretization_size: usize,
    discretization_size_human: usize,
    value_iters: usize,
    convergence_tolerance: Option<f64>,
    objective: Objective,
    subsampling: bool,
    num_subsamples: usize,
    weighting: bool,
    weights_dist_init: WeightDistribution,
    weights_dist_search: WeightDistribution,
    only_optim_biggest: bool,
    cost_of_asking: f64,
    num_queries_max: usize,
    tie_tolerance: f64,
    weight_search_samples: usize,
    full_query_mode: FullQueryMode,
    rational_test_planner: bool,
}

impl Default for IrdConfig {
    fn default() -> Self {
        Self {
            feature_dim: 20,
            gamma: 1.0,
            beta: 0.2,
            beta_planner: 0.5,
            lr: 20.0,
            num_iters_optim: 10,
            discretization_size: 5,
            discretization_size_human: 5,
            value_iters: 15,
            convergence_tolerance: None,
            objective: Objective::Entropy,
            subsampling: true,
            num_subsamples: 10_000,
            weighting: true,
            weights_dist_init: WeightDistribution::Normal2,
            weights_dist_search: WeightDistribution::Normal2,
            only_optim_biggest: true,
            cost_of_asking: 0.0,
            num_queries_max: 2000,
            tie_tolerance: 1e-14,
            weight_search_samples: 10,
            full_query_mode: FullQueryMode::No,
            rational_test_planner: true,
        }
    }
}

impl IrdConfig {
    /// Start a builder from the default experiment settings.
    pub fn builder() -> IrdConfigBuilder {
        IrdConfigBuilder {
            config: IrdConfig::default(),
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IrdConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            operation: format!("read configuration '{}'", path.display()),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        fn invalid(message: String) -> Result<()> {
            Err(Error::InvalidConfiguration { message })
        }

        if self.feature_dim == 0 {
            return invalid("feature_dim must be at least 1".to_string());
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return invalid(format!("gamma {} must lie in (0, 1]", self.gamma));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return invalid(format!("beta {} must be positive and finite", self.beta));
        }
        if self.beta_planner.is_nan() || self.beta_planner <= 0.0 {
            return invalid(format!(
                "beta_planner {} must be positive (or inf)",
                self.beta_planner
            ));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return invalid(format!("lr {} must be positive and finite", self.lr));
        }
        if self.discretization_size == 0 || self.discretization_size_human == 0 {
            return invalid("discretization sizes must be at least 1".to_string());
        }
        if self.value_iters == 0 {
            return invalid("value_iters must be at least 1".to_string());
        }
        if let Some(tol) = self.convergence_tolerance
            && !(tol.is_finite() && tol > 0.0)
        {
            return invalid(format!("convergence_tolerance {tol} must be positive"));
        }
        if self.num_subsamples == 0 {
            return invalid("num_subsamples must be at least 1".to_string());
        }
        if !(self.cost_of_asking.is_finite() && self.cost_of_asking >= 0.0) {
            return invalid(format!(
                "cost_of_asking {} must be non-negative and finite",
                self.cost_of_asking
            ));
        }
        if self.num_queries_max == 0 {
            return invalid("num_queries_max must be at least 1".to_string());
        }
        if !(self.tie_tolerance.is_finite() && self.tie_tolerance >= 0.0) {
            return invalid(format!(
                "tie_tolerance {} must be non-negative",
                self.tie_tolerance
            ));
        }
        if self.weight_search_samples == 0 {
            return invalid("weight_search_samples must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Discount factor.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Rationality of the simulated human answering queries.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Inverse temperature of the planner's softmax policy; `inf` is rational.
    pub fn beta_planner(&self) -> f64 {
        self.beta_planner
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn num_iters_optim(&self) -> usize {
        self.num_iters_optim
    }

    /// Grid size per queried feature while searching.
    pub fn discretization_size(&self) -> usize {
        self.discretization_size
    }

    /// Grid size per queried feature in the query posed to the human.
    pub fn discretization_size_human(&self) -> usize {
        self.discretization_size_human
    }

    pub fn value_iters(&self) -> usize {
        self.value_iters
    }

    pub fn convergence_tolerance(&self) -> Option<f64> {
        self.convergence_tolerance
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn subsampling(&self) -> bool {
        self.subsampling
    }

    pub fn num_subsamples(&self) -> usize {
        self.num_subsamples
    }

    pub fn weighting(&self) -> bool {
        self.weighting
    }

    pub fn weights_dist_init(&self) -> WeightDistribution {
        self.weights_dist_init
    }

    pub fn weights_dist_search(&self) -> WeightDistribution {
        self.weights_dist_search
    }

    pub fn only_optim_biggest(&self) -> bool {
        self.only_optim_biggest
    }

    pub fn cost_of_asking(&self) -> f64 {
        self.cost_of_asking
    }

    /// Cap on the number of candidate combinations scored per search step.
    pub fn num_queries_max(&self) -> usize {
        self.num_queries_max
    }

    /// Slack used when comparing cost-adjusted objectives in feature search.
    pub fn tie_tolerance(&self) -> f64 {
        self.tie_tolerance
    }

    pub fn weight_search_samples(&self) -> usize {
        self.weight_search_samples
    }

    pub fn full_query_mode(&self) -> FullQueryMode {
        self.full_query_mode
    }

    /// Whether regret evaluation plans with a hard-max policy.
    pub fn rational_test_planner(&self) -> bool {
        self.rational_test_planner
    }
}

/// Builder for [`IrdConfig`]; validation happens in [`IrdConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct IrdConfigBuilder {
    config: IrdConfig,
}

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.config.$name = value;
            self
        }
    };
}

impl IrdConfigBuilder {
    setter!(feature_dim: usize);
    setter!(gamma: f64);
    setter!(beta: f64);
    setter!(beta_planner: f64);
    setter!(lr: f64);
    setter!(num_iters_optim: usize);
    setter!(discretization_size: usize);
    setter!(discretization_size_human: usize);
    setter!(value_iters: usize);
    setter!(objective: Objective);
    setter!(subsampling: bool);
    setter!(num_subsamples: usize);
    setter!(weighting: bool);
    setter!(weights_dist_init: WeightDistribution);
    setter!(weights_dist_search: WeightDistribution);
    setter!(only_optim_biggest: bool);
    setter!(cost_of_asking: f64);
    setter!(num_queries_max: usize);
    setter!(tie_tolerance: f64);
    setter!(weight_search_samples: usize);
    setter!(full_query_mode: FullQueryMode);
    setter!(rational_test_planner: bool);

    /// Stop value iteration and occupancy accumulation early once deltas fall below `tol`.
    pub fn convergence_tolerance(mut self, tol: f64) -> Self {
        self.config.convergence_tolerance = Some(tol);
        self
    }

    pub fn build(self) -> Result<IrdConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
