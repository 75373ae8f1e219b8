//! Error types for the IRD query crate

use thiserror::Error;

/// Main error type for the IRD query crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown MDP type '{input}'. Expected one of: {expected}")]
    UnknownMdpType { input: String, expected: String },

    #[error("unknown query chooser '{input}'. Expected one of: {expected}")]
    UnknownChooser { input: String, expected: String },

    #[error("unknown objective '{input}'. Expected one of: {expected}")]
    UnknownObjective { input: String, expected: String },

    #[error("unknown weight distribution '{input}'. Expected one of: {expected}")]
    UnknownWeightDistribution { input: String, expected: String },

    #[error("unknown full-query subsampling mode '{input}'. Expected one of: {expected}")]
    UnknownFullQueryMode { input: String, expected: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    #[error("proxy reward {reward:?} appears more than once in the proxy space")]
    DuplicateProxy { reward: Vec<f64> },

    #[error("reward {reward:?} is not part of the proxy space")]
    UnknownProxy { reward: Vec<f64> },

    #[error("log-prior is not normalized: probabilities sum to {sum}")]
    UnnormalizedPrior { sum: f64 },

    #[error("{space} reward space is empty")]
    EmptyRewardSpace { space: String },

    #[error("model input '{input}' is required for this computation")]
    MissingInput { input: String },

    #[error("model output '{output}' was not requested")]
    MissingOutput { output: String },

    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("invalid MDP: {message}")]
    InvalidMdp { message: String },

    #[error("planner for '{model}' cannot plan on a '{mdp}' MDP")]
    PlannerMismatch { model: String, mdp: String },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot sample from weights: {message}")]
    Sampling { message: String },
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl From<rand::distr::weighted::Error> for Error {
    fn from(source: rand::distr::weighted::Error) -> Self {
        Error::Sampling {
            message: source.to_string(),
        }
    }
}
