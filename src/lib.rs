//! Active query selection for inverse reward design
//!
//! This crate provides:
//! - Batched Boltzmann-rational planners for gridworld and bandit environments
//! - A Bayesian posterior engine over a space of true reward hypotheses
//! - Discrete, gradient-optimized and feature-based query selection strategies
//! - Pluggable optimizers for the free reward weights of a query
//! - Regret evaluation of the posterior mean on test environments

pub mod config;
pub mod error;
pub mod inference;
pub mod mdp;
pub mod model;
pub mod optim;
pub mod planner;
pub mod posterior;
pub mod query;
pub mod regret;
pub mod rewards;
pub mod utils;

pub use config::{FullQueryMode, IrdConfig, MdpKind, Objective, WeightDistribution};
pub use error::{Error, Result};
pub use inference::Inference;
pub use mdp::{BanditsMdp, GridworldMdp, Mdp};
pub use model::{Model, ModelCache, ModelKey, ModelOutput, ModelSpec};
pub use planner::{Planner, PlannerSettings};
pub use posterior::PosteriorEngine;
pub use query::{Chooser, Query, QueryChooser, QueryOutcome};
pub use regret::RegretEvaluator;
pub use rewards::{ProxyRewardSpace, RewardVector, TrueRewardSpace};
