//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ird_query::{
    BanditsMdp, GridworldMdp, Inference, IrdConfig, Mdp, ProxyRewardSpace, QueryChooser,
    TrueRewardSpace, config::IrdConfigBuilder,
};
use ndarray::{Array2, array};

/// One bandit arm per feature; arm `i` yields the unit feature `e_i`.
pub fn one_hot_bandits(dim: usize) -> Mdp {
    BanditsMdp::new(Array2::eye(dim), 0)
        .expect("identity arms are valid")
        .into()
}

/// Proxies and true rewards are both the unit vectors, under a uniform prior.
pub fn one_hot_inference(dim: usize) -> Inference {
    let proxies = ProxyRewardSpace::new(Array2::eye(dim)).expect("distinct proxies");
    let truth = TrueRewardSpace::uniform(Array2::eye(dim)).expect("non-empty truth");
    Inference::new(one_hot_bandits(dim), proxies, truth).expect("matching dimensions")
}

/// Exact inference over the full space with a rational planner.
pub fn exact_config(dim: usize) -> IrdConfigBuilder {
    IrdConfig::builder()
        .feature_dim(dim)
        .beta(5.0)
        .beta_planner(f64::INFINITY)
        .subsampling(false)
}

pub fn one_hot_chooser(dim: usize, seed: u64) -> QueryChooser {
    let config = exact_config(dim).build().expect("valid config");
    QueryChooser::new(config, one_hot_inference(dim), seed).expect("matching dimensions")
}

/// 3x3 open grid starting in the centre, with goals in two opposite corners.
pub fn corner_grid() -> Mdp {
    GridworldMdp::with_distance_features(3, 3, vec![false; 9], &[(0, 0), (2, 2)], (1, 1), 1.0)
        .expect("valid grid")
        .into()
}

pub fn corner_grid_inference() -> Inference {
    let proxies = ProxyRewardSpace::new(array![
        [1.0, 0.0],
        [0.0, 1.0],
        [1.0, -1.0],
        [-1.0, 1.0],
        [0.5, 0.5]
    ])
    .expect("distinct proxies");
    let truth = TrueRewardSpace::uniform(array![
        [1.0, 0.0],
        [0.0, 1.0],
        [1.0, 1.0],
        [1.0, -1.0],
        [-1.0, 1.0],
        [-1.0, -1.0]
    ])
    .expect("non-empty truth");
    Inference::new(corner_grid(), proxies, truth).expect("matching dimensions")
}

pub fn total_mass(log_probs: &ndarray::Array1<f64>) -> f64 {
    log_probs.iter().map(|lp| lp.exp()).sum()
}
