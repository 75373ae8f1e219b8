mod common;

use common::{corner_grid, corner_grid_inference, exact_config};
use ird_query::{IrdConfig, RegretEvaluator, regret::normalized_reward_diff};
use ndarray::array;

fn evaluator() -> RegretEvaluator {
    let config = IrdConfig::builder()
        .feature_dim(2)
        .gamma(0.9)
        .value_iters(20)
        .rational_test_planner(true)
        .build()
        .unwrap();
    RegretEvaluator::new(&config)
}

#[test]
fn planning_for_the_truth_has_no_regret() {
    let evaluator = evaluator();
    let grid = corner_grid();
    for truth in [array![1.0, 0.0], array![0.0, 1.0], array![0.4, -0.7]] {
        let regret = evaluator
            .compute_regret(&grid, truth.view(), truth.view())
            .unwrap();
        assert_eq!(regret, 0.0);
    }
}

#[test]
fn rational_test_planner_ignores_training_beta() {
    let config = exact_config(2).beta_planner(0.5).build().unwrap();
    assert!(RegretEvaluator::new(&config).settings().beta_planner.is_infinite());
}

#[test]
fn prior_regret_is_non_negative() {
    let regret = evaluator()
        .expected_regret_from_prior(&corner_grid_inference())
        .unwrap();
    assert!(regret >= -1e-9);
}

#[test]
fn identical_directions_have_no_reward_diff() {
    let post_avg = array![0.2, 0.4, 0.9];
    assert!(normalized_reward_diff(post_avg.view(), post_avg.view()) < 1e-12);
}
