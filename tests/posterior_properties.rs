mod common;

use common::{exact_config, one_hot_bandits, one_hot_chooser, one_hot_inference, total_mass};
use ird_query::{
    Chooser, Model, ModelKey, ModelSpec, QueryChooser,
    model::{ComputeRequest, ModelOutput},
    posterior::Hypotheses,
    rewards::PRIOR_TOLERANCE,
};
use ndarray::{Array2, array};

#[test]
fn prior_stays_normalized_across_updates() {
    let mut chooser = one_hot_chooser(4, 1);
    assert!((total_mass(chooser.inference().log_prior()) - 1.0).abs() < PRIOR_TOLERANCE);

    let truth = array![0.0, 0.0, 1.0, 0.0];
    for _ in 0..3 {
        let outcome = chooser
            .find_query(2, Chooser::GreedyDiscrete, truth.view())
            .unwrap();
        assert!((total_mass(&outcome.true_log_posterior) - 1.0).abs() < PRIOR_TOLERANCE);
        chooser
            .inference_mut()
            .update_prior(outcome.true_log_posterior)
            .unwrap();
        assert!((total_mass(chooser.inference().log_prior()) - 1.0).abs() < PRIOR_TOLERANCE);
    }

    chooser.inference_mut().reset_prior().unwrap();
    assert!((chooser.inference().prior()[0] - 0.25).abs() < 1e-12);
}

#[test]
fn empty_query_keeps_the_prior() {
    let mut chooser = one_hot_chooser(5, 2);
    let truth = array![0.0, 1.0, 0.0, 0.0, 0.0];
    for strategy in [Chooser::Exhaustive, Chooser::Random, Chooser::FeatureEntropy] {
        let outcome = chooser.find_query(0, strategy, truth.view()).unwrap();
        assert!(outcome.query.is_empty());
        assert!((outcome.true_entropy - 5.0_f64.ln()).abs() < 1e-12);
        assert_eq!(&outcome.true_log_posterior, chooser.inference().log_prior());
        assert!(
            outcome
                .post_avg
                .iter()
                .all(|&w| (w - 0.2).abs() < 1e-12)
        );
    }
}

#[test]
fn query_order_does_not_change_the_objective() {
    let config = exact_config(3).beta(1.5).build().unwrap();
    let mdp = one_hot_bandits(3);
    let inference = one_hot_inference(3);
    let model = Model::new(ModelKey::new(&config, &mdp, ModelSpec::new(2).no_planning()));
    let hypotheses = Hypotheses::from(inference.true_space());

    let score = |feature_exps: Array2<f64>| {
        model
            .compute(
                ComputeRequest::new(&[ModelOutput::Objective])
                    .feature_exps(feature_exps.view())
                    .hypotheses(hypotheses),
            )
            .unwrap()
            .objective()
            .unwrap()
    };
    let forward = score(array![[0.9, 0.1, 0.0], [0.2, 0.3, 0.5]]);
    let backward = score(array![[0.2, 0.3, 0.5], [0.9, 0.1, 0.0]]);
    assert!((forward - backward).abs() < 1e-12);
}

#[test]
fn full_query_over_unit_rewards_identifies_the_truth() {
    let truth = array![1.0, 0.0, 0.0];

    let soft = exact_config(3).beta(1.0).build().unwrap();
    let mut chooser = QueryChooser::new(soft, one_hot_inference(3), 3).unwrap();
    let outcome = chooser.find_query(3, Chooser::Full, truth.view()).unwrap();
    assert_eq!(outcome.query.len(), 3);
    assert!(outcome.true_entropy < 3.0_f64.ln());
    assert!(outcome.true_log_posterior[0] > outcome.true_log_posterior[1]);

    let sharp = exact_config(3).beta(50.0).build().unwrap();
    let mut chooser = QueryChooser::new(sharp, one_hot_inference(3), 3).unwrap();
    let outcome = chooser.find_query(3, Chooser::Full, truth.view()).unwrap();
    assert!(outcome.true_entropy < 1e-9);
    assert!((outcome.post_avg[0] - 1.0).abs() < 1e-9);

    let empty = chooser
        .find_query(0, Chooser::Exhaustive, truth.view())
        .unwrap();
    assert!((empty.true_entropy - 3.0_f64.ln()).abs() < 1e-12);
}
