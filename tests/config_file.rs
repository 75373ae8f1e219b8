use std::io::Write;

use ird_query::{Error, FullQueryMode, IrdConfig, Objective, WeightDistribution};
use tempfile::NamedTempFile;

#[test]
fn configuration_loads_from_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "feature_dim": 6,
            "beta": 0.5,
            "beta_planner": "inf",
            "objective": "query_neg_entropy",
            "weights_dist_init": "normal4",
            "full_query_mode": "uniform",
            "tie_tolerance": 1e-10
        }}"#
    )
    .unwrap();

    let config = IrdConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.feature_dim(), 6);
    assert!(config.beta_planner().is_infinite());
    assert_eq!(config.objective(), Objective::QueryNegEntropy);
    assert_eq!(config.weights_dist_init(), WeightDistribution::Normal4);
    assert_eq!(config.full_query_mode(), FullQueryMode::Uniform);
    assert_eq!(config.tie_tolerance(), 1e-10);
    assert_eq!(config.num_subsamples(), 10_000);
}

#[test]
fn configuration_round_trips_through_json() {
    let config = IrdConfig::builder()
        .feature_dim(3)
        .beta_planner(f64::INFINITY)
        .convergence_tolerance(1e-8)
        .build()
        .unwrap();
    let json = config.to_json_string().unwrap();
    assert_eq!(IrdConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn invalid_file_contents_are_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "gamma": 0.0 }}"#).unwrap();
    assert!(matches!(
        IrdConfig::from_json_file(file.path()),
        Err(Error::InvalidConfiguration { .. })
    ));

    assert!(matches!(
        IrdConfig::from_json_str(r#"{ "objective": "regret" }"#),
        Err(Error::Serialization(_))
    ));
    assert!(matches!(
        IrdConfig::from_json_file("/nonexistent/ird.json"),
        Err(Error::Io { ref operation, .. }) if operation.contains("/nonexistent/ird.json")
    ));
}
