use shrinkage_models::{
    CategoricalSpec, PreprocessError, SimulationConfig, SimulationError, simulate_seeded,
    standardize_dataset,
};

fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    let n = f64::from(u32::try_from(values.len()).unwrap_or(u32::MAX));
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

#[test]
fn same_seed_gives_byte_identical_datasets() {
    let config = SimulationConfig::default();
    let first = simulate_seeded(&config, 200, 404).expect("simulate");
    let second = simulate_seeded(&config, 200, 404).expect("simulate");
    let other = simulate_seeded(&config, 200, 405).expect("simulate");

    let first_json = serde_json::to_vec(&first).expect("serialize");
    assert_eq!(first_json, serde_json::to_vec(&second).expect("serialize"));
    assert_ne!(first_json, serde_json::to_vec(&other).expect("serialize"));
}

#[test]
fn standardized_columns_have_zero_mean_and_unit_sd() {
    let config = SimulationConfig::default();
    let raw = simulate_seeded(&config, 200, 11).expect("simulate");
    let (standardized, transforms) =
        standardize_dataset(&raw, &config.outcome.name).expect("standardize");

    assert_eq!(transforms.len(), config.continuous.len());
    for (name, _) in &transforms {
        let values = standardized.continuous(name).expect("continuous column");
        let (mean, sd) = mean_and_sd(values);
        assert!(mean.abs() < 1e-10, "{name}: mean {mean}");
        assert!((sd - 1.0).abs() < 1e-10, "{name}: sd {sd}");
    }
    assert_eq!(
        standardized.continuous(&config.outcome.name).expect("outcome"),
        raw.continuous(&config.outcome.name).expect("outcome")
    );
}

#[test]
fn single_row_fails_fast_at_standardization() {
    let config = SimulationConfig::default();
    let raw = simulate_seeded(&config, 1, 404).expect("one row simulates");
    let err = standardize_dataset(&raw, &config.outcome.name).unwrap_err();
    assert!(matches!(err, PreprocessError::InsufficientData { found: 1, .. }));
}

#[test]
fn misconfigured_probabilities_fail_before_drawing() {
    let mut config = SimulationConfig::default();
    config.categorical[1] = CategoricalSpec::new("sport", &[("no", 0.6), ("yes", 0.3)]);
    let err = simulate_seeded(&config, 10, 1).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::ProbabilitiesDoNotSumToOne { ref column, .. } if column == "sport"
    ));
    assert!(err.to_string().contains("sport"));
}
