//! End-to-end checks of the naive-vs-horseshoe study.

use shrinkage_models::{
    ConvergencePolicy, FitOptions, Formula, SamplerConfig, SimulationConfig, StudyConfig,
    fit, run_study, simulate_seeded, standardize_dataset,
};

const NULL_PREDICTORS: [&str; 8] = [
    "education_years",
    "pet_count",
    "weekly_drinks",
    "daily_smoking",
    "weight",
    "height",
    "hours_seated",
    "test_score",
];

/// Band around zero, in brain-volume units, that counts as "shrunk away".
const NULL_BAND: f64 = 2.5;

#[test]
fn seed_404_horseshoe_pulls_null_predictors_to_zero() {
    let report = run_study(&StudyConfig::default()).expect("study should succeed");

    assert_eq!(report.dataset.n_rows(), 200);
    assert_eq!(report.comparison.len(), 2);
    assert!(report.naive.loo().is_some() && report.horseshoe.loo().is_some());

    // education_years and weight carry no effect but pick up a few units of
    // noise under flat-ish Normal priors
    for name in ["education_years", "weight"] {
        let naive = report.naive.coefficient(name).expect("coefficient").mean;
        let horseshoe = report.horseshoe.coefficient(name).expect("coefficient").mean;
        assert!(
            horseshoe.abs() < NULL_BAND,
            "{name}: horseshoe estimate {horseshoe} outside ±{NULL_BAND}"
        );
        assert!(
            naive.abs() > NULL_BAND,
            "{name}: naive estimate {naive} inside ±{NULL_BAND}"
        );
    }

    let shrinkage = report.shrinkage();
    let (naive_total, horseshoe_total) = shrinkage
        .iter()
        .filter(|row| NULL_PREDICTORS.contains(&row.name.as_str()))
        .fold((0.0, 0.0), |(naive, horseshoe), row| {
            (naive + row.naive.mean.abs(), horseshoe + row.horseshoe.mean.abs())
        });
    assert!(
        horseshoe_total < naive_total,
        "horseshoe {horseshoe_total} vs naive {naive_total}"
    );

    let age = report.horseshoe.coefficient("age").expect("age");
    assert!(age.excludes_zero(), "age is causal: {age:?}");
    let male = report.horseshoe.coefficient("sexmale").expect("sexmale");
    assert!(male.q025 > 0.0, "sex is causal: {male:?}");
}

#[test]
fn horseshoe_shrinks_null_predictors_across_seeds() {
    let simulation = SimulationConfig::default();
    let formula = Formula::parse("brain_volume ~ .").expect("formula");
    let defaults = StudyConfig::default();
    let sampler = SamplerConfig {
        chains: 2,
        iterations: 600,
        warmup: 300,
        ..SamplerConfig::default()
    };
    let lenient = ConvergencePolicy {
        enforce: false,
        ..ConvergencePolicy::default()
    };
    let options = |priors| FitOptions {
        sampler,
        convergence: lenient,
        ..FitOptions::new(priors)
    };

    let seeds = 0..10_u64;
    let mut shrunk = 0;
    for seed in seeds.clone() {
        let raw = simulate_seeded(&simulation, 200, 1_000 + seed).expect("simulate");
        let (data, _) = standardize_dataset(&raw, "brain_volume").expect("standardize");
        let naive = fit("naive", &data, &formula, &options(defaults.naive_priors)).expect("naive");
        let horseshoe =
            fit("horseshoe", &data, &formula, &options(defaults.horseshoe_priors)).expect("hs");

        let distance = |model: &shrinkage_models::FittedModel| {
            NULL_PREDICTORS
                .iter()
                .filter_map(|name| model.coefficient(name))
                .map(|summary| summary.mean.abs())
                .sum::<f64>()
        };
        if distance(&horseshoe) < distance(&naive) {
            shrunk += 1;
        }
    }
    // one-sided sign test: 9 of 10 has p < 0.011 under no effect
    assert!(shrunk >= 9, "horseshoe closer to zero on {shrunk} of {} seeds", seeds.count());
}

#[test]
fn repeated_runs_are_bit_identical() {
    let config = StudyConfig {
        rows: 80,
        formula: "brain_volume ~ age + sex + pet_count + test_score".to_string(),
        sampler: SamplerConfig {
            chains: 2,
            iterations: 400,
            warmup: 200,
            ..SamplerConfig::default()
        },
        convergence: ConvergencePolicy {
            enforce: false,
            ..ConvergencePolicy::default()
        },
        ..StudyConfig::default()
    };
    let first = run_study(&config).expect("first run");
    let second = run_study(&config).expect("second run");

    for (a, b) in [(&first.naive, &second.naive), (&first.horseshoe, &second.horseshoe)] {
        assert_eq!(
            serde_json::to_vec(a).expect("serialize"),
            serde_json::to_vec(b).expect("serialize")
        );
    }
    assert_eq!(first.comparison, second.comparison);
}
