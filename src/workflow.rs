/////////////////////////////////////////////////////////////////////////////////////////////\
//
// End-to-end shrinkage study: simulate, standardize, fit both priors, compare by LOO.
//
// Created on: 26 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Shrinkage study
//!
//! Runs the naive-vs-horseshoe comparison on one simulated cohort. Both models
//! share the formula, the standardized data and the sampler schedule; only
//! the coefficient prior differs.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::cache::{CacheError, FitCache};
use crate::dataset::Dataset;
use crate::inference::SamplerConfig;
use crate::input::{Formula, FormulaError, InputError, ModelFrame};
use crate::models::comparison::{ComparisonError, ComparisonRow, compare_models};
use crate::models::loo::{LooError, LooOptions};
use crate::models::regression::{
    ConvergencePolicy, FitError, FitOptions, FittedModel, ParameterSummary, Prior, PriorError,
    PriorSpec, fit_frame_with_retry, fit_with_retry,
};
use crate::preprocess::{PreprocessError, Standardization, standardize_dataset};
use crate::report::{comparison_table, interval_plot, posterior_table};
use crate::simulation::{SimulationConfig, SimulationError, simulate_seeded};

/// Model id of the fit with independent Normal coefficient priors.
pub const NAIVE_MODEL: &str = "naive";
/// Model id of the fit with a horseshoe coefficient prior.
pub const HORSESHOE_MODEL: &str = "horseshoe";

#[derive(Debug, Error)]
pub enum StudyError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Prior(#[from] PriorError),
    #[error("fitting `{model}` failed: {source}")]
    Fit {
        model: &'static str,
        #[source]
        source: FitError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("LOO for `{model}` failed: {source}")]
    Loo {
        model: &'static str,
        #[source]
        source: LooError,
    },
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
}

/// Configuration of one study run.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    pub rows: usize,
    pub data_seed: u64,
    pub simulation: SimulationConfig,
    pub formula: String,
    pub naive_priors: PriorSpec,
    pub horseshoe_priors: PriorSpec,
    pub sampler: SamplerConfig,
    pub convergence: ConvergencePolicy,
    pub loo: LooOptions,
    /// Budget-exhausted fits are retried this many times with halved
    /// schedules.
    pub max_retries: usize,
    /// Reuse fits stored here; `None` always refits.
    pub cache_dir: Option<PathBuf>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        let intercept = Prior::Normal {
            mean: 1200.0,
            sd: 100.0,
        };
        let sigma = Prior::Exponential { rate: 0.01 };
        Self {
            rows: 200,
            data_seed: 404,
            simulation: SimulationConfig::default(),
            formula: "brain_volume ~ .".to_string(),
            naive_priors: PriorSpec::from_parts(
                intercept,
                Prior::Normal { mean: 0.0, sd: 100.0 },
                sigma,
            ),
            horseshoe_priors: PriorSpec::from_parts(
                intercept,
                Prior::Horseshoe { scale_global: 0.1 },
                sigma,
            ),
            sampler: SamplerConfig {
                chains: 4,
                iterations: 1_000,
                warmup: 500,
                ..SamplerConfig::default()
            },
            convergence: ConvergencePolicy::default(),
            loo: LooOptions::default(),
            max_retries: 2,
            cache_dir: None,
        }
    }
}

impl StudyConfig {
    /// # Errors
    ///
    /// Returns `StudyError` for invalid priors or an invalid simulation or
    /// sampler configuration.
    pub fn validate(&self) -> Result<(), StudyError> {
        self.simulation.validate()?;
        for (model, priors) in [
            (NAIVE_MODEL, self.naive_priors),
            (HORSESHOE_MODEL, self.horseshoe_priors),
        ] {
            priors.validate()?;
            self.fit_options(priors)
                .validate()
                .map_err(|source| StudyError::Fit { model, source })?;
        }
        Ok(())
    }

    fn fit_options(&self, priors: PriorSpec) -> FitOptions {
        FitOptions {
            sampler: self.sampler,
            convergence: self.convergence,
            ..FitOptions::new(priors)
        }
    }
}

/// Posterior means of one slope under both priors.
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkageRow {
    pub name: String,
    pub naive: ParameterSummary,
    pub horseshoe: ParameterSummary,
}

impl ShrinkageRow {
    /// Whether the horseshoe estimate is closer to zero than the naive one.
    #[must_use]
    pub fn is_shrunk(&self) -> bool {
        self.horseshoe.mean.abs() < self.naive.mean.abs()
    }
}

/// Everything a study run produces.
#[derive(Debug, Clone)]
pub struct StudyReport {
    /// The standardized dataset both models were fitted to.
    pub dataset: Dataset,
    pub standardization: Vec<(String, Standardization)>,
    pub causal_predictors: Vec<String>,
    pub naive: FittedModel,
    pub horseshoe: FittedModel,
    pub comparison: Vec<ComparisonRow>,
}

impl StudyReport {
    /// Slopes side by side under both priors, in design-matrix order.
    #[must_use]
    pub fn shrinkage(&self) -> Vec<ShrinkageRow> {
        self.naive
            .coefficient_names()
            .iter()
            .skip(1)
            .filter_map(|name| {
                Some(ShrinkageRow {
                    name: name.clone(),
                    naive: self.naive.coefficient(name)?,
                    horseshoe: self.horseshoe.coefficient(name)?,
                })
            })
            .collect()
    }

    /// Human-readable summary: both posterior tables, interval plots and the
    /// LOO comparison.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for model in [&self.naive, &self.horseshoe] {
            out.push_str(&format!(
                "== {} ({}, coefficients ~ {}) ==\n",
                model.name(),
                model.formula(),
                model.priors().coefficients()
            ));
            out.push_str(&posterior_table(model));
            out.push('\n');
            if let Some(tau) = model.tau() {
                out.push_str(&format!(
                    "tau: {:.4} [{:.4}, {:.4}]\n",
                    tau.mean, tau.q025, tau.q975
                ));
            }
            out.push_str(&interval_plot(model));
            out.push('\n');
        }
        out.push_str("== LOO comparison ==\n");
        out.push_str(&comparison_table(&self.comparison));
        out.push('\n');
        out
    }
}

/// Run the study end to end.
///
/// # Errors
///
/// Returns `StudyError` from whichever stage fails first; nothing is retried
/// except budget-exhausted fits.
pub fn run_study(config: &StudyConfig) -> Result<StudyReport, StudyError> {
    config.validate()?;
    let formula = Formula::parse(&config.formula)?;

    let raw = simulate_seeded(&config.simulation, config.rows, config.data_seed)?;
    let (dataset, standardization) = standardize_dataset(&raw, formula.response())?;
    info!(
        rows = dataset.n_rows(),
        columns = dataset.n_columns(),
        standardized = standardization.len(),
        seed = config.data_seed,
        "simulated cohort"
    );

    let cache = config.cache_dir.as_ref().map(FitCache::new);
    let mut naive = fit_one(
        NAIVE_MODEL,
        &dataset,
        &formula,
        &config.fit_options(config.naive_priors),
        cache.as_ref(),
        config.max_retries,
    )?;
    let mut horseshoe = fit_one(
        HORSESHOE_MODEL,
        &dataset,
        &formula,
        &config.fit_options(config.horseshoe_priors),
        cache.as_ref(),
        config.max_retries,
    )?;

    naive.add_loo(config.loo).map_err(|source| StudyError::Loo {
        model: NAIVE_MODEL,
        source,
    })?;
    horseshoe.add_loo(config.loo).map_err(|source| StudyError::Loo {
        model: HORSESHOE_MODEL,
        source,
    })?;

    let models = [naive, horseshoe];
    let comparison = compare_models(&models)?;
    let [naive, horseshoe] = models;
    info!(best = %comparison[0].name, "study complete");

    Ok(StudyReport {
        dataset,
        standardization,
        causal_predictors: config
            .simulation
            .causal_predictors()
            .into_iter()
            .map(str::to_string)
            .collect(),
        naive,
        horseshoe,
        comparison,
    })
}

fn fit_one(
    model: &'static str,
    dataset: &Dataset,
    formula: &Formula,
    options: &FitOptions,
    cache: Option<&FitCache>,
    max_retries: usize,
) -> Result<FittedModel, StudyError> {
    match cache {
        Some(cache) => {
            let frame = ModelFrame::new(dataset, formula)?;
            cache.load_or_fit_with(model, &frame, options, |frame| {
                fit_frame_with_retry(model, frame, options, max_retries)
                    .map_err(|source| StudyError::Fit { model, source })
            })
        }
        None => fit_with_retry(model, dataset, formula, options, max_retries)
            .map_err(|source| StudyError::Fit { model, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> StudyConfig {
        StudyConfig {
            rows: 60,
            data_seed: 7,
            formula: "brain_volume ~ age + sex + pet_count".to_string(),
            sampler: SamplerConfig {
                chains: 2,
                iterations: 400,
                warmup: 200,
                cores: 1,
                ..SamplerConfig::default()
            },
            convergence: ConvergencePolicy {
                enforce: false,
                ..ConvergencePolicy::default()
            },
            loo: LooOptions {
                k_threshold: Some(10.0),
                ..LooOptions::default()
            },
            ..StudyConfig::default()
        }
    }

    #[test]
    fn default_config_matches_the_study_design() {
        let config = StudyConfig::default();
        assert_eq!(config.rows, 200);
        assert_eq!(config.data_seed, 404);
        assert_eq!(config.sampler.chains, 4);
        assert_eq!(config.sampler.iterations, 1_000);
        assert_eq!(config.sampler.warmup, 500);
        assert!(config.horseshoe_priors.is_horseshoe());
        assert!(!config.naive_priors.is_horseshoe());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn single_row_fails_at_standardization() {
        let config = StudyConfig {
            rows: 1,
            ..StudyConfig::default()
        };
        assert!(matches!(
            run_study(&config),
            Err(StudyError::Preprocess(PreprocessError::InsufficientData { found: 1, .. }))
        ));
    }

    #[test]
    fn malformed_formula_is_fatal() {
        let config = StudyConfig {
            formula: "brain_volume ~ age + shoe_size".to_string(),
            ..quick_config()
        };
        let err = run_study(&config).unwrap_err();
        assert!(err.to_string().contains("shoe_size"));
    }

    #[test]
    fn quick_study_ranks_both_models() {
        let report = run_study(&quick_config()).unwrap();
        assert_eq!(report.comparison.len(), 2);
        assert!(report.comparison[0].elpd_diff.abs() < 1e-12);
        assert!(report.comparison[1].elpd_diff <= 0.0);
        assert_eq!(report.shrinkage().len(), 3);
        assert!(report.horseshoe.tau().is_some());
        assert!(report.naive.tau().is_none());

        let rendered = report.render();
        assert!(rendered.contains("LOO comparison"));
        assert!(rendered.contains("horseshoe(1, scale_global = 0.1)"));
    }

    #[test]
    fn cached_study_retries_over_budget_fits_and_names_failures() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut config = quick_config();
        config.cache_dir = Some(dir.path().to_path_buf());
        config.sampler.iterations = 1 << 22;
        config.sampler.warmup = 1 << 21;
        config.sampler.time_budget = Some(std::time::Duration::from_millis(200));

        let exhausted = StudyConfig {
            max_retries: 1,
            ..config.clone()
        };
        match run_study(&exhausted) {
            Err(StudyError::Fit { model, source }) => {
                assert_eq!(model, NAIVE_MODEL);
                assert!(matches!(source, FitError::BudgetExceeded { .. }));
            }
            other => panic!("expected a budget failure for the naive fit, got {other:?}"),
        }

        config.max_retries = 40;
        let first = run_study(&config).expect("halved schedules fit the budget");
        for model in [&first.naive, &first.horseshoe] {
            assert!(model.sampler().iterations < config.sampler.iterations);
        }
        let cached = std::fs::read_dir(dir.path()).expect("cache dir").count();
        assert_eq!(cached, 2);

        let second = run_study(&config).expect("served from the cache");
        assert_eq!(second.naive.chains(), first.naive.chains());
        assert_eq!(second.horseshoe.chains(), first.horseshoe.chains());
        assert_eq!(second.horseshoe.name(), HORSESHOE_MODEL);
    }
}
