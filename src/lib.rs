#![forbid(unsafe_code)]

//! # `shrinkage_models`
//!
//! Horseshoe versus naive Normal priors for Bayesian linear regression on a
//! simulated cohort with a few causal predictors and many inert ones.
//!
//! The pipeline has three stages: a seeded data simulator, a blocking model
//! fitter that runs independent Gibbs chains in parallel, and a comparator
//! that ranks fitted models by PSIS-LOO expected log predictive density.
//! [`workflow::run_study`] wires them together.

pub mod cache;
pub mod dataset;
pub mod inference;
pub mod input;
pub mod models;
pub mod preprocess;
pub mod report;
pub mod simulation;
pub mod utils;
pub mod workflow;

pub use cache::{CacheError, FitCache};
pub use dataset::{Column, ColumnData, Dataset, DatasetError};
pub use inference::{InferenceError, ProposalStats, SamplerConfig};
pub use input::{Formula, FormulaError, INTERCEPT, InputError, ModelFrame};
pub use preprocess::{PreprocessError, Standardization, standardize, standardize_dataset};
pub use simulation::{
    CategoricalSpec, Distribution, SimulationConfig, SimulationError, simulate, simulate_seeded,
};

pub mod comparison {
    pub use crate::models::comparison::*;
}
pub mod loo {
    pub use crate::models::loo::*;
}

pub use models::comparison::{
    ComparisonError, ComparisonRow, compare_loo, compare_models, elpd_difference,
};
pub use models::loo::{LooError, LooEstimate, LooOptions, psis_loo};
pub use models::regression::{
    ChainDiagnostics, ChainSamples, ConvergencePolicy, ConvergenceSummary, Family, FitError,
    FitOptions, FittedModel, Parameter, ParameterSummary, PosteriorDraw, PosteriorRow, Prior,
    PriorError, PriorKind, PriorSpec, ProposalTuning, fit, fit_frame, fit_frame_with_retry,
    fit_with_retry,
};
pub use report::{comparison_table, interval_plot, posterior_table};
pub use workflow::{
    HORSESHOE_MODEL, NAIVE_MODEL, ShrinkageRow, StudyConfig, StudyError, StudyReport, run_study,
};
