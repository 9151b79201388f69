//! Bayesian Gaussian linear regression with Normal or horseshoe coefficient
//! priors.
//!
//! A fit is a single blocking call: the formula is resolved against the
//! dataset, independent Gibbs chains run in parallel, and the pooled draws are
//! checked against a convergence policy before the fitted model is returned.

pub mod diagnostics;
pub mod likelihood;
pub mod model;
pub mod posterior;
pub mod priors;
pub mod sampler;
pub mod types;

pub use diagnostics::{
    ConvergenceSummary, DiagnosticsError, ParameterDiagnostics, autocorrelation,
    effective_sample_size, summarize_convergence,
};
pub use likelihood::{gaussian_log_density, pointwise_log_likelihood};
pub use model::{
    FittedModel, PosteriorRow, fit, fit_frame, fit_frame_with_retry, fit_with_retry,
};
pub use posterior::{ChainSamples, Parameter, ParameterSummary, PosteriorDraw, summarize_scalar};
pub use priors::{ParameterClass, Prior, PriorError, PriorKind, PriorSpec};
pub use types::{
    ChainDiagnostics, ConvergencePolicy, Family, FitError, FitOptions, ProposalTuning,
};
