//! Core public types for Bayesian regression fitting.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::diagnostics::{ConvergenceSummary, DiagnosticsError};
use super::priors::{PriorError, PriorSpec};
use crate::inference::{InferenceError, SamplerConfig};
use crate::input::InputError;

/// Errors returned by regression configuration, validation, and fitting.
#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Prior(#[from] PriorError),
    #[error(transparent)]
    Sampler(#[from] InferenceError),
    #[error(transparent)]
    Diagnostics(#[from] DiagnosticsError),
    #[error("unknown model family `{0}`")]
    UnknownFamily(String),
    #[error("invalid convergence policy")]
    InvalidConvergencePolicy,
    #[error("invalid sigma proposal tuning configuration")]
    InvalidProposalTuning,
    #[error("posterior precision is not positive definite (chain {chain}, iteration {iteration})")]
    SolveFailed { chain: usize, iteration: usize },
    #[error("sampler state became non-finite (chain {chain}, iteration {iteration})")]
    NonFiniteState { chain: usize, iteration: usize },
    #[error(
        "time budget of {budget:?} exceeded after {elapsed:?} \
         (chain {chain} completed {iterations_completed} iterations)"
    )]
    BudgetExceeded {
        budget: Duration,
        elapsed: Duration,
        chain: usize,
        iterations_completed: usize,
    },
    #[error("chains did not converge: max R-hat {max_rhat:.3}, min ESS {min_ess:.1}")]
    NonConvergence {
        max_rhat: f64,
        min_ess: f64,
        summary: Box<ConvergenceSummary>,
    },
    #[error("sampling thread for chain {0} panicked")]
    ChainPanicked(usize),
}

impl FitError {
    /// Whether retrying with a cheaper schedule may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}

/// Likelihood family of the regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    #[default]
    Gaussian,
}

impl FromStr for Family {
    type Err = FitError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "gaussian" => Ok(Self::Gaussian),
            _ => Err(FitError::UnknownFamily(text.to_string())),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gaussian => f.write_str("gaussian"),
        }
    }
}

/// Thresholds a fit must meet before it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePolicy {
    /// Largest acceptable split-R-hat.
    pub max_rhat: f64,
    /// Smallest acceptable effective sample size, summed over chains.
    pub min_ess: f64,
    /// Fail the fit on violations; otherwise only warn.
    pub enforce: bool,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            max_rhat: 1.1,
            min_ess: 100.0,
            enforce: true,
        }
    }
}

impl ConvergencePolicy {
    /// # Errors
    ///
    /// Returns `FitError::InvalidConvergencePolicy` for thresholds that can
    /// never be met or are not finite.
    pub fn validate(self) -> Result<(), FitError> {
        if !(self.max_rhat.is_finite() && self.max_rhat >= 1.0)
            || !(self.min_ess.is_finite() && self.min_ess >= 0.0)
        {
            return Err(FitError::InvalidConvergencePolicy);
        }
        Ok(())
    }
}

/// Proposal-scale and adaptation controls for the `log(sigma)` random walk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposalTuning {
    /// Initial random-walk scale for `log(sigma)`.
    pub log_sigma_draw_scale: f64,
    /// Minimum allowed proposal scale.
    pub min_draw_scale: f64,
    /// Adapt every `adaptation_interval` iterations during warmup.
    pub adaptation_interval: usize,
    pub acceptance_target_low: f64,
    pub acceptance_target_high: f64,
    pub scale_decrease_factor: f64,
    pub scale_increase_factor: f64,
}

impl Default for ProposalTuning {
    fn default() -> Self {
        Self {
            log_sigma_draw_scale: 0.1,
            min_draw_scale: 1.0e-3,
            adaptation_interval: 50,
            acceptance_target_low: 0.2,
            acceptance_target_high: 0.5,
            scale_decrease_factor: 0.8,
            scale_increase_factor: 1.2,
        }
    }
}

impl ProposalTuning {
    /// Whether proposal tuning settings are numerically valid.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.log_sigma_draw_scale > 0.0
            && self.min_draw_scale > 0.0
            && self.adaptation_interval > 0
            && self.acceptance_target_low >= 0.0
            && self.acceptance_target_high <= 1.0
            && self.acceptance_target_low < self.acceptance_target_high
            && self.scale_decrease_factor > 0.0
            && self.scale_increase_factor > 0.0
    }
}

/// Everything a fit needs besides the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub family: Family,
    pub priors: PriorSpec,
    pub sampler: SamplerConfig,
    pub convergence: ConvergencePolicy,
    pub tuning: ProposalTuning,
}

impl FitOptions {
    /// Options with default sampler, convergence and tuning settings.
    #[must_use]
    pub fn new(priors: PriorSpec) -> Self {
        Self {
            family: Family::Gaussian,
            priors,
            sampler: SamplerConfig::default(),
            convergence: ConvergencePolicy::default(),
            tuning: ProposalTuning::default(),
        }
    }

    /// # Errors
    ///
    /// Returns `FitError` if any configuration block is invalid.
    pub fn validate(&self) -> Result<(), FitError> {
        self.priors.validate()?;
        self.sampler.validate()?;
        self.convergence.validate()?;
        if !self.tuning.is_valid() {
            return Err(FitError::InvalidProposalTuning);
        }
        Ok(())
    }
}

/// Per-chain sampler bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainDiagnostics {
    pub seed: u64,
    pub iterations_completed: usize,
    pub retained_draws: usize,
    /// Acceptance rate of the `log(sigma)` random walk after warmup.
    pub sigma_acceptance: f64,
    pub final_log_sigma_scale: f64,
}
