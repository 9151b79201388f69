/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Fitted Bayesian regression models and the blocking fit entrypoints.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::inference::SamplerConfig;
use crate::input::{Formula, ModelFrame};
use crate::models::loo::{LooError, LooEstimate, LooOptions, psis_loo};

use super::diagnostics::{ConvergenceSummary, summarize_convergence};
use super::likelihood::{SufficientStatistics, pointwise_log_likelihood};
use super::posterior::{
    ChainSamples, Parameter, ParameterSummary, PosteriorDraw, pooled_values, summarize_scalar,
};
use super::priors::PriorSpec;
use super::sampler::sample_chains;
use super::types::{ChainDiagnostics, Family, FitError, FitOptions};

/// One row of a posterior summary: location, spread, interval and
/// convergence diagnostics for a reported parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorRow {
    pub name: String,
    pub summary: ParameterSummary,
    pub rhat: f64,
    pub ess: f64,
}

/// A fitted regression: its specification, posterior draws and diagnostics.
///
/// Attaching a LOO estimate is the only mutation after fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    name: String,
    family: Family,
    priors: PriorSpec,
    sampler: SamplerConfig,
    frame: ModelFrame,
    chains: Vec<ChainSamples>,
    chain_diagnostics: Vec<ChainDiagnostics>,
    convergence: ConvergenceSummary,
    #[serde(default)]
    loo: Option<LooEstimate>,
}

impl FittedModel {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The same fit under another model id.
    #[must_use]
    pub(crate) fn renamed(self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self
        }
    }

    #[must_use]
    pub const fn family(&self) -> Family {
        self.family
    }

    #[must_use]
    pub const fn priors(&self) -> &PriorSpec {
        &self.priors
    }

    /// Schedule the retained draws came from; shorter than requested after a
    /// budget retry.
    #[must_use]
    pub const fn sampler(&self) -> &SamplerConfig {
        &self.sampler
    }

    #[must_use]
    pub const fn frame(&self) -> &ModelFrame {
        &self.frame
    }

    #[must_use]
    pub fn chains(&self) -> &[ChainSamples] {
        &self.chains
    }

    #[must_use]
    pub fn chain_diagnostics(&self) -> &[ChainDiagnostics] {
        &self.chain_diagnostics
    }

    #[must_use]
    pub const fn convergence(&self) -> &ConvergenceSummary {
        &self.convergence
    }

    #[must_use]
    pub const fn formula(&self) -> &Formula {
        &self.frame.formula
    }

    #[must_use]
    pub fn coefficient_names(&self) -> &[String] {
        &self.frame.coefficient_names
    }

    /// Total retained draws across chains.
    #[must_use]
    pub fn n_draws(&self) -> usize {
        self.chains.iter().map(ChainSamples::len).sum()
    }

    /// Draws pooled across chains in chain order.
    pub fn draws(&self) -> impl Iterator<Item = &PosteriorDraw> {
        self.chains.iter().flat_map(|chain| chain.draws.iter())
    }

    /// Summary rows for every coefficient and `sigma`.
    #[must_use]
    pub fn posterior_rows(&self) -> Vec<PosteriorRow> {
        Parameter::enumerate(self.coefficient_names(), false)
            .into_iter()
            .map(|(parameter, name)| {
                let summary = summarize_scalar(&pooled_values(&self.chains, parameter));
                let (rhat, ess) = self
                    .convergence
                    .parameter(&name)
                    .map_or((f64::NAN, f64::NAN), |diagnostics| {
                        (diagnostics.rhat, diagnostics.ess)
                    });
                PosteriorRow {
                    name,
                    summary,
                    rhat,
                    ess,
                }
            })
            .collect()
    }

    /// Posterior summary of one coefficient by name.
    #[must_use]
    pub fn coefficient(&self, name: &str) -> Option<ParameterSummary> {
        let index = self.frame.coefficient_index(name)?;
        Some(summarize_scalar(&pooled_values(
            &self.chains,
            Parameter::Coefficient(index),
        )))
    }

    #[must_use]
    pub fn sigma(&self) -> ParameterSummary {
        summarize_scalar(&pooled_values(&self.chains, Parameter::Sigma))
    }

    /// Posterior summary of the horseshoe global scale, if the model has one.
    #[must_use]
    pub fn tau(&self) -> Option<ParameterSummary> {
        self.priors
            .is_horseshoe()
            .then(|| summarize_scalar(&pooled_values(&self.chains, Parameter::Tau)))
    }

    /// Pointwise log-likelihood, one row per pooled draw.
    #[must_use]
    pub fn log_likelihood(&self) -> Vec<Vec<f64>> {
        self.draws()
            .map(|draw| pointwise_log_likelihood(&self.frame, draw))
            .collect()
    }

    #[must_use]
    pub const fn loo(&self) -> Option<&LooEstimate> {
        self.loo.as_ref()
    }

    /// Compute and attach the PSIS-LOO estimate.
    ///
    /// Idempotent: a model that already carries an estimate returns it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `LooError` if the estimate cannot be computed or is unreliable;
    /// the model is left without an estimate in that case.
    pub fn add_loo(&mut self, options: LooOptions) -> Result<&LooEstimate, LooError> {
        let estimate = match self.loo.take() {
            Some(existing) => existing,
            None => {
                let estimate = psis_loo(&self.log_likelihood(), options)?;
                info!(
                    model = %self.name,
                    elpd_loo = estimate.elpd_loo,
                    p_loo = estimate.p_loo,
                    max_pareto_k = estimate.max_pareto_k(),
                    "attached LOO estimate"
                );
                estimate
            }
        };
        Ok(self.loo.insert(estimate))
    }
}

/// Fit `formula` to `dataset`, blocking until every chain finishes.
///
/// # Errors
///
/// Returns `FitError` for an invalid formula/dataset pairing, invalid
/// options, sampler failures, an exhausted time budget, or (when enforced)
/// convergence violations.
pub fn fit(
    name: &str,
    dataset: &Dataset,
    formula: &Formula,
    options: &FitOptions,
) -> Result<FittedModel, FitError> {
    let frame = ModelFrame::new(dataset, formula)?;
    fit_frame(name, frame, options)
}

/// Fit a prepared model frame.
///
/// # Errors
///
/// See [`fit`].
pub fn fit_frame(
    name: &str,
    frame: ModelFrame,
    options: &FitOptions,
) -> Result<FittedModel, FitError> {
    options.validate()?;
    frame.validate()?;
    info!(
        model = name,
        formula = %frame.formula,
        prior = %options.priors.coefficients(),
        chains = options.sampler.chains,
        iterations = options.sampler.iterations,
        warmup = options.sampler.warmup,
        "fitting model"
    );
    let started = Instant::now();

    let stats = SufficientStatistics::from_frame(&frame);
    let (chains, chain_diagnostics) = sample_chains(&stats, options)?;
    let parameters = Parameter::enumerate(&frame.coefficient_names, false);
    let convergence = summarize_convergence(&chains, &parameters)?;
    check_convergence(name, &convergence, options)?;

    info!(
        model = name,
        elapsed_ms = started.elapsed().as_millis(),
        max_rhat = convergence.max_rhat,
        min_ess = convergence.min_ess,
        "fit complete"
    );
    Ok(FittedModel {
        name: name.to_string(),
        family: options.family,
        priors: options.priors,
        sampler: options.sampler,
        frame,
        chains,
        chain_diagnostics,
        convergence,
        loo: None,
    })
}

/// Fit, halving iterations and warmup after each recoverable failure.
///
/// # Errors
///
/// Returns the last error once `max_retries` retries are used up, or the
/// first non-recoverable error.
pub fn fit_with_retry(
    name: &str,
    dataset: &Dataset,
    formula: &Formula,
    options: &FitOptions,
    max_retries: usize,
) -> Result<FittedModel, FitError> {
    let frame = ModelFrame::new(dataset, formula)?;
    fit_frame_with_retry(name, frame, options, max_retries)
}

/// [`fit_with_retry`] on a prepared model frame.
///
/// # Errors
///
/// See [`fit_with_retry`].
pub fn fit_frame_with_retry(
    name: &str,
    frame: ModelFrame,
    options: &FitOptions,
    max_retries: usize,
) -> Result<FittedModel, FitError> {
    let mut attempt_options = *options;
    let mut retries = 0;
    loop {
        match fit_frame(name, frame.clone(), &attempt_options) {
            Err(err) if err.is_recoverable() && retries < max_retries => {
                retries += 1;
                attempt_options.sampler = attempt_options.sampler.halved();
                warn!(
                    model = name,
                    retry = retries,
                    iterations = attempt_options.sampler.iterations,
                    error = %err,
                    "retrying fit with a shorter schedule"
                );
            }
            result => return result,
        }
    }
}

fn check_convergence(
    name: &str,
    convergence: &ConvergenceSummary,
    options: &FitOptions,
) -> Result<(), FitError> {
    let policy = options.convergence;
    let violations = convergence.violations(policy.max_rhat, policy.min_ess);
    if violations.is_empty() {
        return Ok(());
    }
    if policy.enforce {
        return Err(FitError::NonConvergence {
            max_rhat: convergence.max_rhat,
            min_ess: convergence.min_ess,
            summary: Box::new(convergence.clone()),
        });
    }
    for violation in violations {
        warn!(
            model = name,
            parameter = %violation.name,
            rhat = violation.rhat,
            ess = violation.ess,
            "convergence threshold not met"
        );
    }
    Ok(())
}
