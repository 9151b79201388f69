//! MCMC convergence diagnostics: split-R-hat and effective sample size.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{mean, sample_variance, usize_to_f64};

use super::posterior::{ChainSamples, Parameter};

/// Errors returned while computing diagnostics.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("no posterior chains to diagnose")]
    EmptyPosterior,
    #[error("each chain must retain at least {minimum} draws; minimum found {found}")]
    InsufficientDraws { minimum: usize, found: usize },
    #[error("posterior dimensions differ across chains")]
    InconsistentDimensions,
}

/// Convergence diagnostics for one scalar parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDiagnostics {
    pub name: String,
    pub rhat: f64,
    /// Effective sample size summed over chains.
    pub ess: f64,
}

/// Multi-chain convergence summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSummary {
    pub chain_count: usize,
    /// Draws per chain used after truncation to equal even length.
    pub draws_per_chain_used: usize,
    pub parameters: Vec<ParameterDiagnostics>,
    pub max_rhat: f64,
    pub min_ess: f64,
}

impl ConvergenceSummary {
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterDiagnostics> {
        self.parameters.iter().find(|diagnostics| diagnostics.name == name)
    }

    /// Parameters exceeding `max_rhat` or falling short of `min_ess`.
    #[must_use]
    pub fn violations(&self, max_rhat: f64, min_ess: f64) -> Vec<&ParameterDiagnostics> {
        self.parameters
            .iter()
            .filter(|diagnostics| diagnostics.rhat > max_rhat || diagnostics.ess < min_ess)
            .collect()
    }
}

/// Lag-`k` autocorrelation for a scalar chain.
#[must_use]
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if series.is_empty() || lag >= series.len() {
        return 0.0;
    }

    let n = series.len() - lag;
    let mean = mean(series);

    let denominator = series
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>();
    if denominator <= 0.0 {
        return 0.0;
    }

    let numerator = (0..n)
        .map(|idx| (series[idx] - mean) * (series[idx + lag] - mean))
        .sum::<f64>();
    numerator / denominator
}

/// Effective sample size with autocorrelations summed until the first
/// non-positive lag.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return usize_to_f64(n);
    }

    let mut rho_sum = 0.0;
    for lag in 1..n {
        let rho = autocorrelation(series, lag);
        if rho <= 0.0 {
            break;
        }
        rho_sum += rho;
    }

    usize_to_f64(n) / 2.0f64.mul_add(rho_sum, 1.0).max(1.0)
}

/// Potential scale reduction over already split chains of equal length.
///
/// Returns `1.0` when the within-chain variance vanishes.
///
/// # Errors
///
/// Returns `DiagnosticsError` if fewer than two chains of at least two draws
/// are supplied or their lengths differ.
pub fn split_rhat_scalar(chains: &[Vec<f64>]) -> Result<f64, DiagnosticsError> {
    let n = chains.first().map_or(0, Vec::len);
    if chains.len() < 2 || n < 2 {
        return Err(DiagnosticsError::InsufficientDraws {
            minimum: 2,
            found: n,
        });
    }
    if chains.iter().any(|chain| chain.len() != n) {
        return Err(DiagnosticsError::InconsistentDimensions);
    }

    let chain_means = chains.iter().map(|chain| mean(chain)).collect::<Vec<_>>();
    let chain_vars = chains
        .iter()
        .zip(chain_means.iter())
        .map(|(chain, chain_mean)| sample_variance(chain, *chain_mean))
        .collect::<Vec<_>>();

    let n_f64 = usize_to_f64(n);
    let between = n_f64 * sample_variance(&chain_means, mean(&chain_means));
    let within = mean(&chain_vars);

    if !(within.is_finite() && within > 0.0 && between.is_finite()) {
        return Ok(1.0);
    }

    let var_plus = ((n_f64 - 1.0) / n_f64).mul_add(within, between / n_f64);
    if !var_plus.is_finite() || var_plus <= 0.0 {
        return Ok(1.0);
    }

    Ok((var_plus / within).sqrt().max(1.0))
}

/// Split-R-hat and ESS for every named parameter across chains.
///
/// Chains are truncated to the shortest even length. A single chain is
/// diagnosed by comparing its two halves.
///
/// # Errors
///
/// Returns `DiagnosticsError` if no chains are given, fewer than four draws
/// per chain are available, or draw dimensions differ.
pub fn summarize_convergence(
    chains: &[ChainSamples],
    parameters: &[(Parameter, String)],
) -> Result<ConvergenceSummary, DiagnosticsError> {
    if chains.is_empty() {
        return Err(DiagnosticsError::EmptyPosterior);
    }
    let min_draws = chains.iter().map(ChainSamples::len).min().unwrap_or(0);
    let draws_per_chain_used = min_draws - (min_draws % 2);
    if draws_per_chain_used < 4 {
        return Err(DiagnosticsError::InsufficientDraws {
            minimum: 4,
            found: min_draws,
        });
    }
    let width = chains[0].draws[0].coefficients.len();
    let has_tau = chains[0].draws[0].tau.is_some();
    if chains.iter().flat_map(|chain| &chain.draws).any(|draw| {
        draw.coefficients.len() != width || draw.tau.is_some() != has_tau
    }) {
        return Err(DiagnosticsError::InconsistentDimensions);
    }

    let half = draws_per_chain_used / 2;
    let mut diagnostics = Vec::with_capacity(parameters.len());
    for (parameter, name) in parameters {
        let series = chains
            .iter()
            .map(|chain| {
                chain
                    .draws
                    .iter()
                    .take(draws_per_chain_used)
                    .map(|draw| parameter.value(draw))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let split = series
            .iter()
            .flat_map(|chain| [chain[..half].to_vec(), chain[half..].to_vec()])
            .collect::<Vec<_>>();
        let rhat = split_rhat_scalar(&split)?;
        let ess = series.iter().map(|chain| effective_sample_size(chain)).sum();
        diagnostics.push(ParameterDiagnostics {
            name: name.clone(),
            rhat,
            ess,
        });
    }

    let max_rhat = diagnostics
        .iter()
        .map(|diagnostics| diagnostics.rhat)
        .max_by(f64::total_cmp)
        .unwrap_or(1.0);
    let min_ess = diagnostics
        .iter()
        .map(|diagnostics| diagnostics.ess)
        .min_by(f64::total_cmp)
        .unwrap_or(0.0);

    Ok(ConvergenceSummary {
        chain_count: chains.len(),
        draws_per_chain_used,
        parameters: diagnostics,
        max_rhat,
        min_ess,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::regression::posterior::PosteriorDraw;
    use approx::assert_relative_eq;

    fn chain(values: &[f64]) -> ChainSamples {
        ChainSamples {
            draws: values
                .iter()
                .map(|value| PosteriorDraw {
                    coefficients: vec![*value],
                    sigma: 1.0,
                    tau: None,
                })
                .collect(),
        }
    }

    fn parameters() -> Vec<(Parameter, String)> {
        vec![
            (Parameter::Coefficient(0), "Intercept".to_string()),
            (Parameter::Sigma, "sigma".to_string()),
        ]
    }

    #[test]
    fn autocorrelation_of_alternating_series_is_negative() {
        let series = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        assert!(autocorrelation(&series, 1) < 0.0);
        assert_relative_eq!(autocorrelation(&[2.0, 2.0, 2.0], 1), 0.0);
    }

    #[test]
    fn ess_of_independent_looking_series_is_full_length() {
        let series = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        assert_relative_eq!(effective_sample_size(&series), 8.0);
    }

    #[test]
    fn ess_shrinks_for_sticky_chain() {
        let series = (0..100).map(|i| f64::from(i / 10)).collect::<Vec<_>>();
        assert!(effective_sample_size(&series) < 20.0);
    }

    #[test]
    fn split_rhat_detects_separated_chains() {
        let chains = vec![
            chain(&[0.0, 0.1, -0.1, 0.05, 0.0, -0.05]),
            chain(&[5.0, 5.1, 4.9, 5.05, 5.0, 4.95]),
        ];
        let summary = summarize_convergence(&chains, &parameters()).expect("diagnostics");
        let intercept = summary.parameter("Intercept").expect("intercept");
        assert!(intercept.rhat > 1.5);
        assert_relative_eq!(summary.parameter("sigma").expect("sigma").rhat, 1.0);
        assert_eq!(summary.violations(1.1, 0.0).len(), 1);
        assert_relative_eq!(summary.max_rhat, intercept.rhat);
    }

    #[test]
    fn single_chain_is_split_in_halves() {
        let chains = vec![chain(&[0.0, 0.2, -0.1, 0.1, -0.2, 0.05, 0.0])];
        let summary = summarize_convergence(&chains, &parameters()).expect("diagnostics");
        assert_eq!(summary.draws_per_chain_used, 6);
        assert!(summary.max_rhat >= 1.0);
    }

    #[test]
    fn too_few_draws_is_an_error() {
        let chains = vec![chain(&[0.0, 1.0, 2.0]), chain(&[0.0, 1.0, 2.0])];
        assert_eq!(
            summarize_convergence(&chains, &parameters()),
            Err(DiagnosticsError::InsufficientDraws {
                minimum: 4,
                found: 3
            })
        );
        assert_eq!(
            summarize_convergence(&[], &parameters()),
            Err(DiagnosticsError::EmptyPosterior)
        );
    }
}
