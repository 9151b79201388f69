//! Posterior storage and summaries for Gaussian regression.

use serde::{Deserialize, Serialize};

use crate::utils::{mean, percentile, sample_variance};

/// A single posterior draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraw {
    /// Intercept first, then slopes in design-matrix order.
    pub coefficients: Vec<f64>,
    pub sigma: f64,
    /// Global shrinkage scale; only present under a horseshoe prior.
    pub tau: Option<f64>,
}

/// Retained draws of one chain, in sampling order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSamples {
    pub draws: Vec<PosteriorDraw>,
}

impl ChainSamples {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.draws.len()
    }
}

/// Scalar model parameter addressed by the summaries and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Coefficient(usize),
    Sigma,
    Tau,
}

impl Parameter {
    /// Value of this parameter in `draw`; `NaN` if the draw does not carry it.
    #[must_use]
    pub fn value(self, draw: &PosteriorDraw) -> f64 {
        match self {
            Self::Coefficient(index) => draw.coefficients.get(index).copied().unwrap_or(f64::NAN),
            Self::Sigma => draw.sigma,
            Self::Tau => draw.tau.unwrap_or(f64::NAN),
        }
    }

    /// Scalar parameters with display names: coefficients first, then
    /// `sigma`, then `tau` if requested.
    #[must_use]
    pub fn enumerate(coefficient_names: &[String], include_tau: bool) -> Vec<(Self, String)> {
        let mut parameters = coefficient_names
            .iter()
            .enumerate()
            .map(|(index, name)| (Self::Coefficient(index), name.clone()))
            .collect::<Vec<_>>();
        parameters.push((Self::Sigma, "sigma".to_string()));
        if include_tau {
            parameters.push((Self::Tau, "tau".to_string()));
        }
        parameters
    }
}

/// Scalar posterior summary statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub q975: f64,
}

impl ParameterSummary {
    /// Whether the central 95% interval excludes zero.
    #[must_use]
    pub fn excludes_zero(&self) -> bool {
        self.q025 > 0.0 || self.q975 < 0.0
    }
}

/// Summarize a scalar sample: mean, n-1 standard deviation and quantiles.
#[must_use]
pub fn summarize_scalar(values: &[f64]) -> ParameterSummary {
    if values.is_empty() {
        return ParameterSummary::default();
    }

    let mean = mean(values);
    let variance = sample_variance(values, mean);

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    ParameterSummary {
        mean,
        std_dev: variance.sqrt(),
        q025: percentile(&sorted, 0.025),
        q25: percentile(&sorted, 0.25),
        q50: percentile(&sorted, 0.5),
        q75: percentile(&sorted, 0.75),
        q975: percentile(&sorted, 0.975),
    }
}

/// Values of one parameter pooled across chains in chain order.
#[must_use]
pub fn pooled_values(chains: &[ChainSamples], parameter: Parameter) -> Vec<f64> {
    chains
        .iter()
        .flat_map(|chain| chain.draws.iter().map(move |draw| parameter.value(draw)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn draw(coefficients: &[f64], sigma: f64, tau: Option<f64>) -> PosteriorDraw {
        PosteriorDraw {
            coefficients: coefficients.to_vec(),
            sigma,
            tau,
        }
    }

    #[test]
    fn summarize_empty_values() {
        let summary = summarize_scalar(&[]);
        assert_eq!(summary, ParameterSummary::default());
    }

    #[test]
    fn summarize_reports_mean_sd_and_quantiles() {
        let summary = summarize_scalar(&[4.0, 0.0, 2.0, 1.0, 3.0]);
        assert_relative_eq!(summary.mean, 2.0);
        assert_relative_eq!(summary.std_dev, 2.5_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(summary.q50, 2.0);
        assert_relative_eq!(summary.q25, 1.0);
        assert!(!summary.excludes_zero());
    }

    #[test]
    fn parameters_include_tau_only_when_requested() {
        let names = vec!["Intercept".to_string(), "age".to_string()];
        let plain = Parameter::enumerate(&names, false);
        assert_eq!(plain.len(), 3);
        assert_eq!(plain[2], (Parameter::Sigma, "sigma".to_string()));

        let shrunk = Parameter::enumerate(&names, true);
        assert_eq!(shrunk.last(), Some(&(Parameter::Tau, "tau".to_string())));
        assert!(Parameter::Tau.value(&draw(&[1.0, 2.0], 0.5, Some(0.1))) > 0.0);
    }

    #[test]
    fn pooled_values_concatenate_chains_in_order() {
        let chains = vec![
            ChainSamples {
                draws: vec![draw(&[1.0], 0.1, None), draw(&[2.0], 0.2, None)],
            },
            ChainSamples {
                draws: vec![draw(&[3.0], 0.3, None)],
            },
        ];
        assert_eq!(
            pooled_values(&chains, Parameter::Coefficient(0)),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(pooled_values(&chains, Parameter::Sigma), vec![0.1, 0.2, 0.3]);
        assert!(pooled_values(&chains, Parameter::Tau).iter().all(|v| v.is_nan()));
    }
}
