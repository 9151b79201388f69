//! # Leave-one-out cross-validation
//!
//! Pareto-smoothed importance sampling LOO (PSIS-LOO) over a matrix of
//! pointwise log-likelihood values, one row per posterior draw and one column
//! per observation.
//!
//! For every observation the raw importance ratios `1 / p(y_i | theta_s)`
//! are stabilized by fitting a generalized Pareto distribution to their
//! largest values and replacing that tail with the fitted quantiles. The
//! fitted shape `k` doubles as a reliability diagnostic: values above the
//! threshold mean the estimate for that observation cannot be trusted, and
//! the whole estimate is rejected instead of silently approximated.

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{log_sum_exp, mean, sample_variance, usize_to_f64};

/// Errors returned by LOO estimation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LooError {
    #[error("LOO needs at least {minimum} posterior draws; found {found}")]
    InsufficientDraws { minimum: usize, found: usize },
    #[error("log-likelihood matrix has no observations")]
    NoObservations,
    #[error("draw {draw} has {found} log-likelihood values; expected {expected}")]
    RaggedLogLikelihood {
        draw: usize,
        expected: usize,
        found: usize,
    },
    #[error("log-likelihood is not finite at draw {draw}, observation {observation}")]
    NonFiniteLogLikelihood { draw: usize, observation: usize },
    #[error("invalid Pareto k threshold {0}")]
    InvalidThreshold(f64),
    #[error(
        "{count} observation(s) have Pareto k above {threshold:.2} (worst {max_k:.2} at \
         observation {worst_observation}); LOO estimate is unreliable"
    )]
    UnreliableEstimate {
        count: usize,
        threshold: f64,
        max_k: f64,
        worst_observation: usize,
    },
}

/// LOO settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LooOptions {
    /// Pareto k above which an observation is unreliable. `None` uses
    /// `min(1 - 1 / log10(S), 0.7)` for `S` draws.
    pub k_threshold: Option<f64>,
    pub min_draws: usize,
}

impl Default for LooOptions {
    fn default() -> Self {
        Self {
            k_threshold: None,
            min_draws: 100,
        }
    }
}

impl LooOptions {
    /// Threshold in effect for `draws` posterior draws.
    #[must_use]
    pub fn threshold(self, draws: usize) -> f64 {
        self.k_threshold.unwrap_or_else(|| {
            let sample_based = 1.0 - 1.0 / usize_to_f64(draws).log10();
            sample_based.min(0.7)
        })
    }
}

/// PSIS-LOO estimate with pointwise contributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LooEstimate {
    pub elpd_loo: f64,
    pub se_elpd_loo: f64,
    /// Effective number of parameters, `lpd - elpd_loo`.
    pub p_loo: f64,
    pub se_p_loo: f64,
    /// `-2 * elpd_loo`.
    pub looic: f64,
    pub se_looic: f64,
    pub pointwise_elpd: Vec<f64>,
    pub pareto_k: Vec<f64>,
    pub n_draws: usize,
}

impl LooEstimate {
    #[must_use]
    pub const fn n_obs(&self) -> usize {
        self.pointwise_elpd.len()
    }

    #[must_use]
    pub fn max_pareto_k(&self) -> f64 {
        self.pareto_k
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Pareto-smoothed log importance weights for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedWeights {
    /// Unnormalized log weights, one per draw.
    pub log_weights: Vec<f64>,
    /// Fitted generalized Pareto shape; `0` for a flat tail and infinite when
    /// there are too few draws to fit one.
    pub pareto_k: f64,
}

/// Compute PSIS-LOO from `log_lik[draw][observation]`.
///
/// # Errors
///
/// Returns `LooError` for malformed input, too few draws, or any observation
/// whose Pareto k exceeds the threshold.
pub fn psis_loo(log_lik: &[Vec<f64>], options: LooOptions) -> Result<LooEstimate, LooError> {
    let n_draws = log_lik.len();
    if n_draws < options.min_draws.max(2) {
        return Err(LooError::InsufficientDraws {
            minimum: options.min_draws.max(2),
            found: n_draws,
        });
    }
    let threshold = options.threshold(n_draws);
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(LooError::InvalidThreshold(threshold));
    }
    let n_obs = log_lik[0].len();
    if n_obs == 0 {
        return Err(LooError::NoObservations);
    }
    for (draw, row) in log_lik.iter().enumerate() {
        if row.len() != n_obs {
            return Err(LooError::RaggedLogLikelihood {
                draw,
                expected: n_obs,
                found: row.len(),
            });
        }
        if let Some(observation) = row.iter().position(|value| !value.is_finite()) {
            return Err(LooError::NonFiniteLogLikelihood { draw, observation });
        }
    }

    let mut pointwise_elpd = Vec::with_capacity(n_obs);
    let mut pointwise_p = Vec::with_capacity(n_obs);
    let mut pareto_k = Vec::with_capacity(n_obs);
    for observation in 0..n_obs {
        let column = log_lik.iter().map(|row| row[observation]).collect::<Vec<_>>();
        let log_ratios = column.iter().map(|value| -value).collect::<Vec<_>>();
        let smoothed = psis_smooth(&log_ratios);

        let weighted = smoothed
            .log_weights
            .iter()
            .zip(&column)
            .map(|(log_weight, value)| log_weight + value)
            .collect::<Vec<_>>();
        let elpd = log_sum_exp(&weighted) - log_sum_exp(&smoothed.log_weights);
        let lpd = log_sum_exp(&column) - usize_to_f64(n_draws).ln();

        pointwise_elpd.push(elpd);
        pointwise_p.push(lpd - elpd);
        pareto_k.push(smoothed.pareto_k);
    }

    let flagged = pareto_k
        .iter()
        .enumerate()
        .filter(|(_, k)| k.is_nan() || **k > threshold)
        .collect::<Vec<_>>();
    if let Some((worst_observation, max_k)) = flagged
        .iter()
        .copied()
        .max_by(|left, right| left.1.total_cmp(right.1))
    {
        return Err(LooError::UnreliableEstimate {
            count: flagged.len(),
            threshold,
            max_k: *max_k,
            worst_observation,
        });
    }

    let n = usize_to_f64(n_obs);
    let elpd_loo = pointwise_elpd.iter().sum::<f64>();
    let p_loo = pointwise_p.iter().sum::<f64>();
    let se_elpd_loo = (n * sample_variance(&pointwise_elpd, mean(&pointwise_elpd))).sqrt();
    let se_p_loo = (n * sample_variance(&pointwise_p, mean(&pointwise_p))).sqrt();

    Ok(LooEstimate {
        elpd_loo,
        se_elpd_loo,
        p_loo,
        se_p_loo,
        looic: -2.0 * elpd_loo,
        se_looic: 2.0 * se_elpd_loo,
        pointwise_elpd,
        pareto_k,
        n_draws,
    })
}

/// Pareto-smooth one vector of log importance ratios.
///
/// The largest `ceil(min(0.2 S, 3 sqrt(S)))` ratios are replaced by
/// generalized Pareto quantiles fit above the next-largest ratio, and every
/// weight is truncated at the largest raw weight.
#[must_use]
pub fn psis_smooth(log_ratios: &[f64]) -> SmoothedWeights {
    let n_draws = log_ratios.len();
    let max_ratio = log_ratios
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let mut log_weights = log_ratios
        .iter()
        .map(|value| value - max_ratio)
        .collect::<Vec<_>>();
    let mut pareto_k = f64::INFINITY;

    let tail_len = tail_length(n_draws);
    if tail_len >= 5 && tail_len < n_draws {
        let mut order = (0..n_draws).collect::<Vec<_>>();
        order.sort_by(|left, right| log_weights[*left].total_cmp(&log_weights[*right]));
        let tail_ids = &order[n_draws - tail_len..];
        let tail = tail_ids.iter().map(|id| log_weights[*id]).collect::<Vec<_>>();
        let spread = tail[tail_len - 1] - tail[0];
        if spread.abs() <= f64::EPSILON / 100.0 {
            // Flat tail: the largest weights are all equal, so there is no tail to fit.
            pareto_k = 0.0;
        } else {
            let cutoff = log_weights[order[n_draws - tail_len - 1]];
            let (k, smoothed_tail) = smooth_tail(&tail, cutoff);
            pareto_k = k;
            for (id, value) in tail_ids.iter().zip(smoothed_tail) {
                log_weights[*id] = value;
            }
        }
    }

    for value in &mut log_weights {
        *value = value.min(0.0) + max_ratio;
    }
    SmoothedWeights {
        log_weights,
        pareto_k,
    }
}

fn tail_length(n_draws: usize) -> usize {
    let s = usize_to_f64(n_draws);
    let length = (0.2 * s).min(3.0 * s.sqrt()).ceil();
    length.to_usize().unwrap_or(0)
}

/// Replace a sorted log tail with generalized Pareto quantiles above `cutoff`.
fn smooth_tail(log_tail: &[f64], cutoff: f64) -> (f64, Vec<f64>) {
    let exp_cutoff = cutoff.exp();
    let exceedances = log_tail
        .iter()
        .map(|value| value.exp() - exp_cutoff)
        .collect::<Vec<_>>();
    let (k, sigma) = fit_generalized_pareto(&exceedances);
    if !(k.is_finite() && sigma.is_finite() && sigma > 0.0) {
        return (k, log_tail.to_vec());
    }
    let len = usize_to_f64(log_tail.len());
    let smoothed = (0..log_tail.len())
        .map(|index| {
            let probability = (usize_to_f64(index) + 0.5) / len;
            (generalized_pareto_quantile(probability, k, sigma) + exp_cutoff).ln()
        })
        .collect();
    (k, smoothed)
}

fn generalized_pareto_quantile(probability: f64, k: f64, sigma: f64) -> f64 {
    if k.abs() < f64::EPSILON {
        return -sigma * (-probability).ln_1p();
    }
    sigma * (-k * (-probability).ln_1p()).exp_m1() / k
}

/// Zhang & Stephens (2009) estimate of the generalized Pareto shape `k` and
/// scale `sigma` for ascending exceedances, with the weakly informative
/// adjustment toward `k = 0.5` used by PSIS.
#[must_use]
pub fn fit_generalized_pareto(sorted_exceedances: &[f64]) -> (f64, f64) {
    const PRIOR: f64 = 3.0;
    const MIN_GRID_POINTS: usize = 30;

    let n = sorted_exceedances.len();
    if n == 0 {
        return (f64::INFINITY, f64::NAN);
    }
    let n_f64 = usize_to_f64(n);
    let grid_len = MIN_GRID_POINTS + n_f64.sqrt().floor().to_usize().unwrap_or(0);
    let quartile_index = (n_f64 / 4.0 + 0.5)
        .floor()
        .to_usize()
        .unwrap_or(1)
        .clamp(1, n);
    let x_star = sorted_exceedances[quartile_index - 1];
    let x_max = sorted_exceedances[n - 1];
    if !(x_star > 0.0 && x_max > 0.0) {
        return (f64::INFINITY, f64::NAN);
    }

    let grid_f64 = usize_to_f64(grid_len);
    let theta = (1..=grid_len)
        .map(|j| {
            1.0 / x_max + (1.0 - (grid_f64 / (usize_to_f64(j) - 0.5)).sqrt()) / PRIOR / x_star
        })
        .collect::<Vec<_>>();
    let profile = theta
        .iter()
        .map(|value| n_f64 * profile_log_likelihood(*value, sorted_exceedances))
        .collect::<Vec<_>>();
    let normalizer = log_sum_exp(&profile);
    let theta_hat = theta
        .iter()
        .zip(&profile)
        .map(|(value, log_lik)| value * (log_lik - normalizer).exp())
        .filter(|term| term.is_finite())
        .sum::<f64>();

    let k = mean(
        &sorted_exceedances
            .iter()
            .map(|value| (-theta_hat * value).ln_1p())
            .collect::<Vec<_>>(),
    );
    let sigma = -k / theta_hat;
    let adjusted = (k * n_f64 + 0.5 * 10.0) / (n_f64 + 10.0);
    if adjusted.is_nan() {
        return (f64::INFINITY, sigma);
    }
    (adjusted, sigma)
}

fn profile_log_likelihood(theta: f64, exceedances: &[f64]) -> f64 {
    let a = -theta;
    let k = mean(
        &exceedances
            .iter()
            .map(|value| (a * value).ln_1p())
            .collect::<Vec<_>>(),
    );
    let value = (a / k).ln() - k - 1.0;
    if value.is_nan() { f64::NEG_INFINITY } else { value }
}
