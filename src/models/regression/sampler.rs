/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Blocked Gibbs sampler for Gaussian linear regression with Normal or horseshoe priors.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Blocked Gibbs sampler for Gaussian regression.
//!
//! One sweep updates, in order:
//! 1. all coefficients jointly from their Gaussian full conditional,
//! 2. `sigma` by an adaptive random walk on `log(sigma)`,
//! 3. under a horseshoe prior, the local scales `lambda_j²`, the global scale
//!    `tau²` and their inverse-gamma auxiliaries (Makalic & Schmidt, 2016).
//!
//! Chains are independent, seeded with `seed + i * seed_stride`, and run on
//! scoped threads at most `cores` at a time. The returned chains are in chain
//! order regardless of scheduling, so a fit is reproducible from its seed.

use std::time::{Duration, Instant};

use faer::Mat;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing::debug;

use crate::inference::ProposalStats;
use crate::utils::{
    backward_substitute_transpose, cholesky_lower, forward_substitute, sample_inverse_gamma,
    sample_standard_normal, usize_to_f64,
};

use super::likelihood::SufficientStatistics;
use super::posterior::{ChainSamples, PosteriorDraw};
use super::priors::{Prior, log_exponential_density};
use super::types::{ChainDiagnostics, FitError, FitOptions, ProposalTuning};

const SCALE_MIN: f64 = 1e-10;
const SCALE_MAX: f64 = 1e10;
const RIDGE_L2: f64 = 1.0e-8;
const INITIAL_JITTER: f64 = 0.1;
/// Upper bound on draws reserved up front; longer chains grow on demand.
const MAX_PREALLOCATED_DRAWS: usize = 4_096;

/// Horseshoe scale-mixture state for the slopes.
#[derive(Debug, Clone)]
struct HorseshoeState {
    scale_global: f64,
    lambda_sq: Vec<f64>,
    nu: Vec<f64>,
    tau_sq: f64,
    xi: f64,
}

#[derive(Debug, Clone)]
struct ChainState {
    coefficients: Vec<f64>,
    sigma: f64,
    horseshoe: Option<HorseshoeState>,
}

impl ChainState {
    fn is_finite(&self) -> bool {
        self.sigma.is_finite()
            && self.sigma > 0.0
            && self.coefficients.iter().all(|value| value.is_finite())
            && self.horseshoe.as_ref().is_none_or(|horseshoe| {
                horseshoe.tau_sq.is_finite()
                    && horseshoe.lambda_sq.iter().all(|value| value.is_finite())
            })
    }

    fn draw(&self) -> PosteriorDraw {
        PosteriorDraw {
            coefficients: self.coefficients.clone(),
            sigma: self.sigma,
            tau: self.horseshoe.as_ref().map(|horseshoe| horseshoe.tau_sq.sqrt()),
        }
    }
}

struct SamplerContext<'a> {
    stats: &'a SufficientStatistics,
    options: &'a FitOptions,
    started: Instant,
}

struct ChainOutcome {
    samples: ChainSamples,
    diagnostics: ChainDiagnostics,
}

/// Run every configured chain and return their draws in chain order.
///
/// # Errors
///
/// Returns the error of the lowest-indexed failing chain: a singular
/// posterior precision, a non-finite state, an exhausted time budget, or a
/// panicked sampling thread.
pub fn sample_chains(
    stats: &SufficientStatistics,
    options: &FitOptions,
) -> Result<(Vec<ChainSamples>, Vec<ChainDiagnostics>), FitError> {
    options.validate()?;
    let config = options.sampler;
    let context = SamplerContext {
        stats,
        options,
        started: Instant::now(),
    };
    let context_ref = &context;

    let mut chain_results = (0..config.chains)
        .map(|_| None)
        .collect::<Vec<Option<Result<ChainOutcome, FitError>>>>();
    let chain_indices = (0..config.chains).collect::<Vec<_>>();

    for wave in chain_indices.chunks(config.cores) {
        std::thread::scope(|scope| {
            let handles = wave
                .iter()
                .map(|&chain| {
                    let seed = config.chain_seed(chain);
                    (
                        chain,
                        scope.spawn(move || run_chain(context_ref, chain, seed)),
                    )
                })
                .collect::<Vec<_>>();
            for (chain, handle) in handles {
                chain_results[chain] = Some(
                    handle
                        .join()
                        .unwrap_or(Err(FitError::ChainPanicked(chain))),
                );
            }
        });
    }

    let mut chains = Vec::with_capacity(config.chains);
    let mut diagnostics = Vec::with_capacity(config.chains);
    for (chain, result) in chain_results.into_iter().enumerate() {
        let outcome = result.ok_or(FitError::ChainPanicked(chain))??;
        chains.push(outcome.samples);
        diagnostics.push(outcome.diagnostics);
    }
    Ok((chains, diagnostics))
}

fn run_chain(
    context: &SamplerContext<'_>,
    chain: usize,
    seed: u64,
) -> Result<ChainOutcome, FitError> {
    let config = context.options.sampler;
    let tuning = context.options.tuning;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = initialize_state(context, &mut rng)
        .ok_or(FitError::SolveFailed { chain, iteration: 0 })?;
    debug!(chain, seed, sigma = state.sigma, "starting chain");

    let mut log_sigma_scale = tuning.log_sigma_draw_scale;
    let mut window = ProposalStats::default();
    let mut retained_stats = ProposalStats::default();
    let mut draws = Vec::with_capacity(config.retained_draws().min(MAX_PREALLOCATED_DRAWS));

    for iteration in 0..config.iterations {
        if let Some(budget) = config.time_budget {
            check_budget(context.started, budget, chain, iteration)?;
        }

        if !update_coefficients(context, &mut rng, &mut state) {
            return Err(FitError::SolveFailed { chain, iteration });
        }
        let accepted = update_sigma(context, &mut rng, &mut state, log_sigma_scale);
        if let Some(horseshoe) = state.horseshoe.as_mut() {
            update_horseshoe(&mut rng, horseshoe, &state.coefficients[1..], state.sigma);
        }
        if !state.is_finite() {
            return Err(FitError::NonFiniteState { chain, iteration });
        }

        window.record(accepted);
        if iteration < config.warmup {
            if (iteration + 1).is_multiple_of(tuning.adaptation_interval) {
                log_sigma_scale =
                    adapt_scalar_scale(log_sigma_scale, window.acceptance_rate(), tuning);
                window = ProposalStats::default();
            }
        } else {
            retained_stats.record(accepted);
            if (iteration - config.warmup).is_multiple_of(config.thin) {
                draws.push(state.draw());
            }
        }
    }

    let diagnostics = ChainDiagnostics {
        seed,
        iterations_completed: config.iterations,
        retained_draws: draws.len(),
        sigma_acceptance: retained_stats.acceptance_rate(),
        final_log_sigma_scale: log_sigma_scale,
    };
    debug!(
        chain,
        retained = diagnostics.retained_draws,
        sigma_acceptance = diagnostics.sigma_acceptance,
        "chain complete"
    );
    Ok(ChainOutcome {
        samples: ChainSamples { draws },
        diagnostics,
    })
}

fn check_budget(
    started: Instant,
    budget: Duration,
    chain: usize,
    iterations_completed: usize,
) -> Result<(), FitError> {
    let elapsed = started.elapsed();
    if elapsed > budget {
        return Err(FitError::BudgetExceeded {
            budget,
            elapsed,
            chain,
            iterations_completed,
        });
    }
    Ok(())
}

/// Start from a lightly ridged least-squares fit with a seeded jitter so
/// chains begin at distinct, plausible points.
fn initialize_state(context: &SamplerContext<'_>, rng: &mut StdRng) -> Option<ChainState> {
    let stats = context.stats;
    let dim = stats.xty.len();
    let ridge = RIDGE_L2 * (0..dim).map(|j| stats.xtx[(j, j)]).fold(1.0, f64::max);
    let information = Mat::from_fn(dim, dim, |row, col| {
        stats.xtx[(row, col)] + if row == col { ridge } else { 0.0 }
    });
    let lower = cholesky_lower(&information)?;
    let least_squares =
        backward_substitute_transpose(&lower, &forward_substitute(&lower, &stats.xty));

    let residual_df = stats.n_obs.saturating_sub(dim).max(1);
    let rss = stats.residual_sum_of_squares(&least_squares);
    let spread = (rss / usize_to_f64(residual_df)).sqrt().max(1.0e-3);
    let sigma = spread * (INITIAL_JITTER * sample_standard_normal(rng)).exp();
    let coefficients = least_squares
        .iter()
        .map(|value| (INITIAL_JITTER * spread).mul_add(sample_standard_normal(rng), *value))
        .collect();

    let horseshoe = match context.options.priors.coefficients() {
        Prior::Horseshoe { scale_global } => Some(HorseshoeState {
            scale_global,
            lambda_sq: vec![1.0; dim - 1],
            nu: vec![1.0; dim - 1],
            tau_sq: (scale_global * scale_global).clamp(SCALE_MIN, SCALE_MAX),
            xi: 1.0,
        }),
        _ => None,
    };

    Some(ChainState {
        coefficients,
        sigma,
        horseshoe,
    })
}

/// Prior precision and mean for every coefficient at the current scales.
fn coefficient_prior(context: &SamplerContext<'_>, state: &ChainState) -> (Vec<f64>, Vec<f64>) {
    let dim = state.coefficients.len();
    let mut precision = Vec::with_capacity(dim);
    let mut mean = Vec::with_capacity(dim);

    match context.options.priors.intercept() {
        Prior::Normal { mean: m, sd } => {
            precision.push(1.0 / (sd * sd));
            mean.push(m);
        }
        _ => {
            precision.push(0.0);
            mean.push(0.0);
        }
    }
    for slope in 0..dim - 1 {
        match (context.options.priors.coefficients(), &state.horseshoe) {
            (Prior::Normal { mean: m, sd }, _) => {
                precision.push(1.0 / (sd * sd));
                mean.push(m);
            }
            (Prior::Horseshoe { .. }, Some(horseshoe)) => {
                let variance =
                    state.sigma * state.sigma * horseshoe.tau_sq * horseshoe.lambda_sq[slope];
                precision.push(1.0 / variance.max(f64::MIN_POSITIVE));
                mean.push(0.0);
            }
            _ => {
                precision.push(0.0);
                mean.push(0.0);
            }
        }
    }
    (precision, mean)
}

/// Draw `theta ~ N(Q⁻¹ b, Q⁻¹)` with `Q = XᵀX / sigma² + D` and
/// `b = Xᵀy / sigma² + D m`. Returns `false` if `Q` is not positive definite.
fn update_coefficients(
    context: &SamplerContext<'_>,
    rng: &mut StdRng,
    state: &mut ChainState,
) -> bool {
    let stats = context.stats;
    let dim = state.coefficients.len();
    let inv_sigma_sq = 1.0 / (state.sigma * state.sigma);
    let (prior_precision, prior_mean) = coefficient_prior(context, state);

    let precision = Mat::from_fn(dim, dim, |row, col| {
        let diagonal = if row == col { prior_precision[row] } else { 0.0 };
        stats.xtx[(row, col)].mul_add(inv_sigma_sq, diagonal)
    });
    let Some(lower) = cholesky_lower(&precision) else {
        return false;
    };
    let rhs = (0..dim)
        .map(|j| stats.xty[j].mul_add(inv_sigma_sq, prior_precision[j] * prior_mean[j]))
        .collect::<Vec<_>>();
    let mean = backward_substitute_transpose(&lower, &forward_substitute(&lower, &rhs));
    let noise = (0..dim)
        .map(|_| sample_standard_normal(rng))
        .collect::<Vec<_>>();
    let offset = backward_substitute_transpose(&lower, &noise);

    for ((coefficient, mean), offset) in state.coefficients.iter_mut().zip(mean).zip(offset) {
        *coefficient = mean + offset;
    }
    true
}

/// Unnormalized log conditional of `log(sigma)`, Jacobian included.
fn log_sigma_target(context: &SamplerContext<'_>, state: &ChainState, sigma: f64) -> f64 {
    let stats = context.stats;
    let sigma_sq = sigma * sigma;
    let rss = stats.residual_sum_of_squares(&state.coefficients);
    let mut log_target = -usize_to_f64(stats.n_obs) * sigma.ln() - rss / (2.0 * sigma_sq);

    if let Some(horseshoe) = &state.horseshoe {
        let slopes = &state.coefficients[1..];
        let weighted = slopes
            .iter()
            .zip(&horseshoe.lambda_sq)
            .map(|(beta, lambda_sq)| beta * beta / lambda_sq)
            .sum::<f64>();
        log_target -= usize_to_f64(slopes.len()).mul_add(
            sigma.ln(),
            weighted / (2.0 * sigma_sq * horseshoe.tau_sq),
        );
    }
    if let Prior::Exponential { rate } = context.options.priors.sigma() {
        log_target += log_exponential_density(sigma, rate);
    }
    log_target + sigma.ln()
}

fn update_sigma(
    context: &SamplerContext<'_>,
    rng: &mut StdRng,
    state: &mut ChainState,
    log_sigma_scale: f64,
) -> bool {
    let current = state.sigma;
    let proposal = (state.sigma.ln() + log_sigma_scale * sample_standard_normal(rng)).exp();
    if !(proposal.is_finite() && proposal > 0.0) {
        return false;
    }
    let log_acceptance =
        log_sigma_target(context, state, proposal) - log_sigma_target(context, state, current);
    let accepted = should_accept(log_acceptance, rng);
    if accepted {
        state.sigma = proposal;
    }
    accepted
}

fn update_horseshoe(
    rng: &mut StdRng,
    horseshoe: &mut HorseshoeState,
    slopes: &[f64],
    sigma: f64,
) {
    let sigma_sq = sigma * sigma;
    for (slope, beta) in slopes.iter().enumerate() {
        let half_beta_sq = 0.5 * beta * beta / sigma_sq;
        horseshoe.lambda_sq[slope] = sample_inverse_gamma(
            rng,
            1.0,
            1.0 / horseshoe.nu[slope] + half_beta_sq / horseshoe.tau_sq,
        )
        .clamp(SCALE_MIN, SCALE_MAX);
        horseshoe.nu[slope] =
            sample_inverse_gamma(rng, 1.0, 1.0 + 1.0 / horseshoe.lambda_sq[slope])
                .clamp(SCALE_MIN, SCALE_MAX);
    }

    let weighted = slopes
        .iter()
        .zip(&horseshoe.lambda_sq)
        .map(|(beta, lambda_sq)| beta * beta / lambda_sq)
        .sum::<f64>();
    let shape = 0.5 * (usize_to_f64(slopes.len()) + 1.0);
    horseshoe.tau_sq =
        sample_inverse_gamma(rng, shape, 1.0 / horseshoe.xi + 0.5 * weighted / sigma_sq)
            .clamp(SCALE_MIN, SCALE_MAX);
    let global_sq = horseshoe.scale_global * horseshoe.scale_global;
    horseshoe.xi = sample_inverse_gamma(rng, 1.0, 1.0 / global_sq + 1.0 / horseshoe.tau_sq)
        .clamp(SCALE_MIN, SCALE_MAX);
}

fn should_accept(log_acceptance: f64, rng: &mut StdRng) -> bool {
    log_acceptance >= 0.0 || rng.random::<f64>().ln() < log_acceptance
}

fn adapt_scalar_scale(scale: f64, acceptance: f64, tuning: ProposalTuning) -> f64 {
    (scale * adaptation_factor(acceptance, tuning)).max(tuning.min_draw_scale)
}

fn adaptation_factor(acceptance: f64, tuning: ProposalTuning) -> f64 {
    if acceptance < tuning.acceptance_target_low {
        tuning.scale_decrease_factor
    } else if acceptance > tuning.acceptance_target_high {
        tuning.scale_increase_factor
    } else {
        1.0
    }
}
