//! Reusable inference and MCMC utility types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for sampler configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("chain count must be positive")]
    InvalidChains,
    #[error("iterations must be positive")]
    InvalidIterations,
    #[error("warmup ({warmup}) must be smaller than iterations ({iterations})")]
    InvalidWarmup { warmup: usize, iterations: usize },
    #[error("thinning interval must be positive")]
    InvalidThinning,
    #[error("multi-chain seed stride must be positive")]
    InvalidSeedStride,
    #[error("core count must be positive")]
    InvalidCores,
    #[error("time budget must be positive")]
    InvalidTimeBudget,
}

/// MCMC schedule shared by every chain of a fit.
///
/// `iterations` counts all iterations per chain, warmup included. Chain `i`
/// is seeded with `seed + i * seed_stride` (wrapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub chains: usize,
    pub iterations: usize,
    pub warmup: usize,
    pub thin: usize,
    pub seed: u64,
    pub seed_stride: u64,
    /// Maximum number of chains sampled concurrently.
    pub cores: usize,
    /// Wall-clock budget per fit; exceeding it aborts the fit.
    #[serde(skip)]
    pub time_budget: Option<Duration>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            iterations: 1_000,
            warmup: 500,
            thin: 1,
            seed: 42,
            seed_stride: 10_000,
            cores: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            time_budget: None,
        }
    }
}

impl SamplerConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub fn validate(self) -> Result<(), InferenceError> {
        if self.chains == 0 {
            return Err(InferenceError::InvalidChains);
        }
        if self.iterations == 0 {
            return Err(InferenceError::InvalidIterations);
        }
        if self.warmup >= self.iterations {
            return Err(InferenceError::InvalidWarmup {
                warmup: self.warmup,
                iterations: self.iterations,
            });
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        if self.chains > 1 && self.seed_stride == 0 {
            return Err(InferenceError::InvalidSeedStride);
        }
        if self.cores == 0 {
            return Err(InferenceError::InvalidCores);
        }
        if self.time_budget.is_some_and(|budget| budget.is_zero()) {
            return Err(InferenceError::InvalidTimeBudget);
        }
        Ok(())
    }

    /// Number of retained draws per chain implied by this configuration.
    #[must_use]
    pub const fn retained_draws(self) -> usize {
        (self.iterations - self.warmup).div_ceil(self.thin)
    }

    /// Seed used by chain `chain_index`.
    #[must_use]
    pub fn chain_seed(self, chain_index: usize) -> u64 {
        let index = u64::try_from(chain_index).unwrap_or(u64::MAX);
        self.seed
            .wrapping_add(index.wrapping_mul(self.seed_stride))
    }

    /// Same schedule with iterations and warmup halved, for budget retries.
    #[must_use]
    pub fn halved(self) -> Self {
        let iterations = (self.iterations / 2).max(2);
        let warmup = (self.warmup / 2).min(iterations - 1);
        Self {
            iterations,
            warmup,
            ..self
        }
    }
}

/// Proposal counters for a single Metropolis-Hastings block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl ProposalStats {
    /// Record one proposal and whether it was accepted.
    pub const fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Acceptance rate in `[0, 1]`, or `0` if no proposals were made.
    #[must_use]
    pub fn acceptance_rate(self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            usize_to_f64(self.accepted) / usize_to_f64(self.proposed)
        }
    }
}

fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_rejects_zero_iterations() {
        let config = SamplerConfig {
            iterations: 0,
            ..SamplerConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidIterations));
    }

    #[test]
    fn config_validation_rejects_warmup_past_iterations() {
        let config = SamplerConfig {
            iterations: 100,
            warmup: 100,
            ..SamplerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(InferenceError::InvalidWarmup {
                warmup: 100,
                iterations: 100
            })
        );
    }

    #[test]
    fn retained_draws_counts_thinned_post_warmup_iterations() {
        let config = SamplerConfig {
            iterations: 1_000,
            warmup: 500,
            thin: 1,
            ..SamplerConfig::default()
        };
        assert_eq!(config.retained_draws(), 500);
        let thinned = SamplerConfig { thin: 3, ..config };
        assert_eq!(thinned.retained_draws(), 167);
    }

    #[test]
    fn chain_seeds_are_distinct() {
        let config = SamplerConfig {
            seed: 7,
            seed_stride: 100,
            ..SamplerConfig::default()
        };
        assert_eq!(config.chain_seed(0), 7);
        assert_eq!(config.chain_seed(3), 307);
    }

    #[test]
    fn halved_schedule_stays_valid() {
        let config = SamplerConfig {
            iterations: 3,
            warmup: 2,
            ..SamplerConfig::default()
        };
        let halved = config.halved();
        assert!(halved.validate().is_ok());
        assert_eq!(SamplerConfig::default().halved().iterations, 500);
    }

    #[test]
    fn proposal_stats_tracks_acceptance() {
        let mut stats = ProposalStats::default();
        stats.record(true);
        stats.record(false);
        assert!((stats.acceptance_rate() - 0.5).abs() < 1.0e-12);
    }
}
