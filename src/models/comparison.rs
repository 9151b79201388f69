/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Model comparison by expected log predictive density (PSIS-LOO).
//
// Created on: 25 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Model comparison
//!
//! Ranks fitted models by their leave-one-out expected log predictive density.
//! Every model must carry a LOO estimate over the same observations; the
//! differences are taken against the best model pointwise so the standard
//! error accounts for the correlation between the two estimates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::loo::LooEstimate;
use crate::models::regression::FittedModel;
use crate::utils::{mean, sample_variance, usize_to_f64};

#[derive(Debug, Error, PartialEq)]
pub enum ComparisonError {
    #[error("at least two models are required for a comparison, got {0}")]
    TooFewModels(usize),
    #[error("model `{0}` has no LOO estimate attached")]
    MissingLoo(String),
    #[error("model `{model}` has {found} pointwise estimates, expected {expected}")]
    ObservationMismatch {
        model: String,
        expected: usize,
        found: usize,
    },
}

/// One ranked entry of a LOO comparison.
///
/// The first row is the best model; its `elpd_diff` and `se_diff` are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub name: String,
    pub elpd_diff: f64,
    pub se_diff: f64,
    pub elpd_loo: f64,
    pub se_elpd_loo: f64,
    pub p_loo: f64,
    pub looic: f64,
}

/// Compare fitted models by their attached LOO estimates.
///
/// # Errors
///
/// Returns `ComparisonError` if fewer than two models are given, any model is
/// missing its LOO estimate, or the models disagree on the observation count.
pub fn compare_models(models: &[FittedModel]) -> Result<Vec<ComparisonRow>, ComparisonError> {
    let entries = models
        .iter()
        .map(|model| {
            model
                .loo()
                .map(|estimate| (model.name(), estimate))
                .ok_or_else(|| ComparisonError::MissingLoo(model.name().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    compare_loo(&entries)
}

/// Rank named LOO estimates by `elpd_loo`, best first.
///
/// Ties keep their input order.
///
/// # Errors
///
/// Returns `ComparisonError` if fewer than two estimates are given or their
/// pointwise vectors differ in length.
pub fn compare_loo(entries: &[(&str, &LooEstimate)]) -> Result<Vec<ComparisonRow>, ComparisonError> {
    if entries.len() < 2 {
        return Err(ComparisonError::TooFewModels(entries.len()));
    }

    let expected = entries[0].1.n_obs();
    for (name, estimate) in entries {
        if estimate.n_obs() != expected {
            return Err(ComparisonError::ObservationMismatch {
                model: (*name).to_string(),
                expected,
                found: estimate.n_obs(),
            });
        }
    }

    let mut order = (0..entries.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| entries[b].1.elpd_loo.total_cmp(&entries[a].1.elpd_loo));

    let best = entries[order[0]].1;
    Ok(order
        .into_iter()
        .map(|index| {
            let (name, estimate) = entries[index];
            let (elpd_diff, se_diff) = elpd_difference(estimate, best);
            ComparisonRow {
                name: name.to_string(),
                elpd_diff,
                se_diff,
                elpd_loo: estimate.elpd_loo,
                se_elpd_loo: estimate.se_elpd_loo,
                p_loo: estimate.p_loo,
                looic: estimate.looic,
            }
        })
        .collect())
}

/// Difference in elpd of `estimate` relative to `reference`, with the
/// standard error of the pointwise differences.
#[must_use]
pub fn elpd_difference(estimate: &LooEstimate, reference: &LooEstimate) -> (f64, f64) {
    let diffs = estimate
        .pointwise_elpd
        .iter()
        .zip(&reference.pointwise_elpd)
        .map(|(a, b)| a - b)
        .collect::<Vec<_>>();
    if diffs.is_empty() {
        return (0.0, 0.0);
    }
    let n = usize_to_f64(diffs.len());
    let total = diffs.iter().sum::<f64>();
    let variance = if diffs.len() > 1 {
        sample_variance(&diffs, mean(&diffs))
    } else {
        0.0
    };
    (total, (n * variance).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimate(pointwise: &[f64]) -> LooEstimate {
        let elpd = pointwise.iter().sum::<f64>();
        LooEstimate {
            elpd_loo: elpd,
            se_elpd_loo: 1.0,
            p_loo: 3.0,
            se_p_loo: 0.5,
            looic: -2.0 * elpd,
            se_looic: 2.0,
            pointwise_elpd: pointwise.to_vec(),
            pareto_k: vec![0.1; pointwise.len()],
            n_draws: 400,
        }
    }

    #[test]
    fn ranks_best_model_first_with_zero_difference() {
        let worse = estimate(&[-1.0, -2.0, -3.0]);
        let better = estimate(&[-0.5, -1.5, -2.0]);
        let rows = compare_loo(&[("naive", &worse), ("horseshoe", &better)]).unwrap();

        assert_eq!(rows[0].name, "horseshoe");
        assert_relative_eq!(rows[0].elpd_diff, 0.0);
        assert_relative_eq!(rows[0].se_diff, 0.0);
        assert_eq!(rows[1].name, "naive");
        assert_relative_eq!(rows[1].elpd_diff, -2.0, epsilon = 1e-12);
        // diffs: -0.5, -0.5, -1.0 -> sample variance 1/12
        assert_relative_eq!(rows[1].se_diff, (3.0_f64 / 12.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn ties_keep_input_order() {
        let a = estimate(&[-1.0, -1.0]);
        let b = estimate(&[-1.5, -0.5]);
        let rows = compare_loo(&[("first", &a), ("second", &b)]).unwrap();
        assert_eq!(rows[0].name, "first");
        assert_eq!(rows[1].name, "second");
    }

    #[test]
    fn rejects_single_model() {
        let a = estimate(&[-1.0]);
        assert_eq!(
            compare_loo(&[("only", &a)]),
            Err(ComparisonError::TooFewModels(1))
        );
    }

    #[test]
    fn rejects_mismatched_observation_counts() {
        let a = estimate(&[-1.0, -2.0]);
        let b = estimate(&[-1.0]);
        let err = compare_loo(&[("a", &a), ("b", &b)]).unwrap_err();
        assert_eq!(
            err,
            ComparisonError::ObservationMismatch {
                model: "b".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }
}
