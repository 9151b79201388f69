//! # Preprocessing
//!
//! Standardization of continuous predictors ahead of model fitting. Missing
//! (non-finite) entries are ignored when estimating location and scale and
//! stay missing in the output.

use thiserror::Error;

use crate::dataset::{ColumnData, Dataset, DatasetError};
use crate::utils::{mean, sample_variance};

/// Errors returned by standardization.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("`{column}` has {found} finite values; standardization needs at least 2")]
    InsufficientData { column: String, found: usize },
    #[error("`{0}` has zero variance and cannot be standardized")]
    ConstantColumn(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Location and scale used to standardize one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standardization {
    pub mean: f64,
    pub sd: f64,
}

impl Standardization {
    /// Estimate mean and sample (n-1) standard deviation over finite values.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessError` if fewer than two finite values remain or the
    /// values are constant.
    pub fn estimate(column: &str, values: &[f64]) -> Result<Self, PreprocessError> {
        let finite = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect::<Vec<_>>();
        if finite.len() < 2 {
            return Err(PreprocessError::InsufficientData {
                column: column.to_string(),
                found: finite.len(),
            });
        }
        let mean = mean(&finite);
        let sd = sample_variance(&finite, mean).sqrt();
        if !(sd > 0.0 && sd.is_finite()) {
            return Err(PreprocessError::ConstantColumn(column.to_string()));
        }
        Ok(Self { mean, sd })
    }

    #[must_use]
    pub fn apply(self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .map(|value| {
                if value.is_finite() {
                    (value - self.mean) / self.sd
                } else {
                    f64::NAN
                }
            })
            .collect()
    }
}

/// `(x - mean(x)) / sd(x)` over finite entries.
///
/// # Errors
///
/// Returns `PreprocessError` if the column cannot be standardized.
pub fn standardize(column: &str, values: &[f64]) -> Result<Vec<f64>, PreprocessError> {
    Ok(Standardization::estimate(column, values)?.apply(values))
}

/// Standardize every continuous column except `outcome`.
///
/// Categorical columns and the outcome are returned unchanged. The returned
/// list records the transformation applied to each standardized column.
///
/// # Errors
///
/// Returns `PreprocessError` naming the first column that cannot be
/// standardized.
pub fn standardize_dataset(
    dataset: &Dataset,
    outcome: &str,
) -> Result<(Dataset, Vec<(String, Standardization)>), PreprocessError> {
    if dataset.column(outcome).is_none() {
        return Err(DatasetError::UnknownColumn(outcome.to_string()).into());
    }
    let mut standardized = dataset.clone();
    let mut applied = Vec::new();
    for column in dataset.columns() {
        if column.name == outcome {
            continue;
        }
        if let ColumnData::Continuous(values) = &column.data {
            let transform = Standardization::estimate(&column.name, values)?;
            standardized.replace_continuous(&column.name, transform.apply(values))?;
            applied.push((column.name.clone(), transform));
        }
    }
    Ok((standardized, applied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use approx::assert_relative_eq;

    #[test]
    fn standardize_centers_and_scales_with_sample_sd() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let z = standardize("x", &values).expect("standardize");
        let m = mean(&z);
        assert_relative_eq!(m, 0.0, epsilon = 1e-12);
        assert_relative_eq!(sample_variance(&z, m).sqrt(), 1.0, epsilon = 1e-12);
        // sample sd of the raw values is sqrt(32 / 7)
        assert_relative_eq!(z[0], (2.0 - 5.0) / (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn standardize_ignores_missing_values() {
        let z = standardize("x", &[1.0, f64::NAN, 3.0]).expect("standardize");
        assert!(z[1].is_nan());
        assert_relative_eq!(z[0], -std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(z[2], std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn standardize_single_value_fails_fast() {
        let err = standardize("age", &[42.0]).expect_err("one value is not enough");
        assert_eq!(
            err,
            PreprocessError::InsufficientData {
                column: "age".into(),
                found: 1
            }
        );
    }

    #[test]
    fn standardize_rejects_constant_column() {
        assert_eq!(
            standardize("pets", &[1.0, 1.0, 1.0]),
            Err(PreprocessError::ConstantColumn("pets".into()))
        );
    }

    #[test]
    fn standardize_dataset_leaves_outcome_and_factors_alone() {
        let data = Dataset::new(vec![
            Column::continuous("y", vec![10.0, 20.0, 30.0]),
            Column::continuous("x", vec![1.0, 2.0, 3.0]),
            Column::categorical("g", vec!["a".into(), "b".into()], vec![0, 1, 0]),
        ])
        .expect("dataset");
        let (out, applied) = standardize_dataset(&data, "y").expect("standardize");
        assert_eq!(out.continuous("y").expect("y"), &[10.0, 20.0, 30.0]);
        assert_eq!(out.continuous("x").expect("x"), &[-1.0, 0.0, 1.0]);
        assert_eq!(out.column("g"), data.column("g"));
        assert_eq!(applied.len(), 1);
        assert_relative_eq!(applied[0].1.mean, 2.0);
    }
}
