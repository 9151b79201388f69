//! # Model inputs
//!
//! Turns a dataset and a formula into a model frame: an intercept-first
//! design matrix with treatment-coded factors, the outcome column, and the
//! coefficient names the posterior is reported under.
//!
//! # Examples
//!
//! ```
//! use shrinkage_models::{Column, Dataset, Formula, ModelFrame};
//!
//! let data = Dataset::new(vec![
//!     Column::continuous("y", vec![1.0, 2.0, 4.0]),
//!     Column::continuous("x", vec![0.5, 1.5, 2.5]),
//!     Column::categorical("sex", vec!["female".into(), "male".into()], vec![0, 1, 1]),
//! ])
//! .expect("dataset");
//! let formula = Formula::parse("y ~ x + sex").expect("formula");
//! let frame = ModelFrame::new(&data, &formula).expect("frame");
//!
//! assert_eq!(frame.coefficient_names, vec!["Intercept", "x", "sexmale"]);
//! assert_eq!(frame.design_matrix.ncols(), 3);
//! ```

use faer::Mat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod formula;

pub use formula::{Formula, FormulaError};

use crate::dataset::{ColumnData, Dataset};

/// Name of the intercept coefficient.
pub const INTERCEPT: &str = "Intercept";

/// Errors returned when building or validating a model frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("response `{0}` must be continuous")]
    CategoricalResponse(String),
    #[error("`{column}` has a non-finite value in row {row}")]
    NonFiniteValue { column: String, row: usize },
    #[error("dataset has no rows")]
    EmptyData,
    #[error("design matrix rows ({rows}) must match outcome rows ({len})")]
    DimensionMismatch { rows: usize, len: usize },
    #[error("{names} coefficient names for {cols} design columns")]
    NameMismatch { names: usize, cols: usize },
}

/// Design matrix, outcome and coefficient labels for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ModelFrameRecord", into = "ModelFrameRecord")]
pub struct ModelFrame {
    pub formula: Formula,
    pub design_matrix: Mat<f64>,
    pub outcome: Mat<f64>,
    pub coefficient_names: Vec<String>,
}

impl ModelFrame {
    /// Build the frame for `formula` over `dataset`.
    ///
    /// # Errors
    ///
    /// Returns `InputError` naming the offending field when the formula does
    /// not match the dataset or a value is missing.
    pub fn new(dataset: &Dataset, formula: &Formula) -> Result<Self, InputError> {
        let n_rows = dataset.n_rows();
        if n_rows == 0 {
            return Err(InputError::EmptyData);
        }
        let predictors = formula.predictors(dataset)?;

        let response = formula.response();
        let outcome_values = match dataset.column(response).map(|column| &column.data) {
            Some(ColumnData::Continuous(values)) => values,
            Some(ColumnData::Categorical { .. }) => {
                return Err(InputError::CategoricalResponse(response.to_string()));
            }
            None => return Err(FormulaError::UnknownColumn(response.to_string()).into()),
        };
        check_finite(response, outcome_values)?;

        let mut coefficient_names = vec![INTERCEPT.to_string()];
        let mut design_columns: Vec<Vec<f64>> = vec![vec![1.0; n_rows]];
        for name in &predictors {
            let Some(column) = dataset.column(name) else {
                return Err(FormulaError::UnknownColumn(name.clone()).into());
            };
            match &column.data {
                ColumnData::Continuous(values) => {
                    check_finite(name, values)?;
                    coefficient_names.push(name.clone());
                    design_columns.push(values.clone());
                }
                ColumnData::Categorical { levels, codes } => {
                    for (code, level) in levels.iter().enumerate().skip(1) {
                        coefficient_names.push(format!("{name}{level}"));
                        design_columns.push(
                            codes
                                .iter()
                                .map(|value| if *value == code { 1.0 } else { 0.0 })
                                .collect(),
                        );
                    }
                }
            }
        }

        let design_matrix = Mat::from_fn(n_rows, design_columns.len(), |row, col| {
            design_columns[col][row]
        });
        let outcome = Mat::from_fn(n_rows, 1, |row, _| outcome_values[row]);
        Ok(Self {
            formula: formula.clone(),
            design_matrix,
            outcome,
            coefficient_names,
        })
    }

    #[must_use]
    pub fn n_obs(&self) -> usize {
        self.outcome.nrows()
    }

    #[must_use]
    pub fn n_coefficients(&self) -> usize {
        self.design_matrix.ncols()
    }

    /// Position of a coefficient by name.
    #[must_use]
    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|candidate| candidate == name)
    }

    /// Validate shapes and finiteness.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the frame is malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.outcome.nrows() == 0 {
            return Err(InputError::EmptyData);
        }
        if self.design_matrix.nrows() != self.outcome.nrows() || self.outcome.ncols() != 1 {
            return Err(InputError::DimensionMismatch {
                rows: self.design_matrix.nrows(),
                len: self.outcome.nrows(),
            });
        }
        if self.coefficient_names.len() != self.design_matrix.ncols() {
            return Err(InputError::NameMismatch {
                names: self.coefficient_names.len(),
                cols: self.design_matrix.ncols(),
            });
        }
        for col in 0..self.design_matrix.ncols() {
            for row in 0..self.design_matrix.nrows() {
                if !self.design_matrix[(row, col)].is_finite() {
                    return Err(InputError::NonFiniteValue {
                        column: self.coefficient_names[col].clone(),
                        row,
                    });
                }
            }
        }
        for row in 0..self.outcome.nrows() {
            if !self.outcome[(row, 0)].is_finite() {
                return Err(InputError::NonFiniteValue {
                    column: self.formula.response().to_string(),
                    row,
                });
            }
        }
        Ok(())
    }
}

fn check_finite(column: &str, values: &[f64]) -> Result<(), InputError> {
    values
        .iter()
        .position(|value| !value.is_finite())
        .map_or(Ok(()), |row| {
            Err(InputError::NonFiniteValue {
                column: column.to_string(),
                row,
            })
        })
}

/// Serializable row-major snapshot of a `ModelFrame`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFrameRecord {
    formula: Formula,
    coefficient_names: Vec<String>,
    n_rows: usize,
    design: Vec<f64>,
    outcome: Vec<f64>,
}

impl From<ModelFrame> for ModelFrameRecord {
    fn from(frame: ModelFrame) -> Self {
        let n_rows = frame.design_matrix.nrows();
        let n_cols = frame.design_matrix.ncols();
        let mut design = Vec::with_capacity(n_rows * n_cols);
        for row in 0..n_rows {
            for col in 0..n_cols {
                design.push(frame.design_matrix[(row, col)]);
            }
        }
        let outcome = (0..frame.outcome.nrows())
            .map(|row| frame.outcome[(row, 0)])
            .collect();
        Self {
            formula: frame.formula,
            coefficient_names: frame.coefficient_names,
            n_rows,
            design,
            outcome,
        }
    }
}

impl TryFrom<ModelFrameRecord> for ModelFrame {
    type Error = InputError;

    fn try_from(record: ModelFrameRecord) -> Result<Self, Self::Error> {
        let n_cols = record.coefficient_names.len();
        if record.outcome.len() != record.n_rows || record.design.len() != record.n_rows * n_cols {
            return Err(InputError::DimensionMismatch {
                rows: record.n_rows,
                len: record.outcome.len(),
            });
        }
        let frame = Self {
            formula: record.formula,
            design_matrix: Mat::from_fn(record.n_rows, n_cols, |row, col| {
                record.design[row * n_cols + col]
            }),
            outcome: Mat::from_fn(record.n_rows, 1, |row, _| record.outcome[row]),
            coefficient_names: record.coefficient_names,
        };
        frame.validate()?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Column::continuous("y", vec![1.0, 2.0, 3.0, 4.0]),
            Column::continuous("x", vec![0.1, 0.2, 0.3, 0.4]),
            Column::categorical(
                "children",
                vec!["0".into(), "1".into(), "2".into()],
                vec![0, 1, 2, 1],
            ),
        ])
        .expect("dataset")
    }

    #[test]
    fn factors_are_treatment_coded_against_first_level() {
        let formula = Formula::parse("y ~ children + x").expect("formula");
        let frame = ModelFrame::new(&dataset(), &formula).expect("frame");
        assert_eq!(
            frame.coefficient_names,
            vec!["Intercept", "children1", "children2", "x"]
        );
        assert!((frame.design_matrix[(0, 0)] - 1.0).abs() < f64::EPSILON);
        assert!(frame.design_matrix[(0, 1)].abs() < f64::EPSILON);
        assert!((frame.design_matrix[(3, 1)] - 1.0).abs() < f64::EPSILON);
        assert!((frame.design_matrix[(2, 2)] - 1.0).abs() < f64::EPSILON);
        assert_eq!(frame.coefficient_index("x"), Some(3));
    }

    #[test]
    fn missing_values_name_the_column() {
        let mut data = dataset();
        data.replace_continuous("x", vec![0.1, f64::NAN, 0.3, 0.4])
            .expect("replace");
        let formula = Formula::parse("y ~ x").expect("formula");
        assert_eq!(
            ModelFrame::new(&data, &formula).expect_err("nan"),
            InputError::NonFiniteValue {
                column: "x".into(),
                row: 1
            }
        );
    }

    #[test]
    fn categorical_response_is_rejected() {
        let formula = Formula::parse("children ~ x").expect("formula");
        assert_eq!(
            ModelFrame::new(&dataset(), &formula).expect_err("categorical response"),
            InputError::CategoricalResponse("children".into())
        );
    }

    #[test]
    fn frame_survives_a_json_round_trip() {
        let formula = Formula::parse("y ~ .").expect("formula");
        let frame = ModelFrame::new(&dataset(), &formula).expect("frame");
        let json = serde_json::to_string(&frame).expect("serialize");
        let restored: ModelFrame = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.coefficient_names, frame.coefficient_names);
        assert!((restored.design_matrix[(3, 2)] - frame.design_matrix[(3, 2)]).abs() < 1e-15);
    }
}
