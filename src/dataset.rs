//! # Datasets
//!
//! Column-oriented container for simulated observations. Continuous columns
//! hold `f64` values (`NaN` marks a missing entry); categorical columns hold
//! level codes into an ordered level list, with the first level acting as the
//! reference category when a design matrix is built.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned when assembling or querying a dataset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatasetError {
    #[error("column `{name}` has {found} rows; expected {expected}")]
    RowCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("column `{0}` is defined more than once")]
    DuplicateColumn(String),
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("categorical column `{name}` has code {code} but only {levels} levels")]
    InvalidLevelCode {
        name: String,
        code: usize,
        levels: usize,
    },
    #[error("column `{0}` is not continuous")]
    NotContinuous(String),
}

/// Values stored in a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ColumnData {
    Continuous(Vec<f64>),
    Categorical { levels: Vec<String>, codes: Vec<usize> },
}

impl ColumnData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Continuous(values) => values.len(),
            Self::Categorical { codes, .. } => codes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous(_))
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    #[must_use]
    pub fn continuous(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Continuous(values),
        }
    }

    #[must_use]
    pub fn categorical(name: impl Into<String>, levels: Vec<String>, codes: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical { levels, codes },
        }
    }

    /// Level label of row `row` for categorical columns.
    #[must_use]
    pub fn level_at(&self, row: usize) -> Option<&str> {
        match &self.data {
            ColumnData::Categorical { levels, codes } => codes
                .get(row)
                .and_then(|code| levels.get(*code))
                .map(String::as_str),
            ColumnData::Continuous(_) => None,
        }
    }
}

/// Rectangular collection of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    /// Build a dataset, checking column lengths, names and level codes.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError` if columns are inconsistent.
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let n_rows = columns.first().map_or(0, |column| column.data.len());
        for (index, column) in columns.iter().enumerate() {
            if columns[..index].iter().any(|other| other.name == column.name) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
            if column.data.len() != n_rows {
                return Err(DatasetError::RowCountMismatch {
                    name: column.name.clone(),
                    expected: n_rows,
                    found: column.data.len(),
                });
            }
            if let ColumnData::Categorical { levels, codes } = &column.data
                && let Some(code) = codes.iter().copied().find(|code| *code >= levels.len())
            {
                return Err(DatasetError::InvalidLevelCode {
                    name: column.name.clone(),
                    code,
                    levels: levels.len(),
                });
            }
        }
        Ok(Self { columns, n_rows })
    }

    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Values of a continuous column.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError` if the column is missing or categorical.
    pub fn continuous(&self, name: &str) -> Result<&[f64], DatasetError> {
        match self.column(name).map(|column| &column.data) {
            Some(ColumnData::Continuous(values)) => Ok(values),
            Some(ColumnData::Categorical { .. }) => Err(DatasetError::NotContinuous(name.into())),
            None => Err(DatasetError::UnknownColumn(name.into())),
        }
    }

    /// Replace the values of an existing continuous column.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError` if the column is missing, categorical, or the
    /// replacement has the wrong length.
    pub fn replace_continuous(&mut self, name: &str, values: Vec<f64>) -> Result<(), DatasetError> {
        if values.len() != self.n_rows {
            return Err(DatasetError::RowCountMismatch {
                name: name.into(),
                expected: self.n_rows,
                found: values.len(),
            });
        }
        let column = self
            .columns
            .iter_mut()
            .find(|column| column.name == name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.into()))?;
        match &mut column.data {
            ColumnData::Continuous(existing) => {
                *existing = values;
                Ok(())
            }
            ColumnData::Categorical { .. } => Err(DatasetError::NotContinuous(name.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let err = Dataset::new(vec![
            Column::continuous("a", vec![1.0, 2.0]),
            Column::continuous("b", vec![1.0]),
        ])
        .expect_err("ragged columns should fail");
        assert_eq!(
            err,
            DatasetError::RowCountMismatch {
                name: "b".into(),
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn new_rejects_out_of_range_level_codes() {
        let err = Dataset::new(vec![Column::categorical(
            "sex",
            levels(&["female", "male"]),
            vec![0, 2],
        )])
        .expect_err("code 2 is out of range");
        assert!(matches!(err, DatasetError::InvalidLevelCode { code: 2, .. }));
    }

    #[test]
    fn new_rejects_duplicate_names() {
        let err = Dataset::new(vec![
            Column::continuous("a", vec![1.0]),
            Column::continuous("a", vec![2.0]),
        ])
        .expect_err("duplicate names should fail");
        assert_eq!(err, DatasetError::DuplicateColumn("a".into()));
    }

    #[test]
    fn replace_continuous_keeps_categorical_columns_immutable() {
        let mut data = Dataset::new(vec![
            Column::continuous("a", vec![1.0, 2.0]),
            Column::categorical("sex", levels(&["female", "male"]), vec![0, 1]),
        ])
        .expect("valid dataset");
        data.replace_continuous("a", vec![3.0, 4.0])
            .expect("replace continuous");
        assert_eq!(data.continuous("a").expect("column"), &[3.0, 4.0]);
        assert!(matches!(
            data.replace_continuous("sex", vec![0.0, 1.0]),
            Err(DatasetError::NotContinuous(_))
        ));
        assert_eq!(data.column("sex").and_then(|c| c.level_at(1)), Some("male"));
    }
}
