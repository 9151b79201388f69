//! Model formulas of the form `response ~ a + b - c`.
//!
//! `.` stands for every column except the response. Terms are resolved
//! against a dataset in order of appearance; removals apply after all
//! additions regardless of position.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Dataset;

/// Errors returned while parsing or resolving a formula.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("formula `{0}` must contain exactly one `~`")]
    MissingTilde(String),
    #[error("formula `{0}` has an empty response")]
    EmptyResponse(String),
    #[error("formula `{formula}` has an empty term at position {position}")]
    EmptyTerm { formula: String, position: usize },
    #[error("invalid term `{0}`; only column names, `.` and `1` are supported")]
    InvalidTerm(String),
    #[error("intercept removal (`{0}`) is not supported")]
    InterceptRemoval(String),
    #[error("term `{0}` appears more than once")]
    DuplicateTerm(String),
    #[error("unknown column `{0}` in formula")]
    UnknownColumn(String),
    #[error("response `{0}` cannot also be a predictor")]
    ResponseAsPredictor(String),
    #[error("formula `{0}` selects no predictors")]
    NoPredictors(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Term {
    All,
    Column(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SignedTerm {
    include: bool,
    term: Term,
}

/// Parsed model formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    response: String,
    terms: Vec<SignedTerm>,
}

impl Formula {
    /// # Errors
    ///
    /// Returns `FormulaError` if the text is not a supported formula.
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let mut sides = text.split('~');
        let (Some(lhs), Some(rhs), None) = (sides.next(), sides.next(), sides.next()) else {
            return Err(FormulaError::MissingTilde(text.to_string()));
        };
        let response = lhs.trim();
        if response.is_empty() {
            return Err(FormulaError::EmptyResponse(text.to_string()));
        }
        if !is_identifier(response) {
            return Err(FormulaError::InvalidTerm(response.to_string()));
        }

        let mut terms = Vec::new();
        let mut include = true;
        let mut current = String::new();
        let mut position = 0usize;
        for ch in rhs.chars().chain(std::iter::once('+')) {
            match ch {
                '+' | '-' => {
                    let token = current.trim();
                    if token.is_empty() {
                        // A leading sign is allowed (`~ -x` is still an error later
                        // because nothing is included).
                        if !(position == 0 && ch == '-' && terms.is_empty()) || !include {
                            return Err(FormulaError::EmptyTerm {
                                formula: text.to_string(),
                                position,
                            });
                        }
                    } else if let Some(term) = parse_term(token, include)? {
                        if terms.contains(&term) {
                            return Err(FormulaError::DuplicateTerm(token.to_string()));
                        }
                        terms.push(term);
                    }
                    include = ch == '+';
                    current.clear();
                    position += 1;
                }
                _ => current.push(ch),
            }
        }

        Ok(Self {
            response: response.to_string(),
            terms,
        })
    }

    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Resolve the predictor columns selected by this formula, in dataset
    /// order for `.` and in formula order otherwise.
    ///
    /// # Errors
    ///
    /// Returns `FormulaError` naming the first column the dataset lacks.
    pub fn predictors(&self, dataset: &Dataset) -> Result<Vec<String>, FormulaError> {
        if dataset.column(&self.response).is_none() {
            return Err(FormulaError::UnknownColumn(self.response.clone()));
        }
        let mut selected: Vec<String> = Vec::new();
        let mut removed: Vec<String> = Vec::new();
        for SignedTerm { include, term } in &self.terms {
            let names = match term {
                Term::All => dataset
                    .column_names()
                    .filter(|name| *name != self.response)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
                Term::Column(name) => {
                    if dataset.column(name).is_none() {
                        return Err(FormulaError::UnknownColumn(name.clone()));
                    }
                    if *name == self.response {
                        return Err(FormulaError::ResponseAsPredictor(name.clone()));
                    }
                    vec![name.clone()]
                }
            };
            if *include {
                for name in names {
                    if !selected.contains(&name) {
                        selected.push(name);
                    }
                }
            } else {
                removed.extend(names);
            }
        }
        selected.retain(|name| !removed.contains(name));
        if selected.is_empty() {
            return Err(FormulaError::NoPredictors(self.to_string()));
        }
        Ok(selected)
    }
}

impl FromStr for Formula {
    type Err = FormulaError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ ", self.response)?;
        if self.terms.is_empty() {
            return f.write_str("1");
        }
        for (index, SignedTerm { include, term }) in self.terms.iter().enumerate() {
            let name = match term {
                Term::All => ".",
                Term::Column(name) => name.as_str(),
            };
            match (index, include) {
                (0, true) => f.write_str(name)?,
                (_, true) => write!(f, " + {name}")?,
                (_, false) => write!(f, " - {name}")?,
            }
        }
        Ok(())
    }
}

fn parse_term(token: &str, include: bool) -> Result<Option<SignedTerm>, FormulaError> {
    match token {
        "1" if include => Ok(None),
        "0" | "1" => Err(FormulaError::InterceptRemoval(token.to_string())),
        "." => Ok(Some(SignedTerm {
            include,
            term: Term::All,
        })),
        name if is_identifier(name) => Ok(Some(SignedTerm {
            include,
            term: Term::Column(name.to_string()),
        })),
        other => Err(FormulaError::InvalidTerm(other.to_string())),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
}
