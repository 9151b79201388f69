//! Fixed-parameter distributions used by the data simulator.

use rand::RngExt;
use rand::rngs::StdRng;

use crate::utils::sample_normal;

use super::SimulationError;

const PROBABILITY_TOLERANCE: f64 = 1.0e-9;

/// Scalar distribution with fully specified parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Normal { mean: f64, sd: f64 },
    Uniform { low: f64, high: f64 },
    /// Integers in `low..=high`, each equally likely.
    DiscreteUniform { low: i64, high: i64 },
}

impl Distribution {
    /// # Errors
    ///
    /// Returns `SimulationError::InvalidDistribution` naming `column` if the
    /// parameters are not usable.
    pub fn validate(self, column: &str) -> Result<(), SimulationError> {
        let reason = match self {
            Self::Normal { mean, sd } if !(mean.is_finite() && sd.is_finite() && sd > 0.0) => {
                Some(format!("normal requires finite mean and sd > 0; got mean={mean}, sd={sd}"))
            }
            Self::Uniform { low, high } if !(low.is_finite() && high.is_finite() && low < high) => {
                Some(format!("uniform requires finite low < high; got [{low}, {high})"))
            }
            Self::DiscreteUniform { low, high } if low > high => Some(format!(
                "discrete uniform requires low <= high; got {low}..={high}"
            )),
            _ => None,
        };
        reason.map_or(Ok(()), |reason| {
            Err(SimulationError::InvalidDistribution {
                column: column.to_string(),
                reason,
            })
        })
    }

    pub fn sample(self, rng: &mut StdRng) -> f64 {
        match self {
            Self::Normal { mean, sd } => sample_normal(rng, mean, sd),
            Self::Uniform { low, high } => rng.random_range(low..high),
            #[allow(clippy::cast_precision_loss)]
            Self::DiscreteUniform { low, high } => rng.random_range(low..=high) as f64,
        }
    }
}

/// Categorical variable with ordered levels and class probabilities.
///
/// The first level is the reference category in design matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalSpec {
    pub name: String,
    pub levels: Vec<String>,
    pub probabilities: Vec<f64>,
}

impl CategoricalSpec {
    #[must_use]
    pub fn new(name: &str, levels: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            levels: levels.iter().map(|(level, _)| (*level).to_string()).collect(),
            probabilities: levels.iter().map(|(_, probability)| *probability).collect(),
        }
    }

    /// # Errors
    ///
    /// Returns `SimulationError` if levels and probabilities disagree or the
    /// probabilities do not form a distribution.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.levels.is_empty() {
            return Err(SimulationError::EmptyLevels(self.name.clone()));
        }
        if self.levels.len() != self.probabilities.len() {
            return Err(SimulationError::LevelProbabilityMismatch {
                column: self.name.clone(),
                levels: self.levels.len(),
                probabilities: self.probabilities.len(),
            });
        }
        for (index, level) in self.levels.iter().enumerate() {
            if self.levels[..index].contains(level) {
                return Err(SimulationError::DuplicateLevel {
                    column: self.name.clone(),
                    level: level.clone(),
                });
            }
        }
        if let Some(probability) = self
            .probabilities
            .iter()
            .copied()
            .find(|p| !(p.is_finite() && *p >= 0.0))
        {
            return Err(SimulationError::InvalidDistribution {
                column: self.name.clone(),
                reason: format!("class probability {probability} is not a finite non-negative number"),
            });
        }
        let total = self.probabilities.iter().sum::<f64>();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(SimulationError::ProbabilitiesDoNotSumToOne {
                column: self.name.clone(),
                total,
            });
        }
        Ok(())
    }

    /// Index of `level` within the ordered level list.
    #[must_use]
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|candidate| candidate == level)
    }

    /// Draw a level code by inverting the cumulative class probabilities.
    pub fn sample_code(&self, rng: &mut StdRng) -> usize {
        let uniform = rng.random::<f64>();
        let mut cumulative = 0.0;
        for (code, probability) in self.probabilities.iter().enumerate() {
            cumulative += probability;
            if uniform < cumulative {
                return code;
            }
        }
        self.probabilities
            .iter()
            .rposition(|probability| *probability > 0.0)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn normal_rejects_non_positive_sd() {
        let err = Distribution::Normal { mean: 0.0, sd: 0.0 }
            .validate("weight")
            .expect_err("sd = 0 is invalid");
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn discrete_uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let distribution = Distribution::DiscreteUniform { low: 0, high: 3 };
        for _ in 0..500 {
            let value = distribution.sample(&mut rng);
            assert!((0.0..=3.0).contains(&value));
            assert!((value - value.round()).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn categorical_rejects_probabilities_not_summing_to_one() {
        let spec = CategoricalSpec::new("sport", &[("no", 0.6), ("yes", 0.3)]);
        assert!(matches!(
            spec.validate(),
            Err(SimulationError::ProbabilitiesDoNotSumToOne { .. })
        ));
    }

    #[test]
    fn categorical_never_draws_zero_probability_levels() {
        let spec = CategoricalSpec::new("x", &[("a", 0.0), ("b", 1.0), ("c", 0.0)]);
        let mut rng = StdRng::seed_from_u64(11);
        assert!((0..200).all(|_| spec.sample_code(&mut rng) == 1));
    }

    #[test]
    fn categorical_frequencies_follow_probabilities() {
        let spec = CategoricalSpec::new("x", &[("a", 0.2), ("b", 0.8)]);
        let mut rng = StdRng::seed_from_u64(5);
        let draws = 10_000;
        let count_b = (0..draws).filter(|_| spec.sample_code(&mut rng) == 1).count();
        let share = f64::from(u32::try_from(count_b).unwrap_or(u32::MAX)) / f64::from(draws);
        assert!((share - 0.8).abs() < 0.02);
    }
}
