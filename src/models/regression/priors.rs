//! Prior specifications and log-density helpers for Gaussian regression.
//!
//! Priors are structured values rather than free text, and each parameter
//! class only accepts the prior kinds the sampler supports:
//!
//! | class | accepted |
//! |---|---|
//! | intercept | `Normal` |
//! | coefficients | `Normal`, `Horseshoe` |
//! | sigma | `Exponential` |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing priors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriorError {
    #[error("invalid {kind} prior parameter `{parameter}` = {value}")]
    InvalidParameter {
        kind: PriorKind,
        parameter: &'static str,
        value: f64,
    },
    #[error("{kind} prior is not supported for {class}")]
    UnsupportedPrior { class: ParameterClass, kind: PriorKind },
}

/// Recognized prior families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorKind {
    Normal,
    Exponential,
    Horseshoe,
}

impl fmt::Display for PriorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Exponential => "exponential",
            Self::Horseshoe => "horseshoe",
        })
    }
}

/// Parameter classes that carry a prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterClass {
    Intercept,
    Coefficients,
    Sigma,
}

impl fmt::Display for ParameterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intercept => "the intercept",
            Self::Coefficients => "regression coefficients",
            Self::Sigma => "the residual scale",
        })
    }
}

/// A prior distribution with explicit numeric parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prior {
    Normal { mean: f64, sd: f64 },
    Exponential { rate: f64 },
    /// `beta_j ~ Normal(0, sigma² tau² lambda_j²)`, `lambda_j ~ C+(0, 1)`,
    /// `tau ~ C+(0, scale_global)`.
    Horseshoe { scale_global: f64 },
}

impl Prior {
    /// # Errors
    ///
    /// Returns `PriorError` unless `mean` is finite and `sd > 0`.
    pub fn normal(mean: f64, sd: f64) -> Result<Self, PriorError> {
        let prior = Self::Normal { mean, sd };
        prior.validate()?;
        Ok(prior)
    }

    /// # Errors
    ///
    /// Returns `PriorError` unless `rate > 0`.
    pub fn exponential(rate: f64) -> Result<Self, PriorError> {
        let prior = Self::Exponential { rate };
        prior.validate()?;
        Ok(prior)
    }

    /// # Errors
    ///
    /// Returns `PriorError` unless `scale_global > 0`.
    pub fn horseshoe(scale_global: f64) -> Result<Self, PriorError> {
        let prior = Self::Horseshoe { scale_global };
        prior.validate()?;
        Ok(prior)
    }

    #[must_use]
    pub const fn kind(self) -> PriorKind {
        match self {
            Self::Normal { .. } => PriorKind::Normal,
            Self::Exponential { .. } => PriorKind::Exponential,
            Self::Horseshoe { .. } => PriorKind::Horseshoe,
        }
    }

    /// # Errors
    ///
    /// Returns `PriorError::InvalidParameter` for non-finite or out-of-range
    /// parameters.
    pub fn validate(self) -> Result<(), PriorError> {
        let invalid = |parameter, value| PriorError::InvalidParameter {
            kind: self.kind(),
            parameter,
            value,
        };
        match self {
            Self::Normal { mean, .. } if !mean.is_finite() => Err(invalid("mean", mean)),
            Self::Normal { sd, .. } if !positive(sd) => Err(invalid("sd", sd)),
            Self::Exponential { rate } if !positive(rate) => Err(invalid("rate", rate)),
            Self::Horseshoe { scale_global } if !positive(scale_global) => {
                Err(invalid("scale_global", scale_global))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal { mean, sd } => write!(f, "normal({mean}, {sd})"),
            Self::Exponential { rate } => write!(f, "exponential({rate})"),
            Self::Horseshoe { scale_global } => {
                write!(f, "horseshoe(1, scale_global = {scale_global})")
            }
        }
    }
}

/// Priors for every parameter class of a Gaussian regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PriorSpecRecord", into = "PriorSpecRecord")]
pub struct PriorSpec {
    intercept: Prior,
    coefficients: Prior,
    sigma: Prior,
}

impl PriorSpec {
    /// # Errors
    ///
    /// Returns `PriorError` if a prior is invalid or not supported for its
    /// parameter class.
    pub fn new(intercept: Prior, coefficients: Prior, sigma: Prior) -> Result<Self, PriorError> {
        let spec = Self {
            intercept,
            coefficients,
            sigma,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Assemble a spec without checking it; for compile-time defaults whose
    /// roles are known to be valid. `validate` still applies.
    pub(crate) const fn from_parts(intercept: Prior, coefficients: Prior, sigma: Prior) -> Self {
        Self {
            intercept,
            coefficients,
            sigma,
        }
    }

    /// Weakly informative Gaussian priors on every coefficient.
    ///
    /// # Errors
    ///
    /// Returns `PriorError` for invalid numeric parameters.
    pub fn naive(
        intercept: Prior,
        coefficient_sd: f64,
        sigma_rate: f64,
    ) -> Result<Self, PriorError> {
        Self::new(
            intercept,
            Prior::normal(0.0, coefficient_sd)?,
            Prior::exponential(sigma_rate)?,
        )
    }

    /// Horseshoe prior on every coefficient.
    ///
    /// # Errors
    ///
    /// Returns `PriorError` for invalid numeric parameters.
    pub fn horseshoe(
        intercept: Prior,
        scale_global: f64,
        sigma_rate: f64,
    ) -> Result<Self, PriorError> {
        Self::new(
            intercept,
            Prior::horseshoe(scale_global)?,
            Prior::exponential(sigma_rate)?,
        )
    }

    #[must_use]
    pub const fn intercept(&self) -> Prior {
        self.intercept
    }

    #[must_use]
    pub const fn coefficients(&self) -> Prior {
        self.coefficients
    }

    #[must_use]
    pub const fn sigma(&self) -> Prior {
        self.sigma
    }

    #[must_use]
    pub const fn is_horseshoe(&self) -> bool {
        matches!(self.coefficients, Prior::Horseshoe { .. })
    }

    /// # Errors
    ///
    /// Returns `PriorError` if any prior is invalid or misplaced.
    pub fn validate(&self) -> Result<(), PriorError> {
        for (class, prior, allowed) in [
            (ParameterClass::Intercept, self.intercept, &[PriorKind::Normal][..]),
            (
                ParameterClass::Coefficients,
                self.coefficients,
                &[PriorKind::Normal, PriorKind::Horseshoe][..],
            ),
            (ParameterClass::Sigma, self.sigma, &[PriorKind::Exponential][..]),
        ] {
            if !allowed.contains(&prior.kind()) {
                return Err(PriorError::UnsupportedPrior {
                    class,
                    kind: prior.kind(),
                });
            }
            prior.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PriorSpecRecord {
    intercept: Prior,
    coefficients: Prior,
    sigma: Prior,
}

impl From<PriorSpec> for PriorSpecRecord {
    fn from(spec: PriorSpec) -> Self {
        Self {
            intercept: spec.intercept,
            coefficients: spec.coefficients,
            sigma: spec.sigma,
        }
    }
}

impl TryFrom<PriorSpecRecord> for PriorSpec {
    type Error = PriorError;

    fn try_from(record: PriorSpecRecord) -> Result<Self, Self::Error> {
        Self::new(record.intercept, record.coefficients, record.sigma)
    }
}

/// Log-density of `Normal(mean, sd)`.
#[must_use]
pub fn log_normal_density(value: f64, mean: f64, sd: f64) -> f64 {
    if sd <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let z = (value - mean) / sd;
    -0.5 * z.mul_add(z, std::f64::consts::TAU.ln()) - sd.ln()
}

/// Log-density of `Exponential(rate)`.
#[must_use]
pub fn log_exponential_density(value: f64, rate: f64) -> f64 {
    if !(value >= 0.0 && rate > 0.0) {
        return f64::NEG_INFINITY;
    }
    rate.ln() - rate * value
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constructors_reject_bad_parameters() {
        assert!(matches!(
            Prior::normal(0.0, -1.0),
            Err(PriorError::InvalidParameter { parameter: "sd", .. })
        ));
        assert!(Prior::exponential(0.0).is_err());
        assert!(Prior::horseshoe(f64::NAN).is_err());
    }

    #[test]
    fn spec_rejects_priors_in_the_wrong_class() {
        let err = PriorSpec::new(
            Prior::Horseshoe { scale_global: 1.0 },
            Prior::Normal { mean: 0.0, sd: 1.0 },
            Prior::Exponential { rate: 1.0 },
        )
        .expect_err("horseshoe intercept");
        assert_eq!(
            err,
            PriorError::UnsupportedPrior {
                class: ParameterClass::Intercept,
                kind: PriorKind::Horseshoe
            }
        );
        assert!(
            PriorSpec::new(
                Prior::Normal { mean: 0.0, sd: 1.0 },
                Prior::Normal { mean: 0.0, sd: 1.0 },
                Prior::Normal { mean: 0.0, sd: 1.0 },
            )
            .is_err()
        );
    }

    #[test]
    fn deserialization_revalidates() {
        let json = r#"{"intercept":{"kind":"normal","mean":0.0,"sd":1.0},
            "coefficients":{"kind":"horseshoe","scale_global":-1.0},
            "sigma":{"kind":"exponential","rate":1.0}}"#;
        assert!(serde_json::from_str::<PriorSpec>(json).is_err());
    }

    #[test]
    fn display_matches_modeling_notation() {
        let spec = PriorSpec::horseshoe(Prior::Normal { mean: 1200.0, sd: 100.0 }, 0.1, 0.01)
            .expect("valid spec");
        assert!(spec.is_horseshoe());
        assert_eq!(spec.intercept().to_string(), "normal(1200, 100)");
        assert_eq!(spec.coefficients().to_string(), "horseshoe(1, scale_global = 0.1)");
        assert_eq!(spec.sigma().to_string(), "exponential(0.01)");
    }

    #[test]
    fn log_densities_match_closed_forms() {
        assert_relative_eq!(
            log_normal_density(1.0, 0.0, 1.0),
            -0.5 - 0.5 * std::f64::consts::TAU.ln(),
            epsilon = 1e-12
        );
        assert_relative_eq!(log_exponential_density(2.0, 0.5), 0.5_f64.ln() - 1.0);
        assert!(log_exponential_density(-1.0, 0.5).is_infinite());
    }
}
