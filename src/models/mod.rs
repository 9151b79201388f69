//! # Models
//!
//! Bayesian Gaussian regression with Normal or horseshoe coefficient priors,
//! PSIS-LOO for out-of-sample predictive accuracy, and LOO-based model
//! comparison.

pub mod comparison;
pub mod loo;
pub mod regression;
