//! Gaussian likelihood evaluation over a model frame.

use crate::input::ModelFrame;
use crate::utils::dot_row;

use super::posterior::PosteriorDraw;

/// `log Normal(y | mu, sigma)`.
#[must_use]
pub fn gaussian_log_density(y: f64, mu: f64, sigma: f64) -> f64 {
    if !(sigma > 0.0 && sigma.is_finite()) {
        return f64::NEG_INFINITY;
    }
    let z = (y - mu) / sigma;
    (-0.5 * z).mul_add(z, -0.5 * std::f64::consts::TAU.ln()) - sigma.ln()
}

/// Log-likelihood of every observation under one draw.
#[must_use]
pub fn pointwise_log_likelihood(frame: &ModelFrame, draw: &PosteriorDraw) -> Vec<f64> {
    (0..frame.n_obs())
        .map(|row| {
            let mu = dot_row(&frame.design_matrix, row, &draw.coefficients);
            gaussian_log_density(frame.outcome[(row, 0)], mu, draw.sigma)
        })
        .collect()
}

/// Sufficient statistics of the Gaussian likelihood in the coefficients.
///
/// The residual sum of squares for any coefficient vector is
/// `yᵀy - 2 θᵀXᵀy + θᵀXᵀXθ`, so the sampler never revisits the rows.
#[derive(Debug, Clone)]
pub struct SufficientStatistics {
    pub xtx: faer::Mat<f64>,
    pub xty: Vec<f64>,
    pub yty: f64,
    pub n_obs: usize,
}

impl SufficientStatistics {
    #[must_use]
    pub fn from_frame(frame: &ModelFrame) -> Self {
        let x = &frame.design_matrix;
        let y = &frame.outcome;
        let xtx = x.transpose() * x;
        let xty_mat = x.transpose() * y;
        let xty = (0..xty_mat.nrows()).map(|row| xty_mat[(row, 0)]).collect();
        let yty = (0..y.nrows()).map(|row| y[(row, 0)] * y[(row, 0)]).sum();
        Self {
            xtx,
            xty,
            yty,
            n_obs: frame.n_obs(),
        }
    }

    #[must_use]
    pub fn residual_sum_of_squares(&self, coefficients: &[f64]) -> f64 {
        let cross = coefficients
            .iter()
            .zip(&self.xty)
            .map(|(theta, xty)| theta * xty)
            .sum::<f64>();
        let quadratic = (0..coefficients.len())
            .map(|row| coefficients[row] * dot_row(&self.xtx, row, coefficients))
            .sum::<f64>();
        (2.0f64.mul_add(-cross, self.yty) + quadratic).max(0.0)
    }
}
