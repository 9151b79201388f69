/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra, random variate and summary statistics helpers.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Cholesky factorization and triangular solves on faer matrices, random
//! variate generation from an explicitly threaded `StdRng`, and scalar
//! summary statistics shared by the simulator, sampler and LOO code.

use faer::Mat;
use num_traits::ToPrimitive;
use rand::RngExt;
use rand::rngs::StdRng;

/// Lower-triangular Cholesky factor `L` with `L Lᵀ = matrix`.
///
/// Returns `None` if the matrix is not square or not positive definite.
#[must_use]
pub fn cholesky_lower(matrix: &Mat<f64>) -> Option<Mat<f64>> {
    let dim = matrix.ncols();
    if matrix.nrows() != dim {
        return None;
    }
    let mut lower = Mat::<f64>::zeros(dim, dim);
    for row in 0..dim {
        for col in 0..=row {
            let mut sum = matrix[(row, col)];
            for k in 0..col {
                sum -= lower[(row, k)] * lower[(col, k)];
            }
            if row == col {
                if !(sum > 0.0 && sum.is_finite()) {
                    return None;
                }
                lower[(row, col)] = sum.sqrt();
            } else {
                lower[(row, col)] = sum / lower[(col, col)];
            }
        }
    }
    Some(lower)
}

/// Solve `L x = b` for lower-triangular `L`.
#[must_use]
pub fn forward_substitute(lower: &Mat<f64>, rhs: &[f64]) -> Vec<f64> {
    let dim = lower.nrows();
    let mut solution = vec![0.0; dim];
    for row in 0..dim {
        let mut sum = rhs[row];
        for col in 0..row {
            sum -= lower[(row, col)] * solution[col];
        }
        solution[row] = sum / lower[(row, row)];
    }
    solution
}

/// Solve `Lᵀ x = b` for lower-triangular `L`.
#[must_use]
pub fn backward_substitute_transpose(lower: &Mat<f64>, rhs: &[f64]) -> Vec<f64> {
    let dim = lower.nrows();
    let mut solution = vec![0.0; dim];
    for row in (0..dim).rev() {
        let mut sum = rhs[row];
        for col in (row + 1)..dim {
            sum -= lower[(col, row)] * solution[col];
        }
        solution[row] = sum / lower[(row, row)];
    }
    solution
}

#[must_use]
pub fn dot_row(matrix: &Mat<f64>, row: usize, coefficients: &[f64]) -> f64 {
    (0..matrix.ncols())
        .map(|col| matrix[(row, col)] * coefficients[col])
        .sum()
}

/// Standard normal variate via Box-Muller.
pub fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

pub fn sample_normal(rng: &mut StdRng, mean: f64, sd: f64) -> f64 {
    sd.mul_add(sample_standard_normal(rng), mean)
}

/// Gamma variate with `shape` and `scale` (Marsaglia-Tsang).
pub fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if !(shape > 0.0 && scale > 0.0) {
        return f64::NAN;
    }

    if shape < 1.0 {
        let u = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let shape_minus_third = shape - (1.0 / 3.0);
    let coeff = (1.0 / (9.0 * shape_minus_third)).sqrt();
    loop {
        let standard_normal = sample_standard_normal(rng);
        let one_plus_coeff_noise = coeff.mul_add(standard_normal, 1.0);
        if one_plus_coeff_noise <= 0.0 {
            continue;
        }
        let cubic_term = one_plus_coeff_noise * one_plus_coeff_noise * one_plus_coeff_noise;
        let uniform = rng.random::<f64>();
        if uniform
            < (0.0331 * standard_normal * standard_normal * standard_normal)
                .mul_add(-standard_normal, 1.0)
        {
            return scale * shape_minus_third * cubic_term;
        }
        if uniform.ln()
            < (0.5 * standard_normal).mul_add(
                standard_normal,
                shape_minus_third * (1.0 - cubic_term + cubic_term.ln()),
            )
        {
            return scale * shape_minus_third * cubic_term;
        }
    }
}

/// Inverse-gamma variate with `shape` and `scale`, i.e. `1 / Gamma(shape, rate = scale)`.
pub fn sample_inverse_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    1.0 / sample_gamma(rng, shape, 1.0 / scale)
}

#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / usize_to_f64(values.len())
}

/// Sample variance with the `n - 1` denominator; `0` for fewer than two values.
#[must_use]
pub fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values
        .iter()
        .map(|value| {
            let centered = *value - mean;
            centered * centered
        })
        .sum::<f64>()
        / usize_to_f64(values.len() - 1)
}

/// Linear-interpolated percentile of already sorted values.
#[must_use]
pub fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }

    let clamped = probability.clamp(0.0, 1.0);
    let last = sorted_values.len() - 1;
    let position = clamped * usize_to_f64(last);
    let lower = position.floor().to_usize().unwrap_or(0);
    let upper = position.ceil().to_usize().unwrap_or(last);

    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = position - usize_to_f64(lower);
        (1.0 - weight).mul_add(sorted_values[lower], weight * sorted_values[upper])
    }
}

/// `log(sum(exp(values)))` without overflow.
#[must_use]
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|value| (value - max).exp()).sum::<f64>().ln()
}

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn cholesky_reconstructs_matrix() {
        let matrix = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => 4.0,
            (1, 1) => 3.0,
            _ => 2.0,
        });
        let lower = cholesky_lower(&matrix).expect("positive definite");
        let product = &lower * lower.transpose();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(product[(i, j)], matrix[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn cholesky_rejects_indefinite_matrix() {
        let matrix = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 2.0 });
        assert!(cholesky_lower(&matrix).is_none());
    }

    #[test]
    fn triangular_solves_invert_factor() {
        let matrix = Mat::from_fn(3, 3, |i, j| if i == j { 5.0 } else { 1.0 });
        let lower = cholesky_lower(&matrix).expect("positive definite");
        let rhs = [1.0, 2.0, 3.0];
        let solution = backward_substitute_transpose(&lower, &forward_substitute(&lower, &rhs));
        for (row, expected) in rhs.iter().enumerate() {
            let recomputed = dot_row(&matrix, row, &solution);
            assert_relative_eq!(recomputed, *expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn gamma_sample_mean_matches_shape_times_scale() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..20_000).map(|_| sample_gamma(&mut rng, 3.0, 2.0)).collect();
        assert_relative_eq!(mean(&draws), 6.0, epsilon = 0.15);
    }

    #[test]
    fn sample_variance_uses_bessel_correction() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(sample_variance(&values, 2.5), 5.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(sample_variance(&[1.0], 1.0), 0.0);
    }

    #[test]
    fn percentile_interpolates_between_neighbours() {
        let sorted = [0.0, 1.0, 2.0, 3.0];
        assert_relative_eq!(percentile(&sorted, 0.5), 1.5);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn log_sum_exp_matches_naive_sum() {
        let values = [-1.0, 0.5, 2.0];
        let naive = values.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();
        assert_relative_eq!(log_sum_exp(&values), naive, epsilon = 1e-12);
    }
}
