//! Portfolio weight optimizers.
//!
//! - [`mean_variance_direction`]: the raw `Σ⁻¹·μ` vector.
//! - [`mean_variance_optimize`]: that vector normalised to sum to one. No
//!   short-sale constraint is applied, so entries may be negative.
//! - [`risk_parity`]: inverse-volatility weights from the covariance diagonal.
//!
//! Matrices are dense row-major `Vec<Vec<f64>>`.

use crate::domain::error::RankfolioError;

pub type Matrix = Vec<Vec<f64>>;

/// Pivots with magnitude at or below this are treated as zero.
const PIVOT_EPSILON: f64 = 1e-12;

/// Inverts a square matrix by Gauss-Jordan elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub fn invert_matrix(matrix: &[Vec<f64>]) -> Result<Matrix, RankfolioError> {
    let n = matrix.len();
    ensure_square(matrix)?;

    let mut aug: Matrix = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = Vec::with_capacity(2 * n);
            r.extend_from_slice(row);
            r.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))
            .unwrap_or(col);

        if aug[pivot_row][col].abs() <= PIVOT_EPSILON {
            return Err(RankfolioError::SingularMatrix { column: col });
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        for j in 0..2 * n {
            aug[col][j] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..2 * n {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// Unscaled mean-variance direction `Σ⁻¹·μ`.
///
/// The sign of each entry is meaningful: a long-only caller keeps the
/// positive entries and rescales them itself.
pub fn mean_variance_direction(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
) -> Result<Vec<f64>, RankfolioError> {
    if expected_returns.len() != covariance.len() {
        return Err(RankfolioError::InvalidInput {
            reason: format!(
                "{} expected returns for a {}x{} covariance matrix",
                expected_returns.len(),
                covariance.len(),
                covariance.len()
            ),
        });
    }
    if expected_returns.is_empty() {
        return Err(RankfolioError::insufficient("mean-variance inputs", 0, 1));
    }

    let inverse = invert_matrix(covariance)?;
    Ok(inverse
        .iter()
        .map(|row| row.iter().zip(expected_returns).map(|(a, b)| a * b).sum())
        .collect())
}

/// Unconstrained mean-variance weights: `Σ⁻¹·μ`, scaled to sum to one.
pub fn mean_variance_optimize(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
) -> Result<Vec<f64>, RankfolioError> {
    normalize(mean_variance_direction(expected_returns, covariance)?)
}

/// Inverse-volatility weights. Zero-volatility instruments get zero weight.
pub fn risk_parity(covariance: &[Vec<f64>]) -> Result<Vec<f64>, RankfolioError> {
    ensure_square(covariance)?;
    if covariance.is_empty() {
        return Err(RankfolioError::insufficient("risk-parity inputs", 0, 1));
    }

    let mut inverse_vols = Vec::with_capacity(covariance.len());
    for (i, row) in covariance.iter().enumerate() {
        let variance = row[i];
        if variance < 0.0 || !variance.is_finite() {
            return Err(RankfolioError::InvalidInput {
                reason: format!("variance on diagonal {i} is {variance}"),
            });
        }
        let vol = variance.sqrt();
        inverse_vols.push(if vol > 0.0 { 1.0 / vol } else { 0.0 });
    }

    normalize(inverse_vols)
}

/// Population covariance of equally long return series (one per instrument).
pub fn sample_covariance(returns: &[Vec<f64>]) -> Result<Matrix, RankfolioError> {
    let n = returns.len();
    let len = returns.first().map(Vec::len).unwrap_or(0);
    if returns.iter().any(|r| r.len() != len) {
        return Err(RankfolioError::InvalidInput {
            reason: "return series have different lengths".to_string(),
        });
    }
    if len < 2 {
        return Err(RankfolioError::insufficient("covariance returns", len, 2));
    }

    let means = mean_returns(returns);
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = returns[i]
                .iter()
                .zip(&returns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum::<f64>()
                / len as f64;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    Ok(cov)
}

pub fn mean_returns(returns: &[Vec<f64>]) -> Vec<f64> {
    returns
        .iter()
        .map(|r| {
            if r.is_empty() {
                0.0
            } else {
                r.iter().sum::<f64>() / r.len() as f64
            }
        })
        .collect()
}

fn ensure_square(matrix: &[Vec<f64>]) -> Result<(), RankfolioError> {
    let n = matrix.len();
    if let Some((i, row)) = matrix.iter().enumerate().find(|(_, row)| row.len() != n) {
        return Err(RankfolioError::InvalidInput {
            reason: format!("row {i} has {} columns, expected {n}", row.len()),
        });
    }
    Ok(())
}

fn normalize(raw: Vec<f64>) -> Result<Vec<f64>, RankfolioError> {
    let total: f64 = raw.iter().sum();
    if total.abs() <= PIVOT_EPSILON || !total.is_finite() {
        return Err(RankfolioError::InvalidInput {
            reason: format!("weights sum to {total} and cannot be normalised"),
        });
    }
    Ok(raw.into_iter().map(|w| w / total).collect())
}
