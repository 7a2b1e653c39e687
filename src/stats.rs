//! Statistical primitives used by the pipeline
//!
//! Every numeric routine the pipeline needs beyond simple means sits behind
//! the [`StatsEngine`] trait so that alternative back-ends can be swapped in
//! without touching the pipeline stages. [`ClassicalStats`] is the default.

use derive_new::new;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::{
    config::{CategoricalMethod, CorrelationMethod, Correction},
    error::{Error, Result},
    math::{arithmetic_mean, average_ranks, complete_pairs, pearson, sample_variance},
};

/// A fitted ridge regression with an unpenalized intercept
#[derive(Debug, Clone, new)]
pub struct RidgeFit {
    /// Regularization strength selected by cross-validation
    pub alpha: f64,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}
impl RidgeFit {
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.iter())
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }
}

/// Correlation coefficient with its two-sided p-value
#[derive(Debug, Clone, Copy, new)]
pub struct Correlation {
    pub r: f64,
    pub pvalue: f64,
    /// Number of complete pairs used
    pub n: usize,
}

pub trait StatsEngine {
    /// Fits `y ~ x` by ridge regression, choosing the penalty from `alphas`
    /// by leave-one-out cross-validation
    fn ridge_cv(&self, x: &DMatrix<f64>, y: &DVector<f64>, alphas: &[f64]) -> Result<RidgeFit>;

    /// Correlates two series over the positions present in both
    fn correlate(&self, x: &[f64], y: &[f64], method: CorrelationMethod) -> Correlation;

    /// Two-sided p-value comparing the values of two groups
    fn compare_groups(&self, in_group: &[f64], out_group: &[f64], method: CategoricalMethod)
        -> f64;

    /// Multiple-testing correction of a family of p-values
    fn adjust(&self, pvalues: &[f64], correction: Correction) -> Vec<f64> {
        correction.transform(pvalues)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicalStats;

impl StatsEngine for ClassicalStats {
    fn ridge_cv(&self, x: &DMatrix<f64>, y: &DVector<f64>, alphas: &[f64]) -> Result<RidgeFit> {
        let (n, p) = x.shape();
        if y.len() != n {
            return Err(Error::Validation(format!(
                "ridge regression got {} targets for {} observations",
                y.len(),
                n
            )));
        }
        if n < 2 {
            return Err(Error::Validation(
                "ridge regression needs at least 2 observations".to_string(),
            ));
        }
        if alphas.is_empty() || alphas.iter().any(|a| !a.is_finite() || *a <= 0.0) {
            return Err(Error::Validation(
                "ridge penalties must be a non-empty set of positive numbers".to_string(),
            ));
        }

        let y_mean = y.mean();
        if p == 0 {
            return Ok(RidgeFit::new(alphas[0], y_mean, Vec::new()));
        }

        let x_means = DVector::from_iterator(p, x.column_iter().map(|c| c.mean()));
        let mut xc = x.clone();
        for (j, mut column) in xc.column_iter_mut().enumerate() {
            column.add_scalar_mut(-x_means[j]);
        }
        let yc = y.add_scalar(-y_mean);
        let gram = xc.transpose() * &xc;
        let xty = xc.transpose() * &yc;

        let mut best: Option<(f64, f64, DVector<f64>)> = None;
        for &alpha in alphas {
            let system = &gram + DMatrix::<f64>::identity(p, p) * alpha;
            let Some(inverse) = system.try_inverse() else {
                continue;
            };
            let beta = &inverse * &xty;
            let fitted = &xc * &beta;
            let projected = &xc * &inverse;

            let mut loo_error = 0.0;
            for i in 0..n {
                let leverage = 1.0 / n as f64 + projected.row(i).dot(&xc.row(i));
                let residual = yc[i] - fitted[i];
                let denom = 1.0 - leverage;
                loo_error += if denom.abs() < 1e-12 {
                    f64::INFINITY
                } else {
                    (residual / denom).powi(2)
                };
            }
            loo_error /= n as f64;

            let improves = best.as_ref().map_or(true, |(_, err, _)| loo_error < *err);
            if improves {
                best = Some((alpha, loo_error, beta));
            }
        }

        let (alpha, _, beta) = best.ok_or_else(|| {
            Error::Validation("ridge system could not be solved for any penalty".to_string())
        })?;
        let intercept = y_mean - x_means.dot(&beta);
        Ok(RidgeFit::new(alpha, intercept, beta.iter().copied().collect()))
    }

    fn correlate(&self, x: &[f64], y: &[f64], method: CorrelationMethod) -> Correlation {
        let (x, y) = complete_pairs(x, y);
        let n = x.len();
        let r = match method {
            CorrelationMethod::Pearson => pearson(&x, &y),
            CorrelationMethod::Spearman => pearson(&average_ranks(&x), &average_ranks(&y)),
        };
        Correlation::new(r, correlation_pvalue(r, n), n)
    }

    fn compare_groups(
        &self,
        in_group: &[f64],
        out_group: &[f64],
        method: CategoricalMethod,
    ) -> f64 {
        let in_group = present(in_group);
        let out_group = present(out_group);
        if in_group.is_empty() || out_group.is_empty() {
            return f64::NAN;
        }
        match method {
            CategoricalMethod::MannWhitney => mann_whitney_pvalue(&in_group, &out_group),
            CategoricalMethod::WelchT => welch_pvalue(&in_group, &out_group),
        }
    }
}

fn present(x: &[f64]) -> Vec<f64> {
    x.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Two-sided p-value of a correlation from the t distribution with `n - 2` degrees of freedom
fn correlation_pvalue(r: f64, n: usize) -> f64 {
    if r.is_nan() || n < 3 {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    students_t_two_sided(t, df)
}

fn students_t_two_sided(t: f64, df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Mann-Whitney U test using the tie-corrected normal approximation with continuity correction
fn mann_whitney_pvalue(x: &[f64], y: &[f64]) -> f64 {
    let (nx, ny) = (x.len() as f64, y.len() as f64);
    let n = nx + ny;
    let combined = x.iter().chain(y.iter()).copied().collect::<Vec<_>>();
    let ranks = average_ranks(&combined);
    let rank_sum = ranks[..x.len()].iter().sum::<f64>();
    let u = rank_sum - nx * (nx + 1.0) / 2.0;
    let mu = nx * ny / 2.0;

    // tie correction: sum of (t^3 - t) over groups of tied ranks
    let mut sorted = ranks.clone();
    sorted.sort_unstable_by(f64::total_cmp);
    let tie_groups = sorted.iter().chunk_by(|rank| rank.to_bits());
    let ties = tie_groups
        .into_iter()
        .map(|(_, group)| {
            let t = group.count() as f64;
            t * t * t - t
        })
        .sum::<f64>();
    let variance = nx * ny / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)));
    if variance <= 0.0 || !variance.is_finite() {
        return f64::NAN;
    }
    let z = ((u - mu).abs() - 0.5).max(0.0) / variance.sqrt();
    match Normal::new(0.0, 1.0) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(z))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Welch's unequal-variance t-test
fn welch_pvalue(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || y.len() < 2 {
        return f64::NAN;
    }
    let (nx, ny) = (x.len() as f64, y.len() as f64);
    let (vx, vy) = (sample_variance(x) / nx, sample_variance(y) / ny);
    let se = (vx + vy).sqrt();
    if se == 0.0 {
        return f64::NAN;
    }
    let t = (arithmetic_mean(x) - arithmetic_mean(y)) / se;
    let df = (vx + vy).powi(2) / (vx * vx / (nx - 1.0) + vy * vy / (ny - 1.0));
    students_t_two_sided(t, df)
}
