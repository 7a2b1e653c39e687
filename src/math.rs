use itertools::Itertools;

/// Arithmetic mean over the non-missing entries of `x`
///
/// Returns `NaN` when every entry is missing.
pub fn nan_mean(x: &[f64]) -> f64 {
    let (sum, n) = x
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

pub fn arithmetic_mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Pairs of positions where both `x` and `y` are present
pub fn complete_pairs(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y.iter())
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .unzip()
}

/// Pearson correlation of two complete series
///
/// Returns `NaN` for fewer than two pairs or a constant series.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || x.len() != y.len() {
        return f64::NAN;
    }
    let mx = arithmetic_mean(x);
    let my = arithmetic_mean(y);
    let (sxy, sxx, syy) = x
        .iter()
        .zip(y.iter())
        .fold((0.0, 0.0, 0.0), |(sxy, sxx, syy), (a, b)| {
            let (da, db) = (a - mx, b - my);
            (sxy + da * db, sxx + da * da, syy + db * db)
        });
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 {
        f64::NAN
    } else {
        (sxy / denom).clamp(-1.0, 1.0)
    }
}

/// Pearson correlation ignoring positions missing in either series
pub fn pearson_pairwise(x: &[f64], y: &[f64]) -> f64 {
    let (x, y) = complete_pairs(x, y);
    pearson(&x, &y)
}

/// Ranks starting at 1, tied values sharing the average of their ranks
pub fn average_ranks(x: &[f64]) -> Vec<f64> {
    let order = (0..x.len())
        .sorted_by(|&a, &b| x[a].total_cmp(&x[b]))
        .collect::<Vec<_>>();
    let mut ranks = vec![0.0; x.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && x[order[end]] == x[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Sample variance with one degree of freedom removed
pub fn sample_variance(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return f64::NAN;
    }
    let mean = arithmetic_mean(x);
    x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (x.len() - 1) as f64
}

/// Combines an anti-correlated module pair into one score
///
/// The minor module is subtracted from the major one, each weighted by its
/// membership count.
pub fn weighted_difference(major: f64, major_count: usize, minor: f64, minor_count: usize) -> f64 {
    let (nmaj, nmin) = (major_count as f64, minor_count as f64);
    (major * nmaj - minor * nmin) / (nmaj + nmin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nan_mean() {
        assert_relative_eq!(nan_mean(&[1.0, f64::NAN, 3.0]), 2.0);
        assert!(nan_mean(&[f64::NAN, f64::NAN]).is_nan());
    }

    #[test]
    fn test_arithmetic_mean() {
        let x = vec![1., 2., 3.];
        assert_relative_eq!(arithmetic_mean(&x), 2.0);
    }

    #[test]
    fn test_pearson_pairwise_skips_missing() {
        let x = [1.0, 2.0, f64::NAN, 4.0, 5.0];
        let y = [2.0, 4.0, 100.0, 8.0, f64::NAN];
        assert_relative_eq!(pearson_pairwise(&x, &y), 1.0, epsilon = 1e-12);
        let z = [-1.0, -2.0, 0.0, -4.0, -5.0];
        assert_relative_eq!(pearson_pairwise(&x, &z), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pearson_constant() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
    }

    #[test]
    fn test_average_ranks() {
        let ranks = average_ranks(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_weighted_difference() {
        assert_relative_eq!(weighted_difference(1.0, 10, -1.0, 4), 1.0);
        assert_relative_eq!(weighted_difference(2.0, 3, 1.0, 1), 1.25);
    }
}
