use nalgebra::{DMatrix, DVector};

use crate::{
    align::AlignedData,
    error::Result,
    matrix::{PhosphoMatrix, SampleMatrix},
    stats::StatsEngine,
};

/// Residuals of one phosphosite after regressing out its parent protein
///
/// Only positions where both series are present take part in the fit and
/// receive a residual; all other positions stay missing. Rows with fewer
/// than `min_common_values` paired positions are returned all-missing.
pub fn norm_line_to_residuals<S: StatsEngine + ?Sized>(
    engine: &S,
    phospho: &[f64],
    protein: &[f64],
    alphas: &[f64],
    min_common_values: usize,
) -> Result<Vec<f64>> {
    let paired = phospho
        .iter()
        .zip(protein.iter())
        .enumerate()
        .filter(|(_, (p, q))| !p.is_nan() && !q.is_nan())
        .map(|(i, (p, q))| (i, *p, *q))
        .collect::<Vec<_>>();

    let mut residuals = vec![f64::NAN; phospho.len()];
    if paired.len() < min_common_values.max(2) {
        return Ok(residuals);
    }

    let x = DMatrix::from_iterator(paired.len(), 1, paired.iter().map(|(_, _, q)| *q));
    let y = DVector::from_iterator(paired.len(), paired.iter().map(|(_, p, _)| *p));
    let fit = engine.ridge_cv(&x, &y, alphas)?;
    for (i, p, q) in paired {
        residuals[i] = p - fit.predict(&[q]);
    }
    Ok(residuals)
}

/// Normalizes every normalizable phosphosite against its parent protein
///
/// Each row is fitted independently. The result is keyed by the
/// normalizable rows and spans the common samples.
pub fn normalize_phospho_by_protein<S: StatsEngine + ?Sized>(
    engine: &S,
    aligned: &AlignedData,
    alphas: &[f64],
    min_common_values: usize,
) -> Result<PhosphoMatrix> {
    let mut rows = Vec::with_capacity(aligned.normalizable_rows.len());
    let mut values = Vec::with_capacity(aligned.normalizable_rows.len());
    for key in &aligned.normalizable_rows {
        let (Some(phospho), Some(protein)) = (
            aligned.phospho.row(key),
            aligned.protein.row(&key.protein),
        ) else {
            continue;
        };
        let residuals =
            norm_line_to_residuals(engine, phospho, protein, alphas, min_common_values)?;
        rows.push(key.clone());
        values.push(residuals);
    }
    SampleMatrix::new(rows, aligned.common_samples.clone(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{align::align, matrix::SiteKey, stats::ClassicalStats};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_perfect_line_near_zero_residuals() {
        let phospho = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let protein = phospho.map(|p| 2.0 * p);
        let residuals =
            norm_line_to_residuals(&ClassicalStats, &phospho, &protein, &[0.1, 1.0, 10.0], 5)
                .unwrap();
        for r in residuals {
            assert_abs_diff_eq!(r, 0.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_missing_positions_stay_missing() {
        let nan = f64::NAN;
        let phospho = [1.0, 2.0, nan, 4.0, 5.0, 6.0, 7.0];
        let protein = [2.0, 4.0, 6.0, 8.0, 10.0, 12.0, nan];
        let residuals =
            norm_line_to_residuals(&ClassicalStats, &phospho, &protein, &[1e-8], 5).unwrap();
        assert!(residuals[2].is_nan());
        assert!(residuals[6].is_nan());
        for i in [0, 1, 3, 4, 5] {
            assert_abs_diff_eq!(residuals[i], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_missing_protein_gives_missing_residuals() {
        let phospho = [1.0, 2.0, 3.0, 4.0, 5.0];
        let protein = [f64::NAN; 5];
        let residuals =
            norm_line_to_residuals(&ClassicalStats, &phospho, &protein, &[1.0], 5).unwrap();
        assert!(residuals.iter().all(|r| r.is_nan()));
    }

    #[test]
    fn test_normalize_empty_overlap() {
        let phospho = SampleMatrix::new(
            vec![SiteKey::new("P1".into(), "S1".into())],
            vec!["a".to_string()],
            vec![vec![1.0]],
        )
        .unwrap();
        let protein =
            SampleMatrix::new(vec!["P2".to_string()], vec!["a".to_string()], vec![vec![1.0]])
                .unwrap();
        let aligned = align(&phospho, &protein, 5);
        let normed = normalize_phospho_by_protein(&ClassicalStats, &aligned, &[1.0], 5).unwrap();
        assert!(normed.is_empty());
    }
}
