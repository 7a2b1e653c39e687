use std::collections::HashSet;

use derive_new::new;
use itertools::Itertools;
use log::{info, warn};
use nalgebra::{DMatrix, DVector};

use crate::{
    error::Result,
    math::{nan_mean, pearson_pairwise},
    matrix::{PhosphoMatrix, ProteinMatrix, RegulatorKey, SampleMatrix},
    stats::StatsEngine,
};

/// Fewest complete samples a coefficient fit is attempted on
const MIN_REGRESSION_SAMPLES: usize = 3;

/// One collapsed regulator signal and the measurement rows behind it
#[derive(Debug, Clone, new)]
pub struct RegulatorGroup {
    pub label: String,
    pub members: Vec<RegulatorKey>,
}

/// Candidate regulator measurements after collapsing correlated rows
#[derive(Debug, Clone)]
pub struct RegulatorData {
    /// Representative rows labeled by their joined member keys
    pub representatives: SampleMatrix<String>,
    /// Provenance of each representative, in row order
    pub groups: Vec<RegulatorGroup>,
}

/// Protein-level and phosphosite-level rows of the candidate regulators
///
/// Protein rows come first in list order, then phosphosite rows in list
/// order and by site. Identifiers without any measurement are skipped.
pub fn gather_regulator_rows(
    regulators: &[String],
    protein: &ProteinMatrix,
    phospho: &PhosphoMatrix,
) -> Result<SampleMatrix<RegulatorKey>> {
    let mut rows = Vec::new();
    let mut values = Vec::new();
    let regulators = regulators.iter().unique().collect::<Vec<_>>();

    for regulator in &regulators {
        if let Some(row) = protein.row(*regulator) {
            rows.push(RegulatorKey::new((*regulator).clone(), None));
            values.push(row.to_vec());
        }
    }
    for regulator in &regulators {
        let sites = phospho
            .iter()
            .filter(|(key, _)| &key.protein == *regulator)
            .sorted_by(|a, b| a.0.site.cmp(&b.0.site))
            .collect::<Vec<_>>();
        if sites.is_empty() && !protein.contains_row(*regulator) {
            warn!("Putative regulator {} has no protein or phospho measurements", regulator);
        }
        for (key, row) in sites {
            rows.push(RegulatorKey::new(key.protein.clone(), Some(key.site.clone())));
            values.push(row.to_vec());
        }
    }

    let columns = protein.columns().to_vec();
    SampleMatrix::new(rows, columns, values)
}

/// Collapses measurement rows that carry essentially the same signal
///
/// Rows are visited in order; the first row not yet grouped seeds a group
/// that takes every later ungrouped row whose pairwise-complete correlation
/// with the seed exceeds `corr_threshold`. A group is represented by the
/// per-sample mean of its members and labeled by their keys joined with
/// `delim`.
pub fn collapse_putative_regulators(
    data: &SampleMatrix<RegulatorKey>,
    corr_threshold: f64,
    delim: &str,
) -> Result<RegulatorData> {
    let mut grouped = HashSet::new();
    let mut groups = Vec::new();
    let mut labels = Vec::new();
    let mut values = Vec::new();

    for seed in 0..data.nrows() {
        if !grouped.insert(seed) {
            continue;
        }
        let mut members = vec![seed];
        for other in (seed + 1)..data.nrows() {
            if grouped.contains(&other) {
                continue;
            }
            if pearson_pairwise(data.row_at(seed), data.row_at(other)) > corr_threshold {
                grouped.insert(other);
                members.push(other);
            }
        }

        let keys = members
            .iter()
            .map(|&i| data.rows()[i].clone())
            .collect::<Vec<_>>();
        let label = keys.iter().map(|k| k.to_string()).join(delim);
        let line = (0..data.ncols())
            .map(|j| {
                let column = members
                    .iter()
                    .map(|&i| data.row_at(i)[j])
                    .collect::<Vec<_>>();
                nan_mean(&column)
            })
            .collect::<Vec<_>>();

        labels.push(label.clone());
        values.push(line);
        groups.push(RegulatorGroup::new(label, keys));
    }
    info!(
        "Collapsed {} regulator measurements into {} representatives",
        data.nrows(),
        groups.len()
    );

    let representatives = SampleMatrix::new(labels, data.columns().to_vec(), values)?;
    Ok(RegulatorData {
        representatives,
        groups,
    })
}

/// Fits each module's scores on the regulator representatives
///
/// `scores` holds samples as rows and modules as columns. Each module uses
/// the samples where it and every representative are present. The result
/// holds modules as rows and representatives as columns; modules with too
/// few complete samples get missing coefficients.
pub fn calculate_regulator_coefficients<S: StatsEngine + ?Sized>(
    engine: &S,
    regulators: &RegulatorData,
    scores: &SampleMatrix<String>,
    alphas: &[f64],
) -> Result<SampleMatrix<String>> {
    let representatives = &regulators.representatives;
    let sample_columns = scores
        .rows()
        .iter()
        .map(|sample| representatives.column_position(sample))
        .collect::<Vec<_>>();
    let nreg = representatives.nrows();

    let mut values = Vec::with_capacity(scores.ncols());
    for (m, module) in scores.columns().iter().enumerate() {
        let target = scores.column_values(m);
        let complete = target
            .iter()
            .zip(sample_columns.iter())
            .filter_map(|(y, column)| {
                let j = (*column)?;
                let present = !y.is_nan()
                    && (0..nreg).all(|r| !representatives.row_at(r)[j].is_nan());
                present.then_some((*y, j))
            })
            .collect::<Vec<_>>();

        if nreg == 0 || complete.len() < MIN_REGRESSION_SAMPLES {
            warn!(
                "Module {} has {} complete samples, skipping regulator regression",
                module,
                complete.len()
            );
            values.push(vec![f64::NAN; nreg]);
            continue;
        }

        let x = DMatrix::from_fn(complete.len(), nreg, |i, r| {
            representatives.row_at(r)[complete[i].1]
        });
        let y = DVector::from_iterator(complete.len(), complete.iter().map(|(y, _)| *y));
        let fit = engine.ridge_cv(&x, &y, alphas)?;
        values.push(fit.coefficients);
    }

    SampleMatrix::new(
        scores.columns().to_vec(),
        representatives.rows().to_vec(),
        values,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::REGULATOR_COMBINER_DELIM, matrix::SiteKey, stats::ClassicalStats};
    use approx::assert_abs_diff_eq;

    fn columns(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s{i}")).collect()
    }

    fn protein() -> ProteinMatrix {
        SampleMatrix::new(
            vec!["K1".to_string(), "K2".to_string()],
            columns(5),
            vec![
                vec![1.0, 2.0, 3.0, 4.0, 5.0],
                vec![5.0, 1.0, 4.0, 2.0, 3.0],
            ],
        )
        .unwrap()
    }

    fn phospho() -> PhosphoMatrix {
        SampleMatrix::new(
            vec![
                SiteKey::new("K1".into(), "T2".into()),
                SiteKey::new("K1".into(), "S1".into()),
                SiteKey::new("X".into(), "S1".into()),
            ],
            columns(5),
            vec![
                vec![2.0, 4.0, 6.0, 8.0, 10.5],
                vec![1.0, -1.0, 1.0, -1.0, 1.0],
                vec![0.0, 0.0, 0.0, 0.0, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_gather_order() {
        let list = vec!["K1".to_string(), "K2".to_string(), "missing".to_string()];
        let data = gather_regulator_rows(&list, &protein(), &phospho()).unwrap();
        let keys = data.rows().iter().map(|k| k.to_string()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["K1", "K2", "K1 S1", "K1 T2"]);
    }

    #[test]
    fn test_collapse_correlated_rows() {
        let list = vec!["K1".to_string(), "K2".to_string()];
        let data = gather_regulator_rows(&list, &protein(), &phospho()).unwrap();
        let collapsed =
            collapse_putative_regulators(&data, 0.9, REGULATOR_COMBINER_DELIM).unwrap();

        let labels = collapsed.representatives.rows().to_vec();
        assert_eq!(labels, vec!["K1|K1 T2", "K2", "K1 S1"]);
        assert_eq!(collapsed.groups[0].members.len(), 2);
        assert_eq!(
            collapsed.groups[0].members[1],
            RegulatorKey::new("K1".into(), Some("T2".into()))
        );
        let line = collapsed.representatives.row_at(0);
        assert_abs_diff_eq!(line[0], 1.5);
        assert_abs_diff_eq!(line[4], 7.75);
    }

    #[test]
    fn test_coefficients_recover_weights() {
        let data = SampleMatrix::new(
            vec![RegulatorKey::new("K1".into(), None)],
            columns(6),
            vec![vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]],
        )
        .unwrap();
        let regulators = collapse_putative_regulators(&data, 0.9, "|").unwrap();
        let scores = SampleMatrix::new(
            columns(6),
            vec!["m1".to_string(), "m2".to_string()],
            (1..=6)
                .map(|i| vec![3.0 * i as f64, if i < 3 { f64::NAN } else { 1.0 }])
                .collect(),
        )
        .unwrap();
        let coefficients =
            calculate_regulator_coefficients(&ClassicalStats, &regulators, &scores, &[1e-9])
                .unwrap();
        assert_eq!(coefficients.rows(), &["m1".to_string(), "m2".to_string()]);
        assert_abs_diff_eq!(coefficients.row_at(0)[0], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(coefficients.row_at(1)[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_coefficients_too_few_samples() {
        let data = SampleMatrix::new(
            vec![RegulatorKey::new("K1".into(), None)],
            columns(3),
            vec![vec![1.0, f64::NAN, 3.0]],
        )
        .unwrap();
        let regulators = collapse_putative_regulators(&data, 0.9, "|").unwrap();
        let scores =
            SampleMatrix::new(columns(3), vec!["m1".to_string()], vec![vec![1.0], vec![2.0], vec![3.0]])
                .unwrap();
        let coefficients =
            calculate_regulator_coefficients(&ClassicalStats, &regulators, &scores, &[1.0])
                .unwrap();
        assert!(coefficients.row_at(0)[0].is_nan());
    }
}
