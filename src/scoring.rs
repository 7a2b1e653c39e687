use std::collections::{BTreeMap, HashSet};

use derive_new::new;
use itertools::Itertools;
use log::info;

use crate::{
    config::ScoreConfig,
    error::{Error, Result},
    math::{nan_mean, pearson_pairwise, weighted_difference},
    matrix::{PhosphoMatrix, SampleMatrix},
    modules::ModuleLabeling,
};

/// Record of two anti-correlated modules collapsed into one
#[derive(Debug, Clone, PartialEq, new)]
pub struct MergedModules {
    pub label: String,
    pub major: String,
    pub minor: String,
    pub correlation: f64,
}

/// Per-sample module scores
#[derive(Debug, Clone)]
pub struct ModuleScores {
    /// Samples as rows, module labels as columns
    pub scores: SampleMatrix<String>,
    /// Phosphosites per module, merged modules carrying the sum of both
    pub membership: BTreeMap<String, usize>,
    pub merged: Vec<MergedModules>,
    pub anticorrelated_collapsed: bool,
}

/// Mean normalized abundance of each module's phosphosites per sample
///
/// Rows are module labels in sorted order. Sites without a module are
/// ignored and missing values are skipped when averaging.
pub fn raw_module_scores(
    normed: &PhosphoMatrix,
    labeling: &ModuleLabeling,
) -> Result<SampleMatrix<String>> {
    let abundances = normed.reindex(labeling.keys());
    let modules = labeling.modules();
    let values = modules
        .iter()
        .map(|module| {
            let members = abundances
                .iter()
                .filter(|(key, _)| labeling.label(key) == Some(module.as_str()))
                .map(|(_, values)| values)
                .collect::<Vec<_>>();
            (0..abundances.ncols())
                .map(|j| nan_mean(&members.iter().map(|row| row[j]).collect::<Vec<_>>()))
                .collect()
        })
        .collect();
    SampleMatrix::new(modules, normed.columns().to_vec(), values)
}

/// Merges strongly anti-correlated module pairs
///
/// All pairwise correlations are computed once on `scores` (modules as
/// rows). Pairs below `-threshold` are merged most anti-correlated first, ties
/// broken by label; a module takes part in at most one merge. The module
/// with more phosphosites is the major one (the smaller label on a tie) and
/// the merged score is the membership-weighted difference major minus minor.
/// Merged rows are labeled `<smaller><delim><larger>` and appended after the
/// untouched modules. A merged label equal to a remaining module label is a
/// validation error.
pub fn collapse_anticorrelated(
    scores: &SampleMatrix<String>,
    membership: &BTreeMap<String, usize>,
    threshold: f64,
    delim: &str,
) -> Result<(SampleMatrix<String>, BTreeMap<String, usize>, Vec<MergedModules>)> {
    let pairs = scores
        .rows()
        .iter()
        .tuple_combinations()
        .filter_map(|(a, b)| {
            let (a, b) = if a <= b { (a, b) } else { (b, a) };
            let r = pearson_pairwise(scores.row(a)?, scores.row(b)?);
            (-r > threshold).then(|| (r, a.clone(), b.clone()))
        })
        .sorted_by(|x, y| x.0.total_cmp(&y.0).then_with(|| (&x.1, &x.2).cmp(&(&y.1, &y.2))))
        .collect::<Vec<_>>();

    let mut used = HashSet::new();
    let mut merged = Vec::new();
    let mut merged_rows = Vec::new();
    let mut membership = membership.clone();
    for (r, a, b) in pairs {
        if used.contains(&a) || used.contains(&b) {
            continue;
        }
        let count = |label: &String| membership.get(label).copied().unwrap_or(0);
        let (major, minor) = if count(&b) > count(&a) {
            (b.clone(), a.clone())
        } else {
            (a.clone(), b.clone())
        };
        let (nmaj, nmin) = (count(&major), count(&minor));
        let (Some(major_scores), Some(minor_scores)) = (scores.row(&major), scores.row(&minor))
        else {
            continue;
        };
        let line = major_scores
            .iter()
            .zip(minor_scores.iter())
            .map(|(maj, min)| weighted_difference(*maj, nmaj, *min, nmin))
            .collect::<Vec<_>>();
        let label = format!("{a}{delim}{b}");
        info!(
            "Merging anti-correlated modules {} and {} (r = {:.3}) into {}",
            major, minor, r, label
        );

        membership.insert(label.clone(), nmaj + nmin);
        used.insert(a);
        used.insert(b);
        merged_rows.push((label.clone(), line));
        merged.push(MergedModules::new(label, major, minor, r));
    }

    let (rows, values): (Vec<_>, Vec<_>) = scores
        .iter()
        .filter(|(label, _)| !used.contains(*label))
        .map(|(label, values)| (label.clone(), values.to_vec()))
        .chain(merged_rows)
        .unzip();
    if let Some(label) = rows.iter().duplicates().next() {
        return Err(Error::Validation(format!(
            "merged module label '{}' collides with an existing module label",
            label
        )));
    }
    let collapsed = SampleMatrix::new(rows, scores.columns().to_vec(), values)?;
    Ok((collapsed, membership, merged))
}

/// Scores every module per sample and optionally collapses anti-correlated pairs
pub fn calculate_module_scores(
    normed: &PhosphoMatrix,
    labeling: &ModuleLabeling,
    config: &ScoreConfig,
    delim: &str,
) -> Result<ModuleScores> {
    let raw = raw_module_scores(normed, labeling)?;
    let membership = labeling.membership_counts(normed);
    info!("Scored {} modules across {} samples", raw.nrows(), raw.ncols());

    let (scores, membership, merged) = if config.combine_anti_regulated {
        collapse_anticorrelated(&raw, &membership, config.anti_corr_threshold, delim)?
    } else {
        (raw, membership, Vec::new())
    };

    Ok(ModuleScores {
        scores: scores.transpose(),
        membership,
        merged,
        anticorrelated_collapsed: config.combine_anti_regulated,
    })
}
