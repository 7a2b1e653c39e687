use itertools::Itertools;
use log::info;

use crate::{
    matrix::{PhosphoMatrix, ProteinMatrix, SiteKey},
    utils::{count_common_values, ordered_intersection},
};

/// Phospho and protein matrices restricted to their shared samples
#[derive(Debug, Clone)]
pub struct AlignedData {
    pub phospho: PhosphoMatrix,
    pub protein: ProteinMatrix,
    /// Proteins with at least one phosphosite and a protein-level row
    pub common_proteins: Vec<String>,
    pub common_samples: Vec<String>,
    /// Phosphosites with enough values paired with their parent protein
    pub normalizable_rows: Vec<SiteKey>,
}

/// Intersects the phospho and protein matrices and flags normalizable rows
///
/// Sample columns are restricted to those present in both inputs, ordered as
/// in `phospho`. A phosphosite is normalizable when at least
/// `min_common_values` samples hold a value for both the site and its parent
/// protein. No overlap at all is not an error; it yields empty sets.
pub fn align(
    phospho: &PhosphoMatrix,
    protein: &ProteinMatrix,
    min_common_values: usize,
) -> AlignedData {
    let common_samples = ordered_intersection(phospho.columns(), protein.columns());
    let phospho = phospho.select_columns(&common_samples);
    let protein = protein.select_columns(&common_samples);

    let common_proteins = phospho
        .rows()
        .iter()
        .map(|key| &key.protein)
        .unique()
        .filter(|p| protein.contains_row(p))
        .cloned()
        .sorted()
        .collect::<Vec<_>>();
    info!(
        "Phospho and protein data have {} proteins in common",
        common_proteins.len()
    );
    info!(
        "Phospho and protein data have {} samples in common, re-indexed to only common samples",
        common_samples.len()
    );

    let normalizable_rows = phospho
        .iter()
        .filter_map(|(key, values)| {
            let parent = protein.row(&key.protein)?;
            (count_common_values(values, parent) >= min_common_values).then(|| key.clone())
        })
        .collect::<Vec<_>>();
    info!(
        "There are {} rows with at least {} non-null values in both phospho and protein",
        normalizable_rows.len(),
        min_common_values
    );

    AlignedData {
        phospho,
        protein,
        common_proteins,
        common_samples,
        normalizable_rows,
    }
}
