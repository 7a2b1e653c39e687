use derive_new::new;
use itertools::Itertools;
use log::info;

use crate::{
    config::{
        AnnotationKind, AssociationConfig, CategoricalMethod, CorrelationMethod,
        CATEGORY_DELIM, MIN_ANNOTATION_SAMPLES,
    },
    error::{Error, Result},
    matrix::SampleMatrix,
    results::{AssociationResults, AssociationTable},
    stats::StatsEngine,
    utils::ordered_intersection,
};

/// Sample covariates as read from file, samples as rows
#[derive(Debug, Clone, new)]
pub struct AnnotationTable {
    pub samples: Vec<String>,
    pub columns: Vec<String>,
    /// Row-major cells, `None` where missing
    pub values: Vec<Vec<Option<String>>>,
}

/// Annotations restricted to the analysed samples and split by type
#[derive(Debug, Clone)]
pub struct Annotations {
    /// One indicator column per observed category, samples as rows
    pub categorical: SampleMatrix<String>,
    /// Float-cast continuous columns, samples as rows
    pub continuous: SampleMatrix<String>,
}

/// Restricts annotations to `samples` and partitions their columns
///
/// `column_types` holds one type code per annotation column, resolved
/// through `codes`. Categorical columns become `<column><CATEGORY_DELIM><category>`
/// indicators (missing where the cell is missing) and continuous columns are
/// parsed as floats.
pub fn ingest_annotations(
    table: &AnnotationTable,
    column_types: &[String],
    codes: &[(&str, AnnotationKind)],
    samples: &[String],
) -> Result<Annotations> {
    let common = ordered_intersection(&table.samples, samples);
    if common.len() < MIN_ANNOTATION_SAMPLES {
        return Err(Error::Validation(format!(
            "Only {} samples in common between annotations and normed_phospho. Must be more than 1 sample in common",
            common.len()
        )));
    }
    info!(
        "Annotations have {} samples in common with normed_phospho",
        common.len()
    );

    if column_types.len() != table.columns.len() {
        return Err(Error::Validation(format!(
            "{} column types provided for {} annotation columns",
            column_types.len(),
            table.columns.len()
        )));
    }
    let kinds = column_types
        .iter()
        .map(|code| {
            AnnotationKind::from_code(code, codes).ok_or_else(|| {
                Error::Validation(format!("unknown annotation column type '{}'", code))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let positions = common
        .iter()
        .filter_map(|sample| table.samples.iter().position(|s| s == sample))
        .collect::<Vec<_>>();
    let cells = |j: usize| {
        positions
            .iter()
            .map(move |&i| table.values[i][j].as_deref())
            .collect::<Vec<_>>()
    };

    let mut categorical_columns = Vec::new();
    let mut categorical_values: Vec<Vec<f64>> = Vec::new();
    let mut continuous_columns = Vec::new();
    let mut continuous_values: Vec<Vec<f64>> = Vec::new();
    for (j, (column, kind)) in table.columns.iter().zip(kinds.iter()).enumerate() {
        let column_cells = cells(j);
        match kind {
            AnnotationKind::Categorical => {
                for (name, indicator) in binarize_categorical(column, &column_cells) {
                    categorical_columns.push(name);
                    categorical_values.push(indicator);
                }
            }
            AnnotationKind::Continuous => {
                continuous_columns.push(column.clone());
                continuous_values.push(cast_continuous(column, &column_cells)?);
            }
        }
    }

    Ok(Annotations {
        categorical: columns_to_matrix(&common, categorical_columns, categorical_values)?,
        continuous: columns_to_matrix(&common, continuous_columns, continuous_values)?,
    })
}

/// One indicator series per observed category, in sorted category order
pub fn binarize_categorical(column: &str, cells: &[Option<&str>]) -> Vec<(String, Vec<f64>)> {
    cells
        .iter()
        .flatten()
        .unique()
        .sorted()
        .map(|category| {
            let indicator = cells
                .iter()
                .map(|cell| match cell {
                    Some(value) if value == category => 1.0,
                    Some(_) => 0.0,
                    None => f64::NAN,
                })
                .collect();
            (format!("{column}{CATEGORY_DELIM}{category}"), indicator)
        })
        .collect()
}

fn cast_continuous(column: &str, cells: &[Option<&str>]) -> Result<Vec<f64>> {
    cells
        .iter()
        .map(|cell| match cell {
            None => Ok(f64::NAN),
            Some(value) => value.trim().parse::<f64>().map_err(|_| {
                Error::Validation(format!(
                    "continuous annotation '{}' has non-numeric value '{}'",
                    column, value
                ))
            }),
        })
        .collect()
}

fn columns_to_matrix(
    samples: &[String],
    columns: Vec<String>,
    column_values: Vec<Vec<f64>>,
) -> Result<SampleMatrix<String>> {
    let values = (0..samples.len())
        .map(|i| column_values.iter().map(|column| column[i]).collect())
        .collect();
    SampleMatrix::new(samples.to_vec(), columns, values)
}

/// Module score values at each annotated sample, missing where unscored
fn scores_at(scores: &SampleMatrix<String>, samples: &[String], module: usize) -> Vec<f64> {
    samples
        .iter()
        .map(|sample| scores.row(sample).map_or(f64::NAN, |row| row[module]))
        .collect()
}

/// Correlation p-values of every continuous annotation against every module
pub fn continuous_score_association<S: StatsEngine + ?Sized>(
    engine: &S,
    continuous: &SampleMatrix<String>,
    scores: &SampleMatrix<String>,
    method: CorrelationMethod,
) -> Result<AssociationTable> {
    let values = (0..scores.ncols())
        .map(|m| {
            let module_scores = scores_at(scores, continuous.rows(), m);
            (0..continuous.ncols())
                .map(|j| {
                    engine
                        .correlate(&continuous.column_values(j), &module_scores, method)
                        .pvalue
                })
                .collect()
        })
        .collect();
    Ok(AssociationTable::new(SampleMatrix::new(
        scores.columns().to_vec(),
        continuous.columns().to_vec(),
        values,
    )?))
}

/// Group-comparison p-values of every category indicator against every module
///
/// Samples flagged 1 form the in-group and samples flagged 0 the out-group;
/// samples with a missing indicator are left out.
pub fn categorical_score_association<S: StatsEngine + ?Sized>(
    engine: &S,
    categorical: &SampleMatrix<String>,
    scores: &SampleMatrix<String>,
    method: CategoricalMethod,
) -> Result<AssociationTable> {
    let values = (0..scores.ncols())
        .map(|m| {
            let module_scores = scores_at(scores, categorical.rows(), m);
            (0..categorical.ncols())
                .map(|j| {
                    let indicator = categorical.column_values(j);
                    let group = |flag: f64| {
                        indicator
                            .iter()
                            .zip(module_scores.iter())
                            .filter(|(i, _)| **i == flag)
                            .map(|(_, s)| *s)
                            .collect::<Vec<_>>()
                    };
                    engine.compare_groups(&group(1.0), &group(0.0), method)
                })
                .collect()
        })
        .collect();
    Ok(AssociationTable::new(SampleMatrix::new(
        scores.columns().to_vec(),
        categorical.columns().to_vec(),
        values,
    )?))
}

/// Associates module scores with every annotation and corrects per annotation column
pub fn annotation_association<S: StatsEngine + ?Sized>(
    engine: &S,
    annotations: &Annotations,
    scores: &SampleMatrix<String>,
    config: &AssociationConfig,
) -> Result<AssociationResults> {
    let cont =
        continuous_score_association(engine, &annotations.continuous, scores, config.cont_method)?;
    let cat =
        categorical_score_association(engine, &annotations.categorical, scores, config.cat_method)?;
    let association = cont.outer_join(&cat)?;
    let fdr = association.adjusted(engine, config.correction)?;
    info!(
        "Computed association of {} modules with {} annotation columns",
        association.table.nrows(),
        association.table.ncols()
    );
    Ok(AssociationResults { association, fdr })
}
