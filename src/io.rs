//! Readers for the delimited input tables and writers for stage outputs
//!
//! The delimiter follows the file extension: `.csv` is comma separated and
//! `.tsv` is tab separated. Cells matching one of the missing tokens, or
//! empty cells, are read as missing.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, Writer};

use crate::{
    annotations::AnnotationTable,
    error::{Error, Result},
    matrix::{PhosphoMatrix, ProteinMatrix, SampleMatrix, SiteKey},
    modules::{LabelTable, ModuleLabeling},
    results::AssociationTable,
    utils::is_missing_token,
};

/// Delimiter implied by the file extension
pub fn get_sep(path: &Path) -> Result<u8> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => Ok(b','),
        Some("tsv") => Ok(b'\t'),
        _ => Err(Error::Format(format!(
            "Input file {} is not a .csv or .tsv",
            path.display()
        ))),
    }
}

/// Header and records of a delimited file
fn read_records(path: &Path) -> Result<(StringRecord, Vec<StringRecord>)> {
    let sep = get_sep(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(sep)
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;
    let header = reader.headers()?.clone();
    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((header, records))
}

fn parse_cell(cell: &str, path: &Path, row: usize) -> Result<f64> {
    if is_missing_token(cell) {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|_| {
        Error::Format(format!(
            "{}: row {} has non-numeric value '{}'",
            path.display(),
            row + 1,
            cell
        ))
    })
}

fn optional_cell(cell: &str) -> Option<String> {
    (!is_missing_token(cell)).then(|| cell.to_string())
}

/// Splits the header into index columns and value columns
fn split_header(header: &StringRecord, index_columns: usize, path: &Path) -> Result<Vec<String>> {
    if header.len() < index_columns {
        return Err(Error::Format(format!(
            "{} needs at least {} index columns",
            path.display(),
            index_columns
        )));
    }
    Ok(header.iter().skip(index_columns).map(String::from).collect())
}

fn numeric_values(record: &StringRecord, skip: usize, path: &Path, row: usize) -> Result<Vec<f64>> {
    record
        .iter()
        .skip(skip)
        .map(|cell| parse_cell(cell, path, row))
        .collect()
}

/// Protein abundances indexed by the first column
pub fn read_protein(path: impl AsRef<Path>) -> Result<ProteinMatrix> {
    let path = path.as_ref();
    let (header, records) = read_records(path)?;
    let columns = split_header(&header, 1, path)?;
    let mut rows = Vec::with_capacity(records.len());
    let mut values = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        rows.push(record.get(0).unwrap_or_default().to_string());
        values.push(numeric_values(record, 1, path, i)?);
    }
    SampleMatrix::new(rows, columns, values)
}

/// Phosphosite abundances indexed by the first two columns (protein, site)
pub fn read_phospho(path: impl AsRef<Path>) -> Result<PhosphoMatrix> {
    let path = path.as_ref();
    let (header, records) = read_records(path)?;
    let columns = split_header(&header, 2, path)?;
    let mut rows = Vec::with_capacity(records.len());
    let mut values = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        rows.push(site_key(record));
        values.push(numeric_values(record, 2, path, i)?);
    }
    SampleMatrix::new(rows, columns, values)
}

fn site_key(record: &StringRecord) -> SiteKey {
    SiteKey::new(
        record.get(0).unwrap_or_default().to_string(),
        record.get(1).unwrap_or_default().to_string(),
    )
}

/// Module labels indexed by (protein, site), one column per labeling
pub fn read_modules(path: impl AsRef<Path>) -> Result<LabelTable> {
    let path = path.as_ref();
    let (header, records) = read_records(path)?;
    let columns = split_header(&header, 2, path)?;
    let rows = records.iter().map(site_key).collect();
    let labels = records
        .iter()
        .map(|record| record.iter().skip(2).map(optional_cell).collect())
        .collect();
    Ok(LabelTable::new(rows, columns, labels))
}

/// Sample annotations indexed by the first column, kept as text
pub fn read_annotation(path: impl AsRef<Path>) -> Result<AnnotationTable> {
    let path = path.as_ref();
    let (header, records) = read_records(path)?;
    let columns = split_header(&header, 1, path)?;
    let samples = records
        .iter()
        .map(|record| record.get(0).unwrap_or_default().to_string())
        .collect();
    let values = records
        .iter()
        .map(|record| record.iter().skip(1).map(optional_cell).collect())
        .collect();
    Ok(AnnotationTable::new(samples, columns, values))
}

/// One trimmed entry per non-empty line
pub fn read_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

pub fn write_phospho(path: impl AsRef<Path>, matrix: &PhosphoMatrix) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    let header = ["protein", "site"]
        .into_iter()
        .chain(matrix.columns().iter().map(String::as_str));
    writer.write_record(header)?;
    for (key, values) in matrix.iter() {
        let record = [key.protein.clone(), key.site.clone()]
            .into_iter()
            .chain(values.iter().map(|v| format_value(*v)));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_modules(path: impl AsRef<Path>, labeling: &ModuleLabeling) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["protein", "site", labeling.name()])?;
    for (key, label) in labeling.iter() {
        writer.write_record([key.protein.as_str(), key.site.as_str(), label])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a string-keyed matrix with `index_name` heading the key column
pub fn write_matrix(
    path: impl AsRef<Path>,
    matrix: &SampleMatrix<String>,
    index_name: &str,
) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    let header = std::iter::once(index_name).chain(matrix.columns().iter().map(String::as_str));
    writer.write_record(header)?;
    for (key, values) in matrix.iter() {
        let record =
            std::iter::once(key.clone()).chain(values.iter().map(|v| format_value(*v)));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes module rows against annotation columns
pub fn write_association(path: impl AsRef<Path>, association: &AssociationTable) -> Result<()> {
    write_matrix(path, &association.table, "module")
}
