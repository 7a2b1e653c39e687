use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use derive_new::new;

use crate::error::{Error, Result};

/// Row key of a phosphosite: the parent protein and the site within it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct SiteKey {
    pub protein: String,
    pub site: String,
}
impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.protein, self.site)
    }
}

/// Row key of a candidate regulator measurement
///
/// Protein-level measurements carry no site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct RegulatorKey {
    pub protein: String,
    pub site: Option<String>,
}
impl fmt::Display for RegulatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.site {
            Some(site) => write!(f, "{} {}", self.protein, site),
            None => write!(f, "{}", self.protein),
        }
    }
}

/// A real-valued table of rows keyed by `K` against sample columns
///
/// Missing values are stored as `NaN` and are never imputed.
#[derive(Debug, Clone)]
pub struct SampleMatrix<K> {
    rows: Vec<K>,
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
    row_index: HashMap<K, usize>,
}

pub type PhosphoMatrix = SampleMatrix<SiteKey>;
pub type ProteinMatrix = SampleMatrix<String>;

impl<K: Clone + Eq + Hash> SampleMatrix<K> {
    pub fn new(rows: Vec<K>, columns: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self> {
        if rows.len() != values.len() {
            return Err(Error::Validation(format!(
                "{} row keys provided for {} rows of values",
                rows.len(),
                values.len()
            )));
        }
        if let Some(i) = values.iter().position(|row| row.len() != columns.len()) {
            return Err(Error::Validation(format!(
                "row {} has {} values but there are {} columns",
                i,
                values[i].len(),
                columns.len()
            )));
        }
        let mut row_index = HashMap::with_capacity(rows.len());
        for (i, key) in rows.iter().enumerate() {
            if row_index.insert(key.clone(), i).is_some() {
                return Err(Error::Validation("duplicate row key in matrix".to_string()));
            }
        }
        Ok(Self {
            rows,
            columns,
            values,
            row_index,
        })
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            rows: Vec::new(),
            columns,
            values: Vec::new(),
            row_index: HashMap::new(),
        }
    }

    pub fn rows(&self) -> &[K] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains_row(&self, key: &K) -> bool {
        self.row_index.contains_key(key)
    }

    pub fn row(&self, key: &K) -> Option<&[f64]> {
        self.row_index.get(key).map(|&i| self.values[i].as_slice())
    }

    pub fn row_at(&self, i: usize) -> &[f64] {
        &self.values[i]
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Iterates over `(key, values)` pairs in row order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[f64])> {
        self.rows
            .iter()
            .zip(self.values.iter().map(|row| row.as_slice()))
    }

    /// Restricts the matrix to `columns`, in the given order
    ///
    /// Columns absent from the matrix are filled with missing values.
    pub fn select_columns(&self, columns: &[String]) -> Self {
        let positions = columns
            .iter()
            .map(|c| self.column_position(c))
            .collect::<Vec<_>>();
        let values = self
            .values
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|p| p.map_or(f64::NAN, |j| row[j]))
                    .collect()
            })
            .collect();
        Self {
            rows: self.rows.clone(),
            columns: columns.to_vec(),
            values,
            row_index: self.row_index.clone(),
        }
    }

    /// Restricts the matrix to `keys`, in the given order
    ///
    /// Keys absent from the matrix become all-missing rows.
    pub fn reindex(&self, keys: &[K]) -> Self {
        let values = keys
            .iter()
            .map(|key| match self.row(key) {
                Some(row) => row.to_vec(),
                None => vec![f64::NAN; self.ncols()],
            })
            .collect();
        let row_index = keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect();
        Self {
            rows: keys.to_vec(),
            columns: self.columns.clone(),
            values,
            row_index,
        }
    }

    /// Swaps rows and columns, keying the new rows by the old column names
    pub fn transpose(&self) -> SampleMatrix<String>
    where
        K: ToString,
    {
        let columns = self.rows.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        let values = (0..self.ncols())
            .map(|j| self.values.iter().map(|row| row[j]).collect())
            .collect();
        let rows = self.columns.clone();
        let row_index = rows
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect();
        SampleMatrix {
            rows,
            columns,
            values,
            row_index,
        }
    }

    /// Values of one column in row order
    pub fn column_values(&self, j: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[j]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> SampleMatrix<String> {
        SampleMatrix::new(
            vec!["a".to_string(), "b".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
            vec![vec![1.0, 2.0], vec![3.0, f64::NAN]],
        )
        .unwrap()
    }

    #[test]
    fn test_shape_mismatch() {
        let result = SampleMatrix::new(
            vec!["a".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
            vec![vec![1.0]],
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_select_columns_fills_missing() {
        let selected = matrix().select_columns(&["s2".to_string(), "s3".to_string()]);
        assert_eq!(selected.columns(), &["s2".to_string(), "s3".to_string()]);
        assert_eq!(selected.row(&"a".to_string()).unwrap()[0], 2.0);
        assert!(selected.row(&"a".to_string()).unwrap()[1].is_nan());
    }

    #[test]
    fn test_reindex() {
        let reindexed = matrix().reindex(&["b".to_string(), "z".to_string()]);
        assert_eq!(reindexed.nrows(), 2);
        assert_eq!(reindexed.row(&"b".to_string()).unwrap()[0], 3.0);
        assert!(reindexed.row(&"z".to_string()).unwrap().iter().all(|x| x.is_nan()));
    }

    #[test]
    fn test_transpose() {
        let transposed = matrix().transpose();
        assert_eq!(transposed.rows(), &["s1".to_string(), "s2".to_string()]);
        assert_eq!(transposed.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(transposed.row(&"s1".to_string()).unwrap(), &[1.0, 3.0]);
    }
}
