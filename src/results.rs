use itertools::Itertools;

use crate::{config::Correction, error::Result, matrix::SampleMatrix, stats::StatsEngine};

/// Module × annotation table of association p-values
#[derive(Debug, Clone)]
pub struct AssociationTable {
    pub table: SampleMatrix<String>,
}
impl AssociationTable {
    pub fn new(table: SampleMatrix<String>) -> Self {
        Self { table }
    }

    /// Concatenates the annotation columns of both tables
    ///
    /// Module rows are the union of both tables, in order of first
    /// appearance; a module absent from one side gets missing values there.
    pub fn outer_join(&self, other: &AssociationTable) -> Result<AssociationTable> {
        let modules = self
            .table
            .rows()
            .iter()
            .chain(other.table.rows().iter())
            .unique()
            .cloned()
            .collect::<Vec<_>>();
        let left = self.table.reindex(&modules);
        let right = other.table.reindex(&modules);
        let columns = left
            .columns()
            .iter()
            .chain(right.columns().iter())
            .cloned()
            .collect::<Vec<_>>();
        let values = (0..modules.len())
            .map(|i| {
                left.row_at(i)
                    .iter()
                    .chain(right.row_at(i).iter())
                    .copied()
                    .collect()
            })
            .collect();
        Ok(AssociationTable::new(SampleMatrix::new(modules, columns, values)?))
    }

    /// Corrects each annotation column independently across modules
    pub fn adjusted<S: StatsEngine + ?Sized>(
        &self,
        engine: &S,
        correction: Correction,
    ) -> Result<AssociationTable> {
        let corrected = (0..self.table.ncols())
            .map(|j| engine.adjust(&self.table.column_values(j), correction))
            .collect::<Vec<_>>();
        let values = (0..self.table.nrows())
            .map(|i| corrected.iter().map(|column| column[i]).collect())
            .collect();
        Ok(AssociationTable::new(SampleMatrix::new(
            self.table.rows().to_vec(),
            self.table.columns().to_vec(),
            values,
        )?))
    }
}

/// Raw association p-values paired with their corrected counterparts
#[derive(Debug, Clone)]
pub struct AssociationResults {
    pub association: AssociationTable,
    pub fdr: AssociationTable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ClassicalStats;

    fn table(rows: &[&str], columns: &[&str], values: Vec<Vec<f64>>) -> AssociationTable {
        AssociationTable::new(
            SampleMatrix::new(
                rows.iter().map(|s| s.to_string()).collect(),
                columns.iter().map(|s| s.to_string()).collect(),
                values,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_outer_join() {
        let left = table(&["m1", "m2"], &["age"], vec![vec![0.1], vec![0.2]]);
        let right = table(&["m2", "m3"], &["sex_F"], vec![vec![0.3], vec![0.4]]);
        let joined = left.outer_join(&right).unwrap().table;
        assert_eq!(joined.rows(), &["m1", "m2", "m3"].map(String::from));
        assert_eq!(joined.columns(), &["age", "sex_F"].map(String::from));
        assert!(joined.row_at(0)[1].is_nan());
        assert_eq!(joined.row_at(1), &[0.2, 0.3]);
        assert!(joined.row_at(2)[0].is_nan());
    }

    #[test]
    fn test_fdr_same_shape_and_not_smaller() {
        let raw = table(
            &["m1", "m2", "m3", "m4"],
            &["a", "b"],
            vec![
                vec![0.01, 0.5],
                vec![0.04, f64::NAN],
                vec![0.03, 0.2],
                vec![0.9, 0.01],
            ],
        );
        let fdr = raw.adjusted(&ClassicalStats, Correction::BenjaminiHochberg).unwrap();
        assert_eq!(fdr.table.rows(), raw.table.rows());
        assert_eq!(fdr.table.columns(), raw.table.columns());
        for i in 0..4 {
            for j in 0..2 {
                let (p, q) = (raw.table.row_at(i)[j], fdr.table.row_at(i)[j]);
                if p.is_nan() {
                    assert!(q.is_nan());
                } else {
                    assert!(q >= p);
                }
            }
        }
    }
}
