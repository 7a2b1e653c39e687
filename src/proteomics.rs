use std::collections::BTreeMap;

use log::{info, warn};

use crate::{
    align::{align, AlignedData},
    annotations::{annotation_association, ingest_annotations, AnnotationTable, Annotations},
    config::{
        AssociationConfig, NormalizeConfig, RegulatorConfig, ScoreConfig, Selection,
        ANNOTATION_TYPE_CODES, DEFAULT_MIN_COMMON_VALUES, MODULE_COMBINER_DELIM,
        REGULATOR_COMBINER_DELIM,
    },
    error::{Error, Result},
    matrix::{PhosphoMatrix, ProteinMatrix, SampleMatrix},
    modules::{Clusterer, ModuleLabeling},
    normalize::normalize_phospho_by_protein,
    regulators::{
        calculate_regulator_coefficients, collapse_putative_regulators, gather_regulator_rows,
        RegulatorData,
    },
    results::AssociationResults,
    scoring::{calculate_module_scores, ModuleScores},
    stats::{ClassicalStats, StatsEngine},
};

/// Paired phospho and protein measurements and everything derived from them
///
/// Construction aligns both matrices. The analysis stages are then run in
/// order: normalization, module assignment, module scoring, regulator
/// analysis and annotation association. Each stage stores its output for the
/// next; re-running a stage overwrites its output with a warning and does
/// not invalidate later stages.
pub struct ProteomicsData<S: StatsEngine = ClassicalStats> {
    engine: S,
    min_common_values: usize,
    aligned: AlignedData,
    normed_phospho: Option<PhosphoMatrix>,
    modules: Option<ModuleLabeling>,
    clustering_parameters: Option<BTreeMap<String, String>>,
    module_scores: Option<ModuleScores>,
    putative_regulator_list: Option<Vec<String>>,
    putative_regulator_data: Option<RegulatorData>,
    regulator_coefficients: Option<SampleMatrix<String>>,
    annotations: Option<Annotations>,
    association: Option<AssociationResults>,
}

impl ProteomicsData<ClassicalStats> {
    pub fn new(phospho: &PhosphoMatrix, protein: &ProteinMatrix, min_common_values: usize) -> Self {
        Self::with_engine(ClassicalStats, phospho, protein, min_common_values)
    }

    pub fn with_default_threshold(phospho: &PhosphoMatrix, protein: &ProteinMatrix) -> Self {
        Self::new(phospho, protein, DEFAULT_MIN_COMMON_VALUES)
    }
}

impl<S: StatsEngine> ProteomicsData<S> {
    pub fn with_engine(
        engine: S,
        phospho: &PhosphoMatrix,
        protein: &ProteinMatrix,
        min_common_values: usize,
    ) -> Self {
        let aligned = align(phospho, protein, min_common_values);
        Self {
            engine,
            min_common_values,
            aligned,
            normed_phospho: None,
            modules: None,
            clustering_parameters: None,
            module_scores: None,
            putative_regulator_list: None,
            putative_regulator_data: None,
            regulator_coefficients: None,
            annotations: None,
            association: None,
        }
    }

    /// Seeds precomputed normalized phospho, skipping normalization
    pub fn with_normed_phospho(mut self, normed: PhosphoMatrix) -> Self {
        self.normed_phospho = Some(normed);
        self
    }

    /// Seeds a precomputed module labeling, skipping the clustering search
    pub fn with_modules(mut self, labeling: ModuleLabeling) -> Result<Self> {
        self.store_modules(labeling)?;
        Ok(self)
    }

    pub fn aligned(&self) -> &AlignedData {
        &self.aligned
    }

    pub fn min_common_values(&self) -> usize {
        self.min_common_values
    }

    pub fn normed_phospho(&self) -> Option<&PhosphoMatrix> {
        self.normed_phospho.as_ref()
    }

    pub fn modules(&self) -> Option<&ModuleLabeling> {
        self.modules.as_ref()
    }

    pub fn clustering_parameters(&self) -> Option<&BTreeMap<String, String>> {
        self.clustering_parameters.as_ref()
    }

    pub fn module_scores(&self) -> Option<&ModuleScores> {
        self.module_scores.as_ref()
    }

    pub fn putative_regulator_list(&self) -> Option<&[String]> {
        self.putative_regulator_list.as_deref()
    }

    pub fn putative_regulator_data(&self) -> Option<&RegulatorData> {
        self.putative_regulator_data.as_ref()
    }

    pub fn regulator_coefficients(&self) -> Option<&SampleMatrix<String>> {
        self.regulator_coefficients.as_ref()
    }

    pub fn annotations(&self) -> Option<&Annotations> {
        self.annotations.as_ref()
    }

    pub fn association(&self) -> Option<&AssociationResults> {
        self.association.as_ref()
    }

    fn require_normed(&self) -> Result<&PhosphoMatrix> {
        self.normed_phospho.as_ref().ok_or_else(|| {
            Error::Configuration(
                "Normalized phospho data is not defined. Run normalize_phospho_by_protein first."
                    .to_string(),
            )
        })
    }

    fn require_scores(&self) -> Result<&ModuleScores> {
        self.module_scores.as_ref().ok_or_else(|| {
            Error::Configuration(
                "Module scores are not defined. Run calculate_module_scores first.".to_string(),
            )
        })
    }

    /// Replaces each normalizable phosphosite by its residual against its parent protein
    pub fn normalize_phospho_by_protein(&mut self, config: &NormalizeConfig) -> Result<&mut Self> {
        if self.normed_phospho.is_some() {
            warn!("Overwriting protein-normalized phospho abundances");
        }
        let normed = normalize_phospho_by_protein(
            &self.engine,
            &self.aligned,
            &config.alphas(),
            self.min_common_values,
        )?;
        info!("Normalized {} phosphosites", normed.nrows());
        self.normed_phospho = Some(normed);
        Ok(self)
    }

    fn store_modules(&mut self, labeling: ModuleLabeling) -> Result<()> {
        if self.modules.is_some() {
            warn!("Overwriting module assignments");
        }
        let parameters = labeling.parameters()?;
        info!(
            "Assigned {} phosphosites to {} modules with {:?}",
            labeling.len(),
            labeling.modules().len(),
            parameters
        );
        self.clustering_parameters = Some(parameters);
        self.modules = Some(labeling);
        Ok(())
    }

    /// Stores a precomputed single labeling
    pub fn assign_modules(&mut self, labeling: ModuleLabeling) -> Result<&mut Self> {
        self.store_modules(labeling)?;
        Ok(self)
    }

    /// Searches for modules in the normalized phospho and keeps the best labeling
    pub fn assign_modules_by_search<C: Clusterer + ?Sized>(
        &mut self,
        clusterer: &C,
        selection: &Selection,
    ) -> Result<&mut Self> {
        let candidates = clusterer.search(self.require_normed()?)?;
        let labeling = candidates.pick_best(selection)?;
        self.store_modules(labeling)?;
        Ok(self)
    }

    /// Scores modules per sample from the normalized phospho
    pub fn calculate_module_scores(&mut self, config: &ScoreConfig) -> Result<&mut Self> {
        let normed = self.require_normed()?;
        let modules = self.modules.as_ref().ok_or_else(|| {
            Error::Configuration(
                "Modules are not defined. Run assign_modules first.".to_string(),
            )
        })?;
        let scores = calculate_module_scores(normed, modules, config, MODULE_COMBINER_DELIM)?;
        if self.module_scores.is_some() {
            warn!("Overwriting module scores");
        }
        self.module_scores = Some(scores);
        Ok(self)
    }

    /// Extracts and collapses the measurements of candidate regulators
    pub fn collect_putative_regulators(
        &mut self,
        regulators: &[String],
        config: &RegulatorConfig,
    ) -> Result<&mut Self> {
        if self.putative_regulator_data.is_some() {
            warn!("Overwriting putative regulator data");
        }
        let rows = gather_regulator_rows(regulators, &self.aligned.protein, &self.aligned.phospho)?;
        let data =
            collapse_putative_regulators(&rows, config.corr_threshold, REGULATOR_COMBINER_DELIM)?;
        self.putative_regulator_list = Some(regulators.to_vec());
        self.putative_regulator_data = Some(data);
        Ok(self)
    }

    /// Fits module scores on the collected regulators
    pub fn calculate_regulator_coefficients(
        &mut self,
        config: &RegulatorConfig,
    ) -> Result<&mut Self> {
        let regulators = self.putative_regulator_data.as_ref().ok_or_else(|| {
            Error::Configuration(
                "Putative regulators are not defined. Run collect_putative_regulators first."
                    .to_string(),
            )
        })?;
        let scores = self.require_scores()?;
        let coefficients = calculate_regulator_coefficients(
            &self.engine,
            regulators,
            &scores.scores,
            &config.alphas(),
        )?;
        self.regulator_coefficients = Some(coefficients);
        Ok(self)
    }

    /// Restricts annotations to the normalized samples and splits them by column type
    pub fn add_annotations(
        &mut self,
        annotations: &AnnotationTable,
        column_types: &[String],
    ) -> Result<&mut Self> {
        if self.annotations.is_some() {
            warn!("Overwriting annotation data");
        }
        let samples = self.require_normed()?.columns();
        let ingested =
            ingest_annotations(annotations, column_types, &ANNOTATION_TYPE_CODES, samples)?;
        self.annotations = Some(ingested);
        Ok(self)
    }

    /// Associates module scores with every annotation column
    pub fn annotation_association(&mut self, config: &AssociationConfig) -> Result<&mut Self> {
        let annotations = self.annotations.as_ref().ok_or_else(|| {
            Error::Configuration(
                "Annotations are not defined. Provide an annotation table to add_annotations first."
                    .to_string(),
            )
        })?;
        let scores = self.require_scores()?;
        let results = annotation_association(&self.engine, annotations, &scores.scores, config)?;
        self.association = Some(results);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kmeans::KMeansSearch,
        matrix::SiteKey,
        modules::LabelTable,
    };
    use approx::assert_relative_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn site(protein: &str, site: &str) -> SiteKey {
        SiteKey::new(protein.to_string(), site.to_string())
    }

    /// 4 samples, 3 proteins with 2 sites each; module "a" rises across
    /// samples and module "b" falls
    fn synthetic() -> (PhosphoMatrix, ProteinMatrix) {
        let samples = strings(&["s1", "s2", "s3", "s4"]);
        let phospho = SampleMatrix::new(
            vec![
                site("P1", "S1"),
                site("P1", "S2"),
                site("P2", "S1"),
                site("P2", "S2"),
                site("P3", "S1"),
                site("P3", "S2"),
            ],
            samples.clone(),
            vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![1.5, 2.5, 3.5, 4.5],
                vec![0.5, 2.0, 3.5, 5.0],
                vec![4.0, 3.0, 2.0, 1.0],
                vec![5.0, 3.5, 2.0, 0.5],
                vec![4.5, 3.5, 2.5, 1.5],
            ],
        )
        .unwrap();
        let protein = SampleMatrix::new(
            strings(&["P1", "P2", "P3"]),
            samples,
            vec![
                vec![1.0, 1.0, 1.0, 1.0],
                vec![2.0, 2.0, 2.0, 2.0],
                vec![3.0, 3.0, 3.0, 3.0],
            ],
        )
        .unwrap();
        (phospho, protein)
    }

    fn synthetic_modules() -> ModuleLabeling {
        ModuleLabeling::new(
            "modules",
            vec![
                (site("P1", "S1"), "a".to_string()),
                (site("P1", "S2"), "a".to_string()),
                (site("P2", "S1"), "a".to_string()),
                (site("P2", "S2"), "b".to_string()),
                (site("P3", "S1"), "b".to_string()),
                (site("P3", "S2"), "b".to_string()),
            ],
        )
    }

    #[test]
    fn test_end_to_end_merges_anticorrelated_modules() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4);
        assert_eq!(data.aligned().normalizable_rows.len(), 6);

        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap()
            .assign_modules(synthetic_modules())
            .unwrap()
            .calculate_module_scores(&ScoreConfig::default())
            .unwrap();

        let scores = data.module_scores().unwrap();
        let label = format!("a{}b", MODULE_COMBINER_DELIM);
        assert_eq!(scores.scores.columns(), &[label.clone()]);
        assert_eq!(scores.scores.rows(), &strings(&["s1", "s2", "s3", "s4"])[..]);
        assert_eq!(scores.merged.len(), 1);
        assert_eq!(scores.membership[&label], 6);
        assert_eq!(
            data.clustering_parameters().unwrap()["clusterer"],
            "modules".to_string()
        );
    }

    #[test]
    fn test_constant_protein_residuals_are_centered() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4);
        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap();
        let normed = data.normed_phospho().unwrap();
        let row = normed.row(&site("P1", "S1")).unwrap();
        assert_relative_eq!(row[0], -1.5, epsilon = 1e-9);
        assert_relative_eq!(row[3], 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_scores_without_collapsing() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4)
            .with_modules(synthetic_modules())
            .unwrap();
        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap();
        let config = ScoreConfig::builder().combine_anti_regulated(false).build();
        data.calculate_module_scores(&config).unwrap();
        let scores = data.module_scores().unwrap();
        assert_eq!(scores.scores.columns(), &strings(&["a", "b"])[..]);
        assert!(!scores.anticorrelated_collapsed);
    }

    #[test]
    fn test_rerun_normalization_overwrites() {
        let (phospho, protein) = synthetic();
        let seeded = phospho.clone();
        let mut data = ProteomicsData::new(&phospho, &protein, 4).with_normed_phospho(seeded);
        assert_eq!(data.normed_phospho().unwrap().row(&site("P1", "S1")).unwrap()[0], 1.0);

        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap()
            .normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap();
        let row = data.normed_phospho().unwrap().row(&site("P1", "S1")).unwrap();
        assert_relative_eq!(row[0], -1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_rerun_module_stages_overwrite() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4);
        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap()
            .assign_modules(synthetic_modules())
            .unwrap()
            .calculate_module_scores(&ScoreConfig::default())
            .unwrap();
        let merged = format!("a{}b", MODULE_COMBINER_DELIM);
        assert_eq!(data.module_scores().unwrap().scores.columns(), &[merged]);

        let unmerged = ScoreConfig::builder().combine_anti_regulated(false).build();
        data.calculate_module_scores(&unmerged).unwrap();
        let scores = data.module_scores().unwrap();
        assert_eq!(scores.scores.columns(), &strings(&["a", "b"])[..]);
        assert!(scores.merged.is_empty());

        let (keys, _): (Vec<_>, Vec<_>) = synthetic_modules()
            .iter()
            .map(|(key, label)| (key.clone(), label.to_string()))
            .unzip();
        let single = ModuleLabeling::new(
            "second",
            keys.into_iter().map(|key| (key, "z".to_string())).collect(),
        );
        data.assign_modules(single).unwrap();
        assert_eq!(data.modules().unwrap().name(), "second");
        assert_eq!(data.modules().unwrap().modules(), strings(&["z"]));
        assert_eq!(
            data.clustering_parameters().unwrap()["clusterer"],
            "second".to_string()
        );

        data.calculate_module_scores(&ScoreConfig::default()).unwrap();
        let scores = data.module_scores().unwrap();
        assert_eq!(scores.scores.columns(), &strings(&["z"])[..]);
        assert_eq!(scores.membership["z"], 6);
    }

    #[test]
    fn test_rerun_add_annotations_overwrites() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4);
        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap();
        let samples = strings(&["s1", "s2", "s3", "s4"]);
        let groups = AnnotationTable::new(
            samples.clone(),
            strings(&["group"]),
            ["x", "x", "y", "y"]
                .iter()
                .map(|v| vec![Some(v.to_string())])
                .collect(),
        );
        let doses = AnnotationTable::new(
            samples,
            strings(&["dose"]),
            ["1", "2", "3", "4"]
                .iter()
                .map(|v| vec![Some(v.to_string())])
                .collect(),
        );

        data.add_annotations(&groups, &strings(&["categorical"]))
            .unwrap();
        let annotations = data.annotations().unwrap();
        assert_eq!(
            annotations.categorical.columns(),
            &strings(&["group_x", "group_y"])[..]
        );
        assert_eq!(annotations.continuous.ncols(), 0);

        data.add_annotations(&doses, &strings(&["continuous"]))
            .unwrap();
        let annotations = data.annotations().unwrap();
        assert_eq!(annotations.categorical.ncols(), 0);
        assert_eq!(annotations.continuous.columns(), &strings(&["dose"])[..]);
        assert_eq!(annotations.continuous.column_values(0), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_multi_column_modules_rejected() {
        let table = LabelTable::new(
            vec![site("P1", "S1")],
            strings(&["x", "y"]),
            vec![vec![Some("0".to_string()), Some("1".to_string())]],
        );
        assert!(matches!(
            ModuleLabeling::try_from(table),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_association_requires_annotations() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4);
        let result = data.annotation_association(&AssociationConfig::default());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_scores_require_modules() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4);
        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap();
        let result = data.calculate_module_scores(&ScoreConfig::default());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_full_pipeline_with_search_regulators_and_annotations() {
        let (phospho, protein) = synthetic();
        let mut data = ProteomicsData::new(&phospho, &protein, 4);
        let search = KMeansSearch::builder().n_clusters(vec![2, 3]).build();
        data.normalize_phospho_by_protein(&NormalizeConfig::default())
            .unwrap()
            .assign_modules_by_search(&search, &Selection::default())
            .unwrap();
        let config = ScoreConfig::builder().combine_anti_regulated(false).build();
        data.calculate_module_scores(&config).unwrap();
        assert_eq!(
            data.clustering_parameters().unwrap()["n_clusters"],
            "2".to_string()
        );

        data.collect_putative_regulators(&strings(&["P1"]), &RegulatorConfig::default())
            .unwrap()
            .calculate_regulator_coefficients(&RegulatorConfig::default())
            .unwrap();
        let coefficients = data.regulator_coefficients().unwrap();
        assert_eq!(coefficients.nrows(), 2);
        assert_eq!(
            coefficients.columns(),
            &data.putative_regulator_data().unwrap().representatives.rows().to_vec()[..]
        );

        let annotations = AnnotationTable::new(
            strings(&["s1", "s2", "s3", "s4"]),
            strings(&["group", "dose"]),
            vec![
                vec![Some("x".to_string()), Some("1".to_string())],
                vec![Some("x".to_string()), Some("2".to_string())],
                vec![Some("y".to_string()), Some("3".to_string())],
                vec![Some("y".to_string()), Some("4".to_string())],
            ],
        );
        data.add_annotations(&annotations, &strings(&["cat", "cont"]))
            .unwrap()
            .annotation_association(&AssociationConfig::default())
            .unwrap();
        let results = data.association().unwrap();
        assert_eq!(
            results.association.table.columns(),
            &strings(&["dose", "group_x", "group_y"])[..]
        );
        assert_eq!(results.association.table.nrows(), 2);
        assert_eq!(
            results.fdr.table.columns(),
            results.association.table.columns()
        );
    }
}
