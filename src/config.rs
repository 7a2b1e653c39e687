use std::{fs::File, path::Path};

use adjustp::{adjust, Procedure};
use bon::Builder;
use serde::Deserialize;

use crate::error::Result;

/// Joins the labels of two anti-correlated modules that were merged
pub const MODULE_COMBINER_DELIM: &str = "-*-";

/// Separates parameters in a clustering label identifier
pub const PARAM_DELIM: &str = ";";

/// Separates a parameter name from its value in a clustering label identifier
pub const VAL_DELIM: &str = "-";

/// Joins an annotation column name with one of its categories
pub const CATEGORY_DELIM: &str = "_";

/// Joins the labels of regulator rows collapsed into one representative
pub const REGULATOR_COMBINER_DELIM: &str = "|";

/// Tokens read as missing values by every table parser
pub const MISSING_TOKENS: [&str; 6] = ["na", "NA", "NAN", "nan", "NaN", "Na"];

pub const DEFAULT_MIN_COMMON_VALUES: usize = 5;

/// Candidate ridge penalties used when the caller supplies none
pub const DEFAULT_RIDGE_ALPHAS: [f64; 3] = [0.1, 1.0, 10.0];

/// Minimum number of samples shared by annotations and normalized phospho
pub const MIN_ANNOTATION_SAMPLES: usize = 2;

/// How an annotation column is treated during association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Categorical,
    Continuous,
}

/// Type codes accepted in an annotation column-type listing
pub const ANNOTATION_TYPE_CODES: [(&str, AnnotationKind); 6] = [
    ("categorical", AnnotationKind::Categorical),
    ("cat", AnnotationKind::Categorical),
    ("0", AnnotationKind::Categorical),
    ("continuous", AnnotationKind::Continuous),
    ("cont", AnnotationKind::Continuous),
    ("1", AnnotationKind::Continuous),
];

impl AnnotationKind {
    /// Resolves a type code against `codes`, ignoring case and surrounding whitespace
    pub fn from_code(code: &str, codes: &[(&str, AnnotationKind)]) -> Option<Self> {
        let code = code.trim();
        codes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(code))
            .map(|(_, kind)| *kind)
    }
}

/// Continuous-vs-continuous association statistic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

/// Categorical-vs-continuous association statistic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalMethod {
    #[default]
    MannWhitney,
    WelchT,
}

/// Multiple-testing correction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    Identity,
    #[default]
    BenjaminiHochberg,
    BenjaminiYekutieli,
    Bonferroni,
}
impl Correction {
    /// Adjusts the non-missing entries of `pvalues`; missing entries stay missing
    pub fn transform(&self, pvalues: &[f64]) -> Vec<f64> {
        let present = pvalues
            .iter()
            .copied()
            .filter(|p| !p.is_nan())
            .collect::<Vec<_>>();
        if present.is_empty() {
            return pvalues.to_vec();
        }
        let adjusted = match self {
            Correction::Identity => present,
            Correction::BenjaminiHochberg => adjust(&present, Procedure::BenjaminiHochberg),
            Correction::BenjaminiYekutieli => adjust(&present, Procedure::BenjaminiYekutieli),
            Correction::Bonferroni => adjust(&present, Procedure::Bonferroni),
        };
        let mut adjusted = adjusted.into_iter();
        pvalues
            .iter()
            .map(|p| {
                if p.is_nan() {
                    f64::NAN
                } else {
                    adjusted.next().unwrap_or(f64::NAN)
                }
            })
            .collect()
    }
}

/// Whether a clustering metric is better when small or large
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Minimize,
    Maximize,
}
impl Direction {
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }
}

/// Evaluation metric used to compare candidate labelings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Silhouette,
    Inertia,
}

/// Chooses the best labeling among clustering candidates
#[derive(Debug, Clone, Copy, Builder, Deserialize)]
pub struct Selection {
    #[builder(default = Metric::Silhouette)]
    pub metric: Metric,
    #[builder(default = Direction::Maximize)]
    pub direction: Direction,
}
impl Default for Selection {
    fn default() -> Self {
        Selection::builder().build()
    }
}

#[derive(Debug, Clone, Default, Builder, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Candidate ridge penalties; `DEFAULT_RIDGE_ALPHAS` when absent
    pub ridge_cv_alphas: Option<Vec<f64>>,
}
impl NormalizeConfig {
    pub fn alphas(&self) -> Vec<f64> {
        self.ridge_cv_alphas
            .clone()
            .unwrap_or_else(|| DEFAULT_RIDGE_ALPHAS.to_vec())
    }
}

#[derive(Debug, Clone, Copy, Builder, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    #[builder(default = true)]
    pub combine_anti_regulated: bool,
    #[builder(default = 0.9)]
    pub anti_corr_threshold: f64,
}
impl Default for ScoreConfig {
    fn default() -> Self {
        ScoreConfig::builder().build()
    }
}

#[derive(Debug, Clone, Builder, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    #[builder(default = 0.9)]
    pub corr_threshold: f64,
    pub ridge_cv_alphas: Option<Vec<f64>>,
}
impl Default for RegulatorConfig {
    fn default() -> Self {
        RegulatorConfig::builder().build()
    }
}
impl RegulatorConfig {
    pub fn alphas(&self) -> Vec<f64> {
        self.ridge_cv_alphas
            .clone()
            .unwrap_or_else(|| DEFAULT_RIDGE_ALPHAS.to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default, Builder, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    #[builder(default)]
    pub cat_method: CategoricalMethod,
    #[builder(default)]
    pub cont_method: CorrelationMethod,
    #[builder(default)]
    pub correction: Correction,
}

/// Parameters of the built-in k-means module search and its selection rule
#[derive(Debug, Clone, Builder, Deserialize)]
#[serde(default)]
pub struct ModuleSearchConfig {
    #[builder(default = vec![2, 3, 4, 5, 6, 7, 8])]
    pub n_clusters: Vec<usize>,
    #[builder(default = 0)]
    pub seed: u64,
    #[builder(default = 300)]
    pub max_iter: usize,
    #[builder(default = Metric::Silhouette)]
    pub metric: Metric,
    #[builder(default = Direction::Maximize)]
    pub direction: Direction,
}
impl Default for ModuleSearchConfig {
    fn default() -> Self {
        ModuleSearchConfig::builder().build()
    }
}
impl ModuleSearchConfig {
    pub fn selection(&self) -> Selection {
        Selection::builder()
            .metric(self.metric)
            .direction(self.direction)
            .build()
    }
}

/// Per-stage keyword overrides, keyed by stage name
///
/// Every section is optional; absent sections keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StageOverrides {
    pub normalize_phospho_by_protein: NormalizeConfig,
    pub assign_modules: ModuleSearchConfig,
    pub calculate_module_scores: ScoreConfig,
    pub collect_putative_regulators: RegulatorConfig,
    pub calculate_regulator_coefficients: RegulatorConfig,
    pub calculate_annotation_association: AssociationConfig,
}
impl StageOverrides {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}
