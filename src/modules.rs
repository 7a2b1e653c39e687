use std::collections::{BTreeMap, HashMap};

use derive_new::new;
use itertools::Itertools;

use crate::{
    config::{Metric, Selection, PARAM_DELIM, VAL_DELIM},
    error::{Error, Result},
    matrix::{PhosphoMatrix, SiteKey},
};

/// Labels of phosphosites under one or more labelings, one column per labeling
///
/// This is the shape module files arrive in; it must be narrowed to a
/// [`ModuleLabeling`] before the pipeline accepts it.
#[derive(Debug, Clone, new)]
pub struct LabelTable {
    pub rows: Vec<SiteKey>,
    pub columns: Vec<String>,
    /// Row-major labels, `None` where a site is unlabeled
    pub labels: Vec<Vec<Option<String>>>,
}

/// Exactly one module label per phosphosite
///
/// `name` identifies the labeling and carries the clustering parameters it
/// was produced with, e.g. `KMeans;n_clusters-4`.
#[derive(Debug, Clone)]
pub struct ModuleLabeling {
    name: String,
    keys: Vec<SiteKey>,
    labels: Vec<String>,
    index: HashMap<SiteKey, usize>,
}

impl ModuleLabeling {
    /// Builds a labeling, keeping the first label seen for a repeated site
    pub fn new(name: impl Into<String>, assignments: Vec<(SiteKey, String)>) -> Self {
        let mut keys = Vec::with_capacity(assignments.len());
        let mut labels = Vec::with_capacity(assignments.len());
        let mut index = HashMap::with_capacity(assignments.len());
        for (key, label) in assignments {
            if index.contains_key(&key) {
                continue;
            }
            index.insert(key.clone(), keys.len());
            keys.push(key);
            labels.push(label);
        }
        Self {
            name: name.into(),
            keys,
            labels,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[SiteKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn label(&self, key: &SiteKey) -> Option<&str> {
        self.index.get(key).map(|&i| self.labels[i].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SiteKey, &str)> {
        self.keys
            .iter()
            .zip(self.labels.iter().map(|l| l.as_str()))
    }

    /// Distinct module labels in sorted order
    pub fn modules(&self) -> Vec<String> {
        self.labels.iter().unique().sorted().cloned().collect()
    }

    /// Number of phosphosites of each module that have a row in `data`
    ///
    /// Every module is listed; a module none of whose sites are present
    /// counts zero.
    pub fn membership_counts(&self, data: &PhosphoMatrix) -> BTreeMap<String, usize> {
        let mut counts = self
            .modules()
            .into_iter()
            .map(|module| (module, 0))
            .collect::<BTreeMap<_, _>>();
        for (_, label) in self.iter().filter(|(key, _)| data.contains_row(key)) {
            *counts.entry(label.to_string()).or_default() += 1;
        }
        counts
    }

    /// Clustering parameters embedded in the labeling name
    pub fn parameters(&self) -> Result<BTreeMap<String, String>> {
        parse_clustering_parameters(&self.name)
    }
}

impl TryFrom<LabelTable> for ModuleLabeling {
    type Error = Error;

    /// Narrows a label table with a single column; unlabeled sites are dropped
    fn try_from(table: LabelTable) -> Result<Self> {
        if table.columns.len() != 1 {
            return Err(Error::Validation(format!(
                "Expected exactly 1 column of module labels but found {}; provide a table with a single labeling",
                table.columns.len()
            )));
        }
        let name = table.columns[0].clone();
        let assignments = table
            .rows
            .into_iter()
            .zip(table.labels)
            .filter_map(|(key, mut labels)| labels.pop().flatten().map(|label| (key, label)))
            .collect();
        Ok(ModuleLabeling::new(name, assignments))
    }
}

/// Splits a labeling identifier into its parameter mapping
///
/// The identifier is the clusterer name followed by `key-value` pairs, all
/// separated by `PARAM_DELIM`. The clusterer name is stored under `clusterer`.
pub fn parse_clustering_parameters(name: &str) -> Result<BTreeMap<String, String>> {
    let mut tokens = name.split(PARAM_DELIM);
    let clusterer = tokens.next().unwrap_or_default().to_string();
    let mut parameters = tokens
        .map(|token| {
            token
                .split_once(VAL_DELIM)
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "clustering parameter '{}' in '{}' has no '{}' separated value",
                        token, name, VAL_DELIM
                    ))
                })
        })
        .collect::<Result<BTreeMap<_, _>>>()?;
    parameters.insert("clusterer".to_string(), clusterer);
    Ok(parameters)
}

/// One candidate labeling with its evaluation metrics
#[derive(Debug, Clone, new)]
pub struct Candidate {
    pub labeling: ModuleLabeling,
    pub metrics: HashMap<Metric, f64>,
}

/// All labelings produced by a clustering search
#[derive(Debug, Clone, Default)]
pub struct CandidateLabelings {
    pub candidates: Vec<Candidate>,
}
impl CandidateLabelings {
    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    /// Returns the candidate scoring best under `selection`
    ///
    /// Candidates missing the metric are ignored; ties keep the earliest candidate.
    pub fn pick_best(self, selection: &Selection) -> Result<ModuleLabeling> {
        let mut best: Option<(f64, ModuleLabeling)> = None;
        for candidate in self.candidates {
            let Some(&score) = candidate.metrics.get(&selection.metric) else {
                continue;
            };
            if score.is_nan() {
                continue;
            }
            let improves = best
                .as_ref()
                .map_or(true, |(incumbent, _)| selection.direction.is_better(score, *incumbent));
            if improves {
                best = Some((score, candidate.labeling));
            }
        }
        best.map(|(_, labeling)| labeling).ok_or_else(|| {
            Error::Validation(format!(
                "no candidate labeling could be evaluated with {:?}",
                selection.metric
            ))
        })
    }
}

/// A module-discovery search over normalized phosphosites
pub trait Clusterer {
    fn search(&self, data: &PhosphoMatrix) -> Result<CandidateLabelings>;
}
