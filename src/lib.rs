//! phosphomod: discovery of co-regulated phosphosite modules
//!
//! This library analyzes paired phosphoproteomics and proteomics
//! measurements. Phosphosite abundances are normalized against their parent
//! protein, clustered into modules, scored per sample, and associated with
//! sample annotations and candidate upstream regulators.
//!
//! The main components of this library are:
//! - `ProteomicsData`: The pipeline orchestrator owning all derived state
//! - `StatsEngine`: The statistical back-end (ridge regression, correlation,
//!   group comparison, multiple-testing correction)
//! - `Clusterer`: The module discovery search, with `KMeansSearch` built in
//! - `io`: Readers and writers for the delimited input and output tables

pub mod align;
pub mod annotations;
pub mod config;
pub mod error;
pub mod io;
pub mod kmeans;
pub mod math;
pub mod matrix;
pub mod modules;
pub mod normalize;
pub mod proteomics;
pub mod regulators;
pub mod results;
pub mod scoring;
pub mod stats;
mod utils;

pub use annotations::{AnnotationTable, Annotations};
pub use config::{
    AssociationConfig, CategoricalMethod, Correction, CorrelationMethod, Direction, Metric,
    ModuleSearchConfig, NormalizeConfig, RegulatorConfig, ScoreConfig, Selection, StageOverrides,
};
pub use error::{Error, Result};
pub use kmeans::KMeansSearch;
pub use matrix::{PhosphoMatrix, ProteinMatrix, RegulatorKey, SampleMatrix, SiteKey};
pub use modules::{CandidateLabelings, Clusterer, LabelTable, ModuleLabeling};
pub use proteomics::ProteomicsData;
pub use results::{AssociationResults, AssociationTable};
pub use scoring::ModuleScores;
pub use stats::{ClassicalStats, StatsEngine};
