use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use phosphomod::{
    config::{StageOverrides, DEFAULT_MIN_COMMON_VALUES},
    io::{
        read_annotation, read_list, read_modules, read_phospho, read_protein, write_association,
        write_matrix, write_modules, write_phospho,
    },
    KMeansSearch, ModuleLabeling, ProteomicsData,
};

/// Discovers co-regulated phosphosite modules from paired phospho and protein abundances
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Phosphosite abundances (.csv or .tsv), indexed by protein and site
    phospho: PathBuf,

    /// Protein abundances (.csv or .tsv), indexed by protein
    protein: PathBuf,

    /// Prefix of every output file
    #[arg(short, long, default_value = "phdc")]
    output_prefix: String,

    /// Fewest samples a phosphosite must share with its protein to be normalized
    #[arg(long, default_value_t = DEFAULT_MIN_COMMON_VALUES)]
    min_common_values: usize,

    /// Precomputed protein-normalized phospho; skips normalization
    #[arg(long)]
    normed_phospho: Option<PathBuf>,

    /// Precomputed single-column module labels; skips the module search
    #[arg(long)]
    modules: Option<PathBuf>,

    /// Candidate regulators, one identifier per line
    #[arg(long)]
    putative_regulator_list: Option<PathBuf>,

    /// Sample annotations (.csv or .tsv), indexed by sample
    #[arg(long)]
    annotations: Option<PathBuf>,

    /// Annotation column type codes, one per line in annotation column order
    #[arg(long)]
    annotation_column_types: Option<PathBuf>,

    /// YAML file of per-stage parameter overrides
    #[arg(long)]
    additional_kwargs_yml: Option<PathBuf>,
}

fn output_path(prefix: &str, name: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}.{name}.csv"))
}

fn log_parameters(cli: &Cli) {
    let optional = |p: &Option<PathBuf>| {
        p.as_deref()
            .map_or_else(|| "None".to_string(), |p| p.display().to_string())
    };
    info!("Parameter phospho: {}", cli.phospho.display());
    info!("Parameter protein: {}", cli.protein.display());
    info!("Parameter output_prefix: {}", cli.output_prefix);
    info!("Parameter min_common_values: {}", cli.min_common_values);
    info!("Parameter normed_phospho: {}", optional(&cli.normed_phospho));
    info!("Parameter modules: {}", optional(&cli.modules));
    info!(
        "Parameter putative_regulator_list: {}",
        optional(&cli.putative_regulator_list)
    );
    info!("Parameter annotations: {}", optional(&cli.annotations));
    info!(
        "Parameter annotation_column_types: {}",
        optional(&cli.annotation_column_types)
    );
    info!(
        "Parameter additional_kwargs_yml: {}",
        optional(&cli.additional_kwargs_yml)
    );
}

fn load_overrides(path: Option<&Path>) -> Result<StageOverrides> {
    match path {
        Some(path) => StageOverrides::from_yaml_file(path)
            .with_context(|| format!("Unable to parse overrides from {}", path.display())),
        None => Ok(StageOverrides::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    info!("Running phosphomod");
    log_parameters(&cli);

    let overrides = load_overrides(cli.additional_kwargs_yml.as_deref())?;
    let phospho = read_phospho(&cli.phospho)
        .with_context(|| format!("Unable to read phospho from {}", cli.phospho.display()))?;
    let protein = read_protein(&cli.protein)
        .with_context(|| format!("Unable to read protein from {}", cli.protein.display()))?;

    let mut data = ProteomicsData::new(&phospho, &protein, cli.min_common_values);

    match &cli.normed_phospho {
        Some(path) => {
            let normed = read_phospho(path).with_context(|| {
                format!("Unable to read normalized phospho from {}", path.display())
            })?;
            data = data.with_normed_phospho(normed);
        }
        None => {
            data.normalize_phospho_by_protein(&overrides.normalize_phospho_by_protein)?;
            if let Some(normed) = data.normed_phospho() {
                write_phospho(output_path(&cli.output_prefix, "normed_phospho"), normed)?;
            }
        }
    }

    match &cli.modules {
        Some(path) => {
            let table = read_modules(path)
                .with_context(|| format!("Unable to read modules from {}", path.display()))?;
            data = data.with_modules(ModuleLabeling::try_from(table)?)?;
        }
        None => {
            let search = KMeansSearch::from(&overrides.assign_modules);
            data.assign_modules_by_search(&search, &overrides.assign_modules.selection())?;
            if let Some(modules) = data.modules() {
                write_modules(output_path(&cli.output_prefix, "modules"), modules)?;
            }
        }
    }

    data.calculate_module_scores(&overrides.calculate_module_scores)?;
    if let Some(scores) = data.module_scores() {
        write_matrix(
            output_path(&cli.output_prefix, "module_scores"),
            &scores.scores,
            "sample",
        )?;
    }

    if let Some(path) = &cli.putative_regulator_list {
        let regulators = read_list(path).with_context(|| {
            format!("Unable to read putative regulators from {}", path.display())
        })?;
        data.collect_putative_regulators(&regulators, &overrides.collect_putative_regulators)?
            .calculate_regulator_coefficients(&overrides.calculate_regulator_coefficients)?;
        if let Some(coefficients) = data.regulator_coefficients() {
            write_matrix(
                output_path(&cli.output_prefix, "putative_regulator_coefficients"),
                coefficients,
                "module",
            )?;
        }
    }

    if let Some(path) = &cli.annotations {
        let Some(types_path) = &cli.annotation_column_types else {
            error!(
                "Annotations were provided without annotation column types; \
                 skipping annotation association"
            );
            return Ok(());
        };
        let annotations = read_annotation(path)
            .with_context(|| format!("Unable to read annotations from {}", path.display()))?;
        let column_types = read_list(types_path).with_context(|| {
            format!("Unable to read column types from {}", types_path.display())
        })?;
        data.add_annotations(&annotations, &column_types)?
            .annotation_association(&overrides.calculate_annotation_association)?;
        if let Some(results) = data.association() {
            write_association(
                output_path(&cli.output_prefix, "annotation_association"),
                &results.association,
            )?;
            write_association(
                output_path(&cli.output_prefix, "annotation_association_FDR"),
                &results.fdr,
            )?;
        }
    }

    info!("Done");
    Ok(())
}
