use serde::Serialize;

use crate::analysis::AnalysisConfig;
use crate::analysis::classify::{self, ClassificationReport};
use crate::analysis::cluster::{KMeans, LabelAgreement, best_label_agreement};
use crate::analysis::pca::{Pca, ProjectedSample, ScreeEntry, project_2d};
use crate::analysis::split::train_test_split;
use crate::config::{ClassConfig, Config};
use crate::data::images::load_class_folder;
use crate::data::model::{ClassSpectra, Dataset, Label};
use crate::data::reduce::SpectralReducer;
use crate::error::{ConvergenceWarning, Result};

/// One row of the cluster table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterRow {
    pub sample: usize,
    pub cluster: usize,
    pub label: Label,
}

/// Everything the analysis hands to reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub n_samples: usize,
    pub width: usize,
    pub n_positive: usize,
    pub n_negative: usize,
    pub classification: ClassificationReport,
    pub scree: Vec<ScreeEntry>,
    pub projection: Vec<ProjectedSample>,
    pub clusters: Vec<ClusterRow>,
    pub cluster_inertia: f64,
    /// Present when exactly two clusters were requested.
    pub cluster_agreement: Option<LabelAgreement>,
    pub warnings: Vec<ConvergenceWarning>,
}

fn load_class(class: &ClassConfig, reducer: &SpectralReducer) -> Result<ClassSpectra> {
    log::info!("loading class {} (label {}) from {}", class.name, class.label, class.folder.display());
    let spectra = load_class_folder(&class.folder, reducer)?;
    Ok(ClassSpectra::new(class.label, spectra))
}

/// Reduce both class folders and assemble the labeled dataset.
pub fn build_dataset(config: &Config) -> Result<Dataset> {
    config.validate()?;
    let reducer = config.reducer();
    let class_a = load_class(&config.class_a, &reducer)?;
    let class_b = load_class(&config.class_b, &reducer)?;
    let dataset = Dataset::assemble(class_a, class_b)?;
    log::info!(
        "dataset: {} rows × {} columns (gain {})",
        dataset.len(),
        dataset.n_columns(),
        reducer.gain()
    );
    Ok(dataset)
}

/// Full run: images → dataset → analysis.
pub fn run(config: &Config) -> Result<(Dataset, AnalysisReport)> {
    let dataset = build_dataset(config)?;
    let report = analyze(&dataset, &config.analysis)?;
    Ok((dataset, report))
}

/// Classification, PCA and clustering of an assembled dataset.
pub fn analyze(dataset: &Dataset, config: &AnalysisConfig) -> Result<AnalysisReport> {
    let mut warnings = Vec::new();

    let split = train_test_split(dataset, &config.split)?;
    let classification = classify::evaluate(&split, &config.classifier)?;
    warnings.extend(classification.warning.clone());

    let features = dataset.features();
    let scree_model = Pca::new(config.pca.scree_components)
        .with_max_iter(config.pca.max_iter)
        .fit(&features)?;
    warnings.extend(scree_model.warning().cloned());
    let scree = scree_model.scree();
    if let Some(first) = scree.first() {
        log::info!(
            "PCA: {} components, first explains {:.4} of the variance",
            scree.len(),
            first.variance_ratio
        );
    }

    let (projection, projection_model) = project_2d(dataset, config.pca.max_iter)?;
    warnings.extend(projection_model.warning().cloned());

    let clustering = KMeans::new(config.kmeans.clone()).fit(&features)?;
    warnings.extend(clustering.warning.clone());
    let labels = dataset.labels();
    let cluster_agreement = if config.kmeans.n_clusters == 2 {
        let agreement = best_label_agreement(&clustering.assignments, &labels)?;
        log::info!(
            "k-means agrees with labels on {:.3} of samples (cluster {} = label 1)",
            agreement.agreement,
            agreement.positive_cluster
        );
        Some(agreement)
    } else {
        None
    };
    let clusters = clustering
        .assignments
        .iter()
        .zip(&labels)
        .enumerate()
        .map(|(sample, (&cluster, &label))| ClusterRow {
            sample,
            cluster,
            label,
        })
        .collect();

    if !warnings.is_empty() {
        log::warn!("analysis finished with {} convergence warning(s)", warnings.len());
    }
    Ok(AnalysisReport {
        n_samples: dataset.len(),
        width: dataset.width(),
        n_positive: dataset.count(Label::Positive),
        n_negative: dataset.count(Label::Negative),
        classification,
        scree,
        projection,
        clusters,
        cluster_inertia: clustering.inertia,
        cluster_agreement,
        warnings,
    })
}
