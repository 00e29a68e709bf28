//! Principal component analysis by exact SVD of the centered feature matrix.

use nalgebra::{DMatrix, RowDVector};
use serde::{Deserialize, Serialize};

use crate::data::model::{Dataset, Label};
use crate::error::{ConvergenceWarning, Result, SpectraError, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Components in the scree table.
    pub scree_components: usize,
    /// Iteration cap of the bounded SVD before falling back to an unbounded one.
    pub max_iter: usize,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            scree_components: 25,
            max_iter: 10_000,
        }
    }
}

/// One row of the scree table; `component` counts from 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreeEntry {
    pub component: usize,
    pub variance_ratio: f64,
}

/// Leading two component scores of a sample, paired with its label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedSample {
    pub pc1: f64,
    pub pc2: f64,
    pub label: Label,
}

#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    max_iter: usize,
}

/// Fitted principal axes.
#[derive(Debug, Clone)]
pub struct PcaModel {
    mean: RowDVector<f64>,
    /// `k × n_features`, one unit-norm axis per row, strongest first.
    components: DMatrix<f64>,
    explained_variance: Vec<f64>,
    explained_variance_ratio: Vec<f64>,
    warning: Option<ConvergenceWarning>,
}

impl Pca {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: PcaConfig::default().max_iter,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fit on `x` (samples × features).
    ///
    /// At most `min(n_samples, n_features)` components are kept. Each axis
    /// is signed so its largest-magnitude loading is positive, which makes
    /// the result reproducible without any random state.
    pub fn fit(&self, x: &DMatrix<f64>) -> Result<PcaModel> {
        let (n_samples, n_features) = x.shape();
        if n_samples < 2 {
            return Err(SpectraError::InvalidParameter {
                param: "n_samples",
                value: n_samples.to_string(),
                constraint: "PCA needs at least two samples",
            });
        }
        // nalgebra reads an iteration limit of 0 as "unbounded".
        if self.max_iter == 0 {
            return Err(SpectraError::InvalidParameter {
                param: "pca.max_iter",
                value: self.max_iter.to_string(),
                constraint: "must be at least 1",
            });
        }
        let k = self.n_components.min(n_samples).min(n_features);
        if k < self.n_components {
            log::debug!("PCA: {} components requested, {k} available", self.n_components);
        }

        let mean = x.row_mean();
        let centered = DMatrix::from_fn(n_samples, n_features, |i, j| x[(i, j)] - mean[j]);
        let total = centered.norm_squared();

        let mut warning = None;
        let svd = match centered
            .clone()
            .try_svd(false, true, f64::EPSILON, self.max_iter)
        {
            Some(svd) => svd,
            None => {
                warning = Some(ConvergenceWarning::new(
                    Stage::Pca,
                    self.max_iter,
                    "bounded SVD did not converge, used unbounded SVD",
                ));
                centered.svd(false, true)
            }
        };
        let Some(v_t) = svd.v_t else {
            unreachable!("right singular vectors were requested");
        };

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let mut components = DMatrix::<f64>::zeros(k, n_features);
        let mut explained_variance = Vec::with_capacity(k);
        let mut explained_variance_ratio = Vec::with_capacity(k);
        for (row, &idx) in order.iter().take(k).enumerate() {
            let mut axis = v_t.row(idx).clone_owned();
            let pivot = (0..axis.len()).fold(0, |best, j| {
                if axis[j].abs() > axis[best].abs() { j } else { best }
            });
            if axis[pivot] < 0.0 {
                axis.neg_mut();
            }
            components.set_row(row, &axis);

            let s2 = svd.singular_values[idx].powi(2);
            explained_variance.push(s2 / (n_samples - 1) as f64);
            explained_variance_ratio.push(if total > 0.0 { s2 / total } else { 0.0 });
        }

        Ok(PcaModel {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
            warning,
        })
    }
}

impl PcaModel {
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn components(&self) -> &DMatrix<f64> {
        &self.components
    }

    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    pub fn warning(&self) -> Option<&ConvergenceWarning> {
        self.warning.as_ref()
    }

    /// Component scores, `n_samples × n_components`.
    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let centered = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] - self.mean[j]);
        centered * self.components.transpose()
    }

    /// Explained-variance ratios keyed by component number.
    pub fn scree(&self) -> Vec<ScreeEntry> {
        self.explained_variance_ratio
            .iter()
            .enumerate()
            .map(|(i, &variance_ratio)| ScreeEntry {
                component: i + 1,
                variance_ratio,
            })
            .collect()
    }
}

/// Project every sample of `dataset` on its two leading axes.
///
/// When only one axis exists (single feature or two samples) `pc2` is 0.
pub fn project_2d(dataset: &Dataset, max_iter: usize) -> Result<(Vec<ProjectedSample>, PcaModel)> {
    let x = dataset.features();
    let model = Pca::new(2).with_max_iter(max_iter).fit(&x)?;
    let scores = model.transform(&x);

    let samples = dataset
        .records()
        .iter()
        .enumerate()
        .map(|(i, record)| ProjectedSample {
            pc1: scores[(i, 0)],
            pc2: if scores.ncols() > 1 { scores[(i, 1)] } else { 0.0 },
            label: record.label,
        })
        .collect();
    Ok((samples, model))
}
