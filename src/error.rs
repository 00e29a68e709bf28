use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failures of the reduction and analysis core.
///
/// Everything here is caused by malformed input or configuration, so callers
/// abort the run instead of retrying.
#[derive(Debug, Error)]
pub enum SpectraError {
    #[error("cannot decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image {} has no pixels", .path.display())]
    EmptyImage { path: PathBuf },

    #[error("image {} has {actual} columns, earlier images in the batch have {expected}", .path.display())]
    Shape {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("spectrum width mismatch: expected {expected} bins, found {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("no image files in {}", .0.display())]
    EmptyFolder(PathBuf),

    #[error("dataset has no samples")]
    EmptyDataset,

    #[error("split leaves an empty partition (train = {n_train}, test = {n_test})")]
    EmptyPartition { n_train: usize, n_test: usize },

    #[error("invalid {param} = {value}: {constraint}")]
    InvalidParameter {
        param: &'static str,
        value: String,
        constraint: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpectraError>;

/// Iterative stage that can stop at its iteration limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classifier,
    Pca,
    KMeans,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Classifier => write!(f, "logistic regression"),
            Stage::Pca => write!(f, "PCA"),
            Stage::KMeans => write!(f, "k-means"),
        }
    }
}

/// Soft failure: the fit hit its iteration limit and returned its best
/// result so far. Attached to results instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceWarning {
    pub stage: Stage,
    pub iterations: usize,
    pub detail: String,
}

impl ConvergenceWarning {
    /// Build the warning and log it.
    pub fn new(stage: Stage, iterations: usize, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::warn!("{stage} did not converge after {iterations} iterations: {detail}");
        Self {
            stage,
            iterations,
            detail,
        }
    }
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} did not converge after {} iterations ({})",
            self.stage, self.iterations, self.detail
        )
    }
}
