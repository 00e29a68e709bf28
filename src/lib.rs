//! Reduces diffraction images of two blood cell classes to 1D spectra,
//! assembles them into a labeled dataset and measures how separable the
//! classes are with logistic regression, PCA and k-means.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::Config;
pub use data::model::{Dataset, Label, Spectrum};
pub use error::{ConvergenceWarning, SpectraError};
pub use pipeline::{AnalysisReport, analyze, build_dataset, run};
