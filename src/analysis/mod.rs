/// Separability analysis of an assembled dataset.
///
/// ```text
///   Dataset ──▶ split ──▶ classify        accuracy + confusion matrix
///      │
///      ├────▶ pca                         scree ratios, 2D projection
///      │
///      └────▶ cluster                     k-means ids, label agreement
/// ```
///
/// Every stage reads the dataset through row indices or a freshly built
/// feature matrix; none of them modifies it.

pub mod classify;
pub mod cluster;
pub mod pca;
pub mod split;

use serde::{Deserialize, Serialize};

use classify::ClassifierConfig;
use cluster::KMeansConfig;
use pca::PcaConfig;
use split::SplitConfig;

/// Parameters of every analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub split: SplitConfig,
    pub classifier: ClassifierConfig,
    pub pca: PcaConfig,
    pub kmeans: KMeansConfig,
}
