use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisConfig;
use crate::data::model::Label;
use crate::data::reduce::SpectralReducer;
use crate::error::SpectraError;

/// One sample class: where its images live and which label its rows get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassConfig {
    pub name: String,
    pub folder: PathBuf,
    pub label: Label,
}

/// Everything a run needs, loaded from a JSON file.
///
/// ```json
/// {
///   "class_a": { "name": "RBC", "folder": "data/RBC/LED", "label": 1 },
///   "class_b": { "name": "WBC", "folder": "data/WBC/LED", "label": 0 },
///   "gain": 5,
///   "analysis": { "split": { "test_size": 0.3, "random_state": 0 } }
/// }
/// ```
///
/// Relative folders are resolved against the directory of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub class_a: ClassConfig,
    pub class_b: ClassConfig,
    #[serde(default = "default_gain")]
    pub gain: f64,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_gain() -> f64 {
    SpectralReducer::DEFAULT_GAIN
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;

        if let Some(base) = path.parent() {
            for class in [&mut config.class_a, &mut config.class_b] {
                if class.folder.is_relative() {
                    class.folder = base.join(&class.folder);
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run can succeed with.
    pub fn validate(&self) -> std::result::Result<(), SpectraError> {
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(SpectraError::InvalidParameter {
                param: "gain",
                value: self.gain.to_string(),
                constraint: "must be a positive finite number",
            });
        }
        if self.class_a.label == self.class_b.label {
            return Err(SpectraError::InvalidParameter {
                param: "class label",
                value: self.class_a.label.to_string(),
                constraint: "the two classes need distinct labels",
            });
        }
        Ok(())
    }

    pub fn reducer(&self) -> SpectralReducer {
        SpectralReducer::new(self.gain)
    }
}
