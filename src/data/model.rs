use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectraError};

// ---------------------------------------------------------------------------
// Label – binary class indicator, always the trailing column
// ---------------------------------------------------------------------------

/// Binary class membership of a sample. Stored and serialized as `0` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Label {
    /// `0`, class B (white blood cells in the reference setup).
    Negative,
    /// `1`, class A (red blood cells in the reference setup).
    Positive,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Negative, Label::Positive];

    /// Integer value of the label column.
    pub fn index(self) -> usize {
        match self {
            Label::Negative => 0,
            Label::Positive => 1,
        }
    }

    pub fn from_index(value: i64) -> Option<Self> {
        match value {
            0 => Some(Label::Negative),
            1 => Some(Label::Positive),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Label::Negative => Label::Positive,
            Label::Positive => Label::Negative,
        }
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> u8 {
        label.index() as u8
    }
}

impl TryFrom<u8> for Label {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Label::from_index(value as i64).ok_or_else(|| format!("label must be 0 or 1, got {value}"))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

// ---------------------------------------------------------------------------
// Spectrum – one reduced image
// ---------------------------------------------------------------------------

/// Column-averaged intensity profile of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// One intensity per image column.
    pub values: Vec<f64>,
    /// File name the spectrum was reduced from, when known.
    pub source: Option<String>,
}

impl Spectrum {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// A spectrum together with its class label.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub spectrum: Spectrum,
    pub label: Label,
}

/// All spectra of one class, in load order.
#[derive(Debug, Clone)]
pub struct ClassSpectra {
    pub label: Label,
    pub spectra: Vec<Spectrum>,
}

impl ClassSpectra {
    pub fn new(label: Label, spectra: Vec<Spectrum>) -> Self {
        Self { label, spectra }
    }
}

// ---------------------------------------------------------------------------
// Dataset – the labeled feature table
// ---------------------------------------------------------------------------

/// Ordered, fixed-width, labeled sample table.
///
/// Logically `len() × (width() + 1)`: `width()` spectral bins followed by the
/// label column. Rows keep insertion order and are never modified once the
/// dataset is built.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<SampleRecord>,
    width: usize,
}

impl Dataset {
    /// Build a dataset from records, enforcing a common spectrum width and
    /// finite bin values.
    pub fn from_records(records: Vec<SampleRecord>) -> Result<Self> {
        let width = records
            .first()
            .map(|r| r.spectrum.width())
            .ok_or(SpectraError::EmptyDataset)?;
        if let Some(bad) = records.iter().find(|r| r.spectrum.width() != width) {
            return Err(SpectraError::WidthMismatch {
                expected: width,
                actual: bad.spectrum.width(),
            });
        }
        for (row, record) in records.iter().enumerate() {
            if let Some((bin, v)) = record
                .spectrum
                .values
                .iter()
                .enumerate()
                .find(|(_, v)| !v.is_finite())
            {
                return Err(SpectraError::InvalidParameter {
                    param: "spectrum value",
                    value: format!("{v} (row {row}, bin {bin})"),
                    constraint: "spectrum values must be finite",
                });
            }
        }
        Ok(Self { records, width })
    }

    /// Stack class A then class B, each row tagged with its class label.
    ///
    /// Fails with [`SpectraError::WidthMismatch`] when the two classes (or
    /// two spectra inside one class) disagree on width; nothing is built in
    /// that case.
    pub fn assemble(class_a: ClassSpectra, class_b: ClassSpectra) -> Result<Self> {
        if class_a.label == class_b.label {
            return Err(SpectraError::InvalidParameter {
                param: "class label",
                value: class_a.label.to_string(),
                constraint: "the two classes need distinct labels",
            });
        }

        let width_a = class_width(&class_a)?;
        let width_b = class_width(&class_b)?;
        if let (Some(a), Some(b)) = (width_a, width_b) {
            if a != b {
                return Err(SpectraError::WidthMismatch {
                    expected: a,
                    actual: b,
                });
            }
        }

        let records = [class_a, class_b]
            .into_iter()
            .flat_map(|class| {
                let label = class.label;
                class
                    .spectra
                    .into_iter()
                    .map(move |spectrum| SampleRecord { spectrum, label })
            })
            .collect();
        Self::from_records(records)
    }

    /// Number of samples (rows).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of spectral bins per sample.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of table columns, label included.
    pub fn n_columns(&self) -> usize {
        self.width + 1
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn labels(&self) -> Vec<Label> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// Number of rows carrying `label`.
    pub fn count(&self, label: Label) -> usize {
        self.records.iter().filter(|r| r.label == label).count()
    }

    /// Unlabeled `len() × width()` feature matrix.
    pub fn features(&self) -> DMatrix<f64> {
        self.features_of(&(0..self.len()).collect::<Vec<_>>())
    }

    /// Feature matrix restricted to the given rows, in the given order.
    pub fn features_of(&self, rows: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), self.width, |i, j| {
            self.records[rows[i]].spectrum.values[j]
        })
    }

    pub fn labels_of(&self, rows: &[usize]) -> Vec<Label> {
        rows.iter().map(|&i| self.records[i].label).collect()
    }
}

fn class_width(class: &ClassSpectra) -> Result<Option<usize>> {
    let Some(first) = class.spectra.first() else {
        return Ok(None);
    };
    let width = first.width();
    match class.spectra.iter().find(|s| s.width() != width) {
        Some(bad) => Err(SpectraError::WidthMismatch {
            expected: width,
            actual: bad.width(),
        }),
        None => Ok(Some(width)),
    }
}
