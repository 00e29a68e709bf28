//! Binary logistic regression and its evaluation on a train/test split.

use nalgebra::{DMatrix, DVector, RowDVector};
use serde::{Deserialize, Serialize};

use super::split::TrainTestSplit;
use crate::data::model::Label;
use crate::error::{ConvergenceWarning, Result, SpectraError, Stage};

/// Logistic regression hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Gradient descent step size. When unset, `1/L` with `L` the Frobenius
    /// bound on the Lipschitz constant of the loss gradient.
    pub learning_rate: Option<f64>,
    /// Maximum number of full-batch iterations.
    pub max_iter: usize,
    /// Stop once every gradient component is below this value.
    pub tol: f64,
    /// Inverse L2 regularization strength.
    pub c: f64,
    /// Standardize features with training statistics before fitting.
    pub standardize: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            learning_rate: None,
            max_iter: 1000,
            tol: 1e-4,
            c: 1.0,
            standardize: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Standardizer
// ---------------------------------------------------------------------------

/// Per-column centering and scaling fitted on one matrix and applied to others.
#[derive(Debug, Clone)]
pub struct Standardizer {
    mean: RowDVector<f64>,
    scale: RowDVector<f64>,
}

impl Standardizer {
    /// Columns with zero variance keep a scale of 1.
    pub fn fit(x: &DMatrix<f64>) -> Self {
        let mean = x.row_mean();
        let scale = RowDVector::from_iterator(
            x.ncols(),
            x.column_iter().zip(mean.iter()).map(|(col, &m)| {
                let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / x.nrows() as f64;
                if var > 0.0 { var.sqrt() } else { 1.0 }
            }),
        );
        Self { mean, scale }
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
            (x[(i, j)] - self.mean[j]) / self.scale[j]
        })
    }
}

// ---------------------------------------------------------------------------
// LogisticRegression
// ---------------------------------------------------------------------------

/// L2-regularized binary logistic regression fitted by gradient descent.
///
/// Minimizes `mean(log_loss) + ||w||² / (2·C·n)`, the per-sample form of the
/// usual `C·Σ log_loss + ||w||² / 2` objective. The intercept is not
/// penalized.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    config: ClassifierConfig,
}

/// Weights learned by [`LogisticRegression::fit`].
#[derive(Debug, Clone)]
pub struct FittedLogisticRegression {
    scaler: Option<Standardizer>,
    coefficients: DVector<f64>,
    intercept: f64,
    n_iter: usize,
    warning: Option<ConvergenceWarning>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Fit on `x` (samples × features) against `y`.
    ///
    /// When `max_iter` is reached before the gradient falls under `tol`, the
    /// fitted model carries a warning but is usable either way.
    pub fn fit(&self, x: &DMatrix<f64>, y: &[Label]) -> Result<FittedLogisticRegression> {
        let (n_samples, n_features) = x.shape();
        if n_samples != y.len() {
            return Err(SpectraError::InvalidParameter {
                param: "labels",
                value: y.len().to_string(),
                constraint: "one label per training row is required",
            });
        }
        if n_samples == 0 {
            return Err(SpectraError::EmptyPartition {
                n_train: 0,
                n_test: 0,
            });
        }
        let cfg = &self.config;
        if !(cfg.c > 0.0 && cfg.learning_rate.map_or(true, |lr| lr > 0.0)) {
            return Err(SpectraError::InvalidParameter {
                param: "classifier",
                value: format!("c = {}, learning_rate = {:?}", cfg.c, cfg.learning_rate),
                constraint: "c and learning_rate must be positive",
            });
        }

        let scaler = cfg.standardize.then(|| Standardizer::fit(x));
        let xs = match &scaler {
            Some(s) => s.transform(x),
            None => x.clone(),
        };
        let target = DVector::from_iterator(n_samples, y.iter().map(|l| l.index() as f64));
        let n = n_samples as f64;
        let penalty = 1.0 / (cfg.c * n);
        // The intercept acts as an extra all-ones column.
        let lipschitz = 0.25 * (xs.norm_squared() / n + 1.0) + penalty;
        let step = cfg.learning_rate.unwrap_or(1.0 / lipschitz);

        let mut w = DVector::<f64>::zeros(n_features);
        let mut b = 0.0;
        let mut converged = false;
        let mut n_iter = 0;
        let mut max_grad = f64::INFINITY;

        for iter in 1..=cfg.max_iter {
            n_iter = iter;
            let z = &xs * &w;
            let residual = DVector::from_iterator(
                n_samples,
                z.iter().zip(target.iter()).map(|(&z, &t)| sigmoid(z + b) - t),
            );
            let grad_w = xs.tr_mul(&residual) / n + &w * penalty;
            let grad_b = residual.sum() / n;

            max_grad = grad_w.amax().max(grad_b.abs());
            if max_grad < cfg.tol {
                converged = true;
                break;
            }
            w -= grad_w * step;
            b -= step * grad_b;
        }

        log::debug!("logistic regression stopped after {n_iter} iterations (|grad| = {max_grad:.3e})");
        let warning = (!converged).then(|| {
            ConvergenceWarning::new(
                Stage::Classifier,
                n_iter,
                format!("largest gradient component {max_grad:.3e} above tolerance {:e}", self.config.tol),
            )
        });
        Ok(FittedLogisticRegression {
            scaler,
            coefficients: w,
            intercept: b,
            n_iter,
            warning,
        })
    }
}

impl FittedLogisticRegression {
    /// Probability of [`Label::Positive`] for each row.
    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let xs = match &self.scaler {
            Some(s) => s.transform(x),
            None => x.clone(),
        };
        let z = xs * &self.coefficients;
        z.iter().map(|&z| sigmoid(z + self.intercept)).collect()
    }

    /// Predicted label per row, `Positive` when the probability is at least 0.5.
    pub fn predict(&self, x: &DMatrix<f64>) -> Vec<Label> {
        self.predict_proba(x)
            .into_iter()
            .map(|p| if p >= 0.5 { Label::Positive } else { Label::Negative })
            .collect()
    }

    pub fn coefficients(&self) -> &DVector<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn warning(&self) -> Option<&ConvergenceWarning> {
        self.warning.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// 2×2 table of counts: `counts[actual][predicted]`, indexed by label value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_labels(actual: &[Label], predicted: &[Label]) -> Self {
        debug_assert_eq!(actual.len(), predicted.len());
        let mut counts = [[0; 2]; 2];
        for (a, p) in actual.iter().zip(predicted) {
            counts[a.index()][p.index()] += 1;
        }
        Self { counts }
    }

    pub fn get(&self, actual: Label, predicted: Label) -> usize {
        self.counts[actual.index()][predicted.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        self.counts[0][0] + self.counts[1][1]
    }

    /// Fraction of correct predictions; 0 for an empty table.
    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct() as f64 / total as f64,
        }
    }
}

/// Held-out evaluation of one fitted classifier.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub n_train: usize,
    pub n_test: usize,
    pub iterations: usize,
    pub warning: Option<ConvergenceWarning>,
}

/// Fit on the training rows of `split` and score on its test rows.
pub fn evaluate(split: &TrainTestSplit<'_>, config: &ClassifierConfig) -> Result<ClassificationReport> {
    if split.train.is_empty() || split.test.is_empty() {
        return Err(SpectraError::EmptyPartition {
            n_train: split.train.len(),
            n_test: split.test.len(),
        });
    }

    let model = LogisticRegression::new(config.clone())
        .fit(&split.train_features(), &split.train_labels())?;

    let actual = split.test_labels();
    let predicted = model.predict(&split.test_features());
    let confusion = ConfusionMatrix::from_labels(&actual, &predicted);
    let accuracy = confusion.accuracy();

    log::info!(
        "logistic regression: accuracy {accuracy:.3} on {} test rows, confusion {:?}",
        actual.len(),
        confusion.counts
    );
    Ok(ClassificationReport {
        accuracy,
        confusion,
        n_train: split.train.len(),
        n_test: split.test.len(),
        iterations: model.n_iter(),
        warning: model.warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::split::{SplitConfig, train_test_split};
    use crate::data::model::{ClassSpectra, Dataset, Spectrum};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn separable_dataset() -> Dataset {
        let mut rng = StdRng::seed_from_u64(11);
        let mut make = |marker: f64| {
            (0..10)
                .map(|_| {
                    let mut values = vec![marker];
                    values.extend((0..3).map(|_| rng.gen_range(0.0..10.0)));
                    Spectrum::new(values)
                })
                .collect::<Vec<_>>()
        };
        let reds = make(100.0);
        let whites = make(0.0);
        Dataset::assemble(
            ClassSpectra::new(Label::Positive, reds),
            ClassSpectra::new(Label::Negative, whites),
        )
        .unwrap()
    }

    #[test]
    fn test_perfectly_separable_feature() {
        let ds = separable_dataset();
        let split = train_test_split(&ds, &SplitConfig::default()).unwrap();
        let report = evaluate(&split, &ClassifierConfig::default()).unwrap();

        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.confusion.total(), split.test.len());
        assert_eq!(report.confusion.get(Label::Positive, Label::Negative), 0);
        assert_eq!(report.confusion.get(Label::Negative, Label::Positive), 0);
        assert_eq!((report.n_train, report.n_test), (14, 6));
    }

    #[test]
    fn test_identical_classes_score_chance() {
        let same = || -> Vec<Spectrum> {
            (0..10).map(|_| Spectrum::new(vec![40.0, 55.0, 70.0])).collect()
        };
        let ds = Dataset::assemble(
            ClassSpectra::new(Label::Positive, same()),
            ClassSpectra::new(Label::Negative, same()),
        )
        .unwrap();
        let split = train_test_split(&ds, &SplitConfig::default()).unwrap();
        let report = evaluate(&split, &ClassifierConfig::default()).unwrap();

        assert!((report.accuracy - 0.5).abs() < 1e-12);
        assert_eq!(report.confusion.total(), 6);
    }

    #[test]
    fn test_confusion_counts() {
        use Label::{Negative as N, Positive as P};
        let cm = ConfusionMatrix::from_labels(&[P, P, N, N, N], &[P, N, N, N, P]);
        assert_eq!(cm.get(P, P), 1);
        assert_eq!(cm.get(P, N), 1);
        assert_eq!(cm.get(N, N), 2);
        assert_eq!(cm.get(N, P), 1);
        assert_eq!(cm.total(), 5);
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_absent_class_is_zero() {
        let cm = ConfusionMatrix::from_labels(&[Label::Negative; 3], &[Label::Negative, Label::Positive, Label::Negative]);
        assert_eq!(cm.counts[1], [0, 0]);
        assert_eq!(cm.total(), 3);
        assert_eq!(ConfusionMatrix::default().accuracy(), 0.0);
    }

    #[test]
    fn test_iteration_limit_warns() {
        let ds = separable_dataset();
        let x = ds.features();
        let cfg = ClassifierConfig {
            max_iter: 2,
            ..ClassifierConfig::default()
        };
        let model = LogisticRegression::new(cfg).fit(&x, &ds.labels()).unwrap();

        let warning = model.warning().expect("two iterations cannot converge");
        assert_eq!(warning.stage, Stage::Classifier);
        assert_eq!(warning.iterations, 2);
        assert_eq!(model.n_iter(), 2);
        assert_eq!(model.predict(&x).len(), ds.len());
    }

    #[test]
    fn test_prediction_covers_every_test_row() {
        let ds = separable_dataset();
        let split = train_test_split(&ds, &SplitConfig::default()).unwrap();
        let model = LogisticRegression::new(ClassifierConfig::default())
            .fit(&split.train_features(), &split.train_labels())
            .unwrap();

        let probas = model.predict_proba(&split.test_features());
        assert_eq!(probas.len(), split.test.len());
        assert!(probas.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(model.coefficients().len(), ds.width());
    }

    #[test]
    fn test_standardizer_zero_variance_column() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 5.0, 3.0, 5.0]);
        let scaled = Standardizer::fit(&x).transform(&x);
        assert_eq!(scaled[(0, 0)], -1.0);
        assert_eq!(scaled[(1, 0)], 1.0);
        assert_eq!(scaled[(0, 1)], 0.0);
    }
}
