use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::data::filter::partition_by_label;
use crate::data::model::{Dataset, Label};
use crate::error::{Result, SpectraError};

/// Train/test partitioning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows sent to the test partition, in `(0, 1)`.
    pub test_size: f64,
    /// Seed of the shuffle.
    pub random_state: u64,
    /// Keep the label proportions of the dataset in both partitions.
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.3,
            random_state: 0,
            stratify: true,
        }
    }
}

/// Two disjoint row views of one dataset that together cover every row.
#[derive(Debug, Clone)]
pub struct TrainTestSplit<'a> {
    dataset: &'a Dataset,
    /// Training rows, ascending.
    pub train: Vec<usize>,
    /// Test rows, ascending.
    pub test: Vec<usize>,
}

impl<'a> TrainTestSplit<'a> {
    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn train_features(&self) -> DMatrix<f64> {
        self.dataset.features_of(&self.train)
    }

    pub fn test_features(&self) -> DMatrix<f64> {
        self.dataset.features_of(&self.test)
    }

    pub fn train_labels(&self) -> Vec<Label> {
        self.dataset.labels_of(&self.train)
    }

    pub fn test_labels(&self) -> Vec<Label> {
        self.dataset.labels_of(&self.test)
    }
}

/// Split `dataset` into train and test rows.
///
/// The test partition gets `ceil(n × test_size)` rows. Rows are drawn after a
/// seeded shuffle, so the result never depends on the class-ordered layout of
/// the dataset, and the same seed always yields the same partition. When
/// stratified, the test rows are spread over the labels in proportion to
/// their counts (largest remainder), then drawn from each label's shuffled
/// rows.
pub fn train_test_split<'a>(dataset: &'a Dataset, config: &SplitConfig) -> Result<TrainTestSplit<'a>> {
    let t = config.test_size;
    if !(t > 0.0 && t < 1.0) {
        return Err(SpectraError::InvalidParameter {
            param: "test_size",
            value: t.to_string(),
            constraint: "must lie strictly between 0 and 1",
        });
    }

    let n = dataset.len();
    let n_test = ((n as f64) * t).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(SpectraError::EmptyPartition { n_train, n_test });
    }

    let mut rng = StdRng::seed_from_u64(config.random_state);
    let (mut train, mut test) = if config.stratify {
        stratified(dataset, n_test, &mut rng)
    } else {
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(&mut rng);
        let train = rows.split_off(n_test);
        (train, rows)
    };
    train.sort_unstable();
    test.sort_unstable();

    log::debug!(
        "split {n} rows into {} train / {} test (seed {}, stratified: {})",
        train.len(),
        test.len(),
        config.random_state,
        config.stratify
    );
    Ok(TrainTestSplit {
        dataset,
        train,
        test,
    })
}

fn stratified(dataset: &Dataset, n_test: usize, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let groups = partition_by_label(dataset);
    let n = dataset.len() as f64;

    // Largest-remainder apportionment of the test rows over the labels.
    let quotas: Vec<f64> = groups
        .values()
        .map(|rows| n_test as f64 * rows.len() as f64 / n)
        .collect();
    let mut shares: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra)
    });
    let mut missing = n_test - shares.iter().sum::<usize>();
    for &g in order.iter().cycle().take(order.len() * 2) {
        if missing == 0 {
            break;
        }
        let capacity = groups.values().nth(g).map_or(0, Vec::len);
        if shares[g] < capacity {
            shares[g] += 1;
            missing -= 1;
        }
    }

    let mut train = Vec::with_capacity(dataset.len() - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (rows, &share) in groups.into_values().zip(&shares) {
        let mut rows = rows;
        rows.shuffle(rng);
        test.extend_from_slice(&rows[..share]);
        train.extend_from_slice(&rows[share..]);
    }
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ClassSpectra, Spectrum};

    fn dataset(n_pos: usize, n_neg: usize) -> Dataset {
        let make = |n: usize, offset: f64| {
            (0..n)
                .map(|i| Spectrum::new(vec![offset + i as f64, 1.0]))
                .collect::<Vec<_>>()
        };
        Dataset::assemble(
            ClassSpectra::new(Label::Positive, make(n_pos, 100.0)),
            ClassSpectra::new(Label::Negative, make(n_neg, 0.0)),
        )
        .unwrap()
    }

    #[test]
    fn test_same_seed_same_partition() {
        let ds = dataset(10, 10);
        for stratify in [true, false] {
            let cfg = SplitConfig {
                stratify,
                ..SplitConfig::default()
            };
            let a = train_test_split(&ds, &cfg).unwrap();
            let b = train_test_split(&ds, &cfg).unwrap();
            assert_eq!(a.train, b.train);
            assert_eq!(a.test, b.test);
        }
    }

    #[test]
    fn test_partitions_are_disjoint_and_cover_all_rows() {
        let ds = dataset(7, 12);
        let split = train_test_split(&ds, &SplitConfig::default()).unwrap();

        assert_eq!(split.test.len(), 6); // ceil(19 * 0.3)
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..19).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_keeps_proportions() {
        let ds = dataset(10, 10);
        let split = train_test_split(&ds, &SplitConfig::default()).unwrap();

        let test_labels = split.test_labels();
        let pos = test_labels.iter().filter(|&&l| l == Label::Positive).count();
        assert_eq!(test_labels.len(), 6);
        assert_eq!(pos, 3);
        assert_eq!(split.train_features().nrows(), 14);
        assert_eq!(split.test_features().ncols(), 2);
    }

    #[test]
    fn test_stratified_uneven_classes() {
        let ds = dataset(4, 16);
        let split = train_test_split(&ds, &SplitConfig::default()).unwrap();
        let pos = split
            .test_labels()
            .iter()
            .filter(|&&l| l == Label::Positive)
            .count();
        // 6 test rows, 20% positive -> 1.2 -> 1
        assert_eq!(pos, 1);
        assert_eq!(split.test.len(), 6);
    }

    #[test]
    fn test_split_is_not_row_order() {
        let ds = dataset(10, 10);
        let cfg = SplitConfig {
            stratify: false,
            ..SplitConfig::default()
        };
        let split = train_test_split(&ds, &cfg).unwrap();
        assert_ne!(split.test, (14..20).collect::<Vec<_>>());
        assert_ne!(split.test, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_changes_partition() {
        let ds = dataset(10, 10);
        let a = train_test_split(&ds, &SplitConfig::default()).unwrap();
        let b = train_test_split(
            &ds,
            &SplitConfig {
                random_state: 7,
                ..SplitConfig::default()
            },
        )
        .unwrap();
        assert_ne!(a.test, b.test);
    }

    #[test]
    fn test_empty_partition() {
        let ds = dataset(1, 0);
        let err = train_test_split(&ds, &SplitConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            SpectraError::EmptyPartition {
                n_train: 0,
                n_test: 1
            }
        ));
    }

    #[test]
    fn test_invalid_ratio() {
        let ds = dataset(5, 5);
        for t in [0.0, 1.0, -0.2, f64::NAN] {
            let cfg = SplitConfig {
                test_size: t,
                ..SplitConfig::default()
            };
            assert!(matches!(
                train_test_split(&ds, &cfg),
                Err(SpectraError::InvalidParameter { .. })
            ));
        }
    }
}
