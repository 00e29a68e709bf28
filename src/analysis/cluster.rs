//! K-means clustering with seeded restarts and cluster-to-label matching.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::model::Label;
use crate::error::{ConvergenceWarning, Result, SpectraError, Stage};

/// How each restart picks its starting centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KMeansInit {
    /// Distinct samples drawn uniformly.
    #[serde(rename = "random")]
    Random,
    /// D²-weighted seeding.
    #[serde(rename = "k-means++")]
    KMeansPlusPlus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub n_clusters: usize,
    pub init: KMeansInit,
    /// Independent restarts; the lowest inertia wins.
    pub n_init: usize,
    pub max_iter: usize,
    /// Centroid shift tolerance, relative to the mean feature variance.
    pub tol: f64,
    pub random_state: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            init: KMeansInit::Random,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            random_state: 0,
        }
    }
}

/// Result of a k-means fit. Cluster ids carry no label meaning.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    /// Cluster id per sample, in dataset row order.
    pub assignments: Vec<usize>,
    /// `k × n_features`.
    pub centroids: DMatrix<f64>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    pub n_iter: usize,
    pub warning: Option<ConvergenceWarning>,
}

/// Agreement between a two-cluster assignment and the true labels under the
/// better of the two possible cluster/label correspondences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelAgreement {
    /// Fraction of samples whose cluster maps to their label.
    pub agreement: f64,
    pub matched: usize,
    /// Cluster id mapped to [`Label::Positive`].
    pub positive_cluster: usize,
}

struct Run {
    labels: Vec<usize>,
    centroids: DMatrix<f64>,
    inertia: f64,
    n_iter: usize,
    converged: bool,
}

#[derive(Debug, Clone)]
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    /// Cluster the rows of `x`.
    ///
    /// Runs `n_init` seeded restarts of Lloyd's algorithm and keeps the one
    /// with the lowest inertia. A winner that stopped at `max_iter` is still
    /// returned, with a [`ConvergenceWarning`] attached.
    pub fn fit(&self, x: &DMatrix<f64>) -> Result<ClusterAssignment> {
        let cfg = &self.config;
        let n_samples = x.nrows();
        if cfg.n_clusters == 0 || cfg.n_init == 0 || cfg.max_iter == 0 {
            return Err(SpectraError::InvalidParameter {
                param: "k-means",
                value: format!(
                    "n_clusters = {}, n_init = {}, max_iter = {}",
                    cfg.n_clusters, cfg.n_init, cfg.max_iter
                ),
                constraint: "all must be at least 1",
            });
        }
        if n_samples < cfg.n_clusters {
            return Err(SpectraError::InvalidParameter {
                param: "n_samples",
                value: n_samples.to_string(),
                constraint: "need at least as many samples as clusters",
            });
        }

        let tol = cfg.tol * mean_variance(x);
        let mut rng = StdRng::seed_from_u64(cfg.random_state);

        let mut best: Option<Run> = None;
        for _ in 0..cfg.n_init {
            let init = match cfg.init {
                KMeansInit::Random => init_random(x, cfg.n_clusters, &mut rng),
                KMeansInit::KMeansPlusPlus => init_plus_plus(x, cfg.n_clusters, &mut rng),
            };
            let run = lloyd(x, init, cfg.max_iter, tol);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let Some(best) = best else {
            unreachable!("n_init is at least 1");
        };

        let warning = (!best.converged).then(|| {
            ConvergenceWarning::new(
                Stage::KMeans,
                best.n_iter,
                format!("centroid shift still above {tol:.3e}"),
            )
        });
        log::info!(
            "k-means: {} clusters, inertia {:.3}, {} iterations",
            cfg.n_clusters,
            best.inertia,
            best.n_iter
        );
        Ok(ClusterAssignment {
            assignments: best.labels,
            centroids: best.centroids,
            inertia: best.inertia,
            n_iter: best.n_iter,
            warning,
        })
    }
}

/// Score a two-cluster assignment against `labels`, trying both
/// cluster-to-label correspondences and keeping the better one (ties keep
/// cluster 1 ↔ positive).
pub fn best_label_agreement(assignments: &[usize], labels: &[Label]) -> Result<LabelAgreement> {
    if assignments.len() != labels.len() || assignments.is_empty() {
        return Err(SpectraError::InvalidParameter {
            param: "assignments",
            value: assignments.len().to_string(),
            constraint: "need one cluster id per labeled sample",
        });
    }
    if let Some(&bad) = assignments.iter().find(|&&c| c > 1) {
        return Err(SpectraError::InvalidParameter {
            param: "cluster id",
            value: bad.to_string(),
            constraint: "label matching needs exactly two clusters",
        });
    }

    let direct = assignments
        .iter()
        .zip(labels)
        .filter(|&(&c, l)| c == l.index())
        .count();
    let swapped = labels.len() - direct;
    let (matched, positive_cluster) = if direct >= swapped {
        (direct, 1)
    } else {
        (swapped, 0)
    };

    Ok(LabelAgreement {
        agreement: matched as f64 / labels.len() as f64,
        matched,
        positive_cluster,
    })
}

fn sq_dist(x: &DMatrix<f64>, row: usize, centroids: &DMatrix<f64>, c: usize) -> f64 {
    (0..x.ncols())
        .map(|j| (x[(row, j)] - centroids[(c, j)]).powi(2))
        .sum()
}

/// Index and squared distance of the nearest centroid; ties go to the lower id.
fn nearest(x: &DMatrix<f64>, row: usize, centroids: &DMatrix<f64>) -> (usize, f64) {
    (0..centroids.nrows()).fold((0, f64::INFINITY), |(best, best_d), c| {
        let d = sq_dist(x, row, centroids, c);
        if d < best_d { (c, d) } else { (best, best_d) }
    })
}

fn mean_variance(x: &DMatrix<f64>) -> f64 {
    if x.ncols() == 0 {
        return 0.0;
    }
    let n = x.nrows() as f64;
    let total: f64 = x
        .column_iter()
        .map(|col| {
            let m = col.mean();
            col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / x.ncols() as f64
}

fn init_random(x: &DMatrix<f64>, k: usize, rng: &mut StdRng) -> DMatrix<f64> {
    let picks = rand::seq::index::sample(rng, x.nrows(), k);
    DMatrix::from_fn(k, x.ncols(), |c, j| x[(picks.index(c), j)])
}

fn init_plus_plus(x: &DMatrix<f64>, k: usize, rng: &mut StdRng) -> DMatrix<f64> {
    let n = x.nrows();
    let mut centroids = DMatrix::<f64>::zeros(k, x.ncols());
    centroids.set_row(0, &x.row(rng.gen_range(0..n)));

    for c in 1..k {
        let seeded = centroids.rows(0, c).clone_owned();
        let dists: Vec<f64> = (0..n).map(|i| nearest(x, i, &seeded).1).collect();
        let total: f64 = dists.iter().sum();
        let pick = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            dists
                .iter()
                .position(|&d| {
                    acc += d;
                    acc > target
                })
                .unwrap_or(n - 1)
        } else {
            rng.gen_range(0..n)
        };
        centroids.set_row(c, &x.row(pick));
    }
    centroids
}

fn lloyd(x: &DMatrix<f64>, mut centroids: DMatrix<f64>, max_iter: usize, tol: f64) -> Run {
    let (n, d) = x.shape();
    let k = centroids.nrows();
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 1..=max_iter {
        n_iter = iter;
        let nearest_all: Vec<(usize, f64)> = (0..n).map(|i| nearest(x, i, &centroids)).collect();

        let mut sums = DMatrix::<f64>::zeros(k, d);
        let mut counts = vec![0usize; k];
        for (i, &(c, _)) in nearest_all.iter().enumerate() {
            counts[c] += 1;
            for j in 0..d {
                sums[(c, j)] += x[(i, j)];
            }
        }

        let mut updated = centroids.clone();
        for c in 0..k {
            if counts[c] > 0 {
                for j in 0..d {
                    updated[(c, j)] = sums[(c, j)] / counts[c] as f64;
                }
            } else {
                // Re-seed an empty cluster with the worst-fitted sample.
                let far = (0..n).fold(0, |best, i| {
                    if nearest_all[i].1 > nearest_all[best].1 { i } else { best }
                });
                updated.set_row(c, &x.row(far));
            }
        }

        let shift = (&updated - &centroids).norm_squared();
        centroids = updated;
        if shift <= tol {
            converged = true;
            break;
        }
    }

    let final_assign: Vec<(usize, f64)> = (0..n).map(|i| nearest(x, i, &centroids)).collect();
    Run {
        labels: final_assign.iter().map(|&(c, _)| c).collect(),
        inertia: final_assign.iter().map(|&(_, d)| d).sum(),
        centroids,
        n_iter,
        converged,
    }
}
