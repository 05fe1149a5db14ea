//! Narrative clustering: TF-IDF over the medical text, then k-means.
//!
//! K-means runs directly on the sparse, L2-normalized TF-IDF rows (Lloyd's
//! algorithm with k-means++ seeding). Centroids are dense `K × vocab` arrays,
//! which stay small because K is small. Several seeded restarts are run and
//! the lowest-inertia result is kept, so assignment is reproducible for a
//! fixed seed and input.

use crate::error::{AppError, Result};
use crate::ml::text::{SparseVector, TfidfConfig, TfidfVectorizer};
use crate::models::Incident;
use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// K-means configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansConfig {
    pub n_clusters: usize,
    pub n_init: usize,
    pub max_iter: usize,
    /// Stop when the total squared centroid shift falls below this
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 30,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-6,
            seed: 42,
        }
    }
}

/// Fitted cluster centers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansModel {
    /// Centroids (n_clusters × n_features)
    centroids: Array2<f64>,

    /// Sum of squared distances to the closest centroid
    inertia: f64,

    /// Lloyd iterations used by the kept run
    n_iter: usize,
}

impl KMeansModel {
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// Nearest centroid for one row
    pub fn predict_one(&self, row: &SparseVector) -> usize {
        let norms = squared_norms(&self.centroids);
        nearest(row, &self.centroids, &norms).0
    }

    /// Nearest centroid for each row
    pub fn predict(&self, rows: &[SparseVector]) -> Vec<usize> {
        let norms = squared_norms(&self.centroids);
        rows.iter()
            .map(|row| nearest(row, &self.centroids, &norms).0)
            .collect()
    }
}

/// Lloyd's k-means over sparse rows
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    /// Fit centroids and return the model with each row's cluster
    pub fn fit(&self, rows: &[SparseVector], n_features: usize) -> Result<(KMeansModel, Vec<usize>)> {
        let k = self.config.n_clusters;
        if k == 0 {
            return Err(AppError::Validation("n_clusters must be at least 1".to_string()));
        }
        if rows.len() < k {
            return Err(AppError::Validation(format!(
                "n_clusters ({}) exceeds number of samples ({})",
                k,
                rows.len()
            )));
        }

        let mut best: Option<(KMeansModel, Vec<usize>)> = None;
        for run in 0..self.config.n_init.max(1) {
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(run as u64));
            let (model, labels) = self.run_once(rows, n_features, &mut rng);
            debug!(run, inertia = model.inertia, n_iter = model.n_iter, "K-means run finished");

            let better = best
                .as_ref()
                .map_or(true, |(current, _)| model.inertia < current.inertia);
            if better {
                best = Some((model, labels));
            }
        }

        best.ok_or_else(|| AppError::Internal("k-means produced no runs".to_string()))
    }

    fn run_once(
        &self,
        rows: &[SparseVector],
        n_features: usize,
        rng: &mut ChaCha8Rng,
    ) -> (KMeansModel, Vec<usize>) {
        let k = self.config.n_clusters;
        let mut centroids = init_plus_plus(rows, n_features, k, rng);
        let mut labels = vec![0usize; rows.len()];
        let mut n_iter = 0;

        for iter in 0..self.config.max_iter {
            n_iter = iter + 1;

            // Assignment step
            let norms = squared_norms(&centroids);
            let mut distances = vec![0.0; rows.len()];
            for (i, row) in rows.iter().enumerate() {
                let (label, dist) = nearest(row, &centroids, &norms);
                labels[i] = label;
                distances[i] = dist;
            }

            // Update step
            let mut sums = Array2::<f64>::zeros((k, n_features));
            let mut counts = vec![0usize; k];
            for (row, &label) in rows.iter().zip(&labels) {
                counts[label] += 1;
                for &(c, v) in &row.entries {
                    sums[[label, c]] += v;
                }
            }

            // Re-seed empty clusters from the worst-fitted points
            for cluster in 0..k {
                if counts[cluster] > 0 {
                    continue;
                }
                let far = distances
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| counts[labels[*i]] > 1)
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i);
                if let Some(i) = far {
                    let old = labels[i];
                    counts[old] -= 1;
                    for &(c, v) in &rows[i].entries {
                        sums[[old, c]] -= v;
                        sums[[cluster, c]] += v;
                    }
                    labels[i] = cluster;
                    counts[cluster] = 1;
                    distances[i] = 0.0;
                }
            }

            let mut shift = 0.0;
            for cluster in 0..k {
                if counts[cluster] == 0 {
                    continue;
                }
                let n = counts[cluster] as f64;
                for c in 0..n_features {
                    let updated = sums[[cluster, c]] / n;
                    let delta = updated - centroids[[cluster, c]];
                    shift += delta * delta;
                    centroids[[cluster, c]] = updated;
                }
            }

            if shift <= self.config.tolerance {
                break;
            }
        }

        // Final assignment against the converged centroids
        let norms = squared_norms(&centroids);
        let mut inertia = 0.0;
        for (i, row) in rows.iter().enumerate() {
            let (label, dist) = nearest(row, &centroids, &norms);
            labels[i] = label;
            inertia += dist;
        }

        (
            KMeansModel {
                centroids,
                inertia,
                n_iter,
            },
            labels,
        )
    }
}

/// k-means++ seeding: first center uniform, then proportional to D²
fn init_plus_plus(
    rows: &[SparseVector],
    n_features: usize,
    k: usize,
    rng: &mut ChaCha8Rng,
) -> Array2<f64> {
    let mut centroids = Array2::<f64>::zeros((k, n_features));
    let set_center = |centroids: &mut Array2<f64>, slot: usize, row: &SparseVector| {
        for &(c, v) in &row.entries {
            centroids[[slot, c]] = v;
        }
    };

    let first = rng.gen_range(0..rows.len());
    set_center(&mut centroids, 0, &rows[first]);

    let first_norm = rows[first].squared_norm();
    let mut closest: Vec<f64> = rows
        .iter()
        .map(|row| distance_to(row, centroids.row(0), first_norm))
        .collect();

    for slot in 1..k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = rows.len() - 1;
            for (i, &d) in closest.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            rng.gen_range(0..rows.len())
        };

        set_center(&mut centroids, slot, &rows[chosen]);
        let center = centroids.row(slot);
        let center_norm = rows[chosen].squared_norm();
        for (i, row) in rows.iter().enumerate() {
            let d = distance_to(row, center, center_norm);
            if d < closest[i] {
                closest[i] = d;
            }
        }
    }

    centroids
}

fn squared_norms(centroids: &Array2<f64>) -> Vec<f64> {
    centroids
        .rows()
        .into_iter()
        .map(|r| r.iter().map(|v| v * v).sum())
        .collect()
}

fn distance_to(row: &SparseVector, center: ArrayView1<'_, f64>, center_norm: f64) -> f64 {
    let dot: f64 = row.entries.iter().map(|&(c, v)| v * center[c]).sum();
    (row.squared_norm() - 2.0 * dot + center_norm).max(0.0)
}

/// Closest centroid and its squared distance; ties go to the lowest id
fn nearest(row: &SparseVector, centroids: &Array2<f64>, norms: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (cluster, center) in centroids.rows().into_iter().enumerate() {
        let d = distance_to(row, center, norms[cluster]);
        if d < best.1 {
            best = (cluster, d);
        }
    }
    best
}

/// Clusterer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub n_clusters: usize,
    pub max_features: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            n_clusters: 30,
            max_features: 8000,
            n_init: 10,
            max_iter: 300,
            seed: 42,
        }
    }
}

/// Fitted clustering artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringOutcome {
    pub vectorizer: TfidfVectorizer,
    pub model: KMeansModel,
    /// Member count per cluster id
    pub sizes: Vec<usize>,
}

impl ClusteringOutcome {
    /// Cluster id for a new medical text, without refitting
    pub fn assign(&self, medical_text: &str) -> Result<usize> {
        let row = self.vectorizer.transform_one(medical_text)?;
        Ok(self.model.predict_one(&row))
    }
}

/// Groups incidents by their medical text
pub struct Clusterer {
    config: ClusterConfig,
}

impl Clusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// Fit TF-IDF and k-means over all incidents and assign cluster ids
    pub fn fit_assign(&self, incidents: &mut [Incident]) -> Result<ClusteringOutcome> {
        if incidents.is_empty() {
            return Err(AppError::Validation("no incidents to cluster".to_string()));
        }

        let mut k = self.config.n_clusters;
        if k > incidents.len() {
            warn!(
                requested = k,
                incidents = incidents.len(),
                "Fewer incidents than clusters, clamping cluster count"
            );
            k = incidents.len();
        }

        let mut vectorizer =
            TfidfVectorizer::new(TfidfConfig::with_max_features(self.config.max_features));
        let texts: Vec<&str> = incidents.iter().map(|i| i.medical_text.as_str()).collect();
        let rows = vectorizer.fit_transform(&texts)?;
        info!(
            vocab = vectorizer.vocab_size(),
            documents = rows.len(),
            "Fitted clustering vectorizer"
        );

        let kmeans = KMeans::new(KMeansConfig {
            n_clusters: k,
            n_init: self.config.n_init,
            max_iter: self.config.max_iter,
            seed: self.config.seed,
            ..KMeansConfig::default()
        });
        let (model, labels) = kmeans.fit(&rows, vectorizer.vocab_size())?;

        let mut sizes = vec![0usize; k];
        for (incident, &label) in incidents.iter_mut().zip(&labels) {
            incident.assign_cluster(label)?;
            sizes[label] += 1;
        }

        info!(
            n_clusters = k,
            inertia = model.inertia(),
            empty = sizes.iter().filter(|&&s| s == 0).count(),
            "Clustered incidents"
        );

        Ok(ClusteringOutcome {
            vectorizer,
            model,
            sizes,
        })
    }
}
