use std::collections::HashMap;

use bon::Builder;
use log::{debug, info};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    config::{Metric, ModuleSearchConfig, PARAM_DELIM, VAL_DELIM},
    error::{Error, Result},
    matrix::{PhosphoMatrix, SiteKey},
    modules::{Candidate, CandidateLabelings, Clusterer, ModuleLabeling},
};

/// Grid search of k-means clusterings over a range of cluster counts
///
/// Each cluster count yields one candidate labeling named
/// `KMeans;n_clusters-<k>`, evaluated by silhouette and inertia.
/// Missing residuals are treated as zero when measuring distances and
/// phosphosites without any value are left unlabeled.
#[derive(Debug, Clone, Builder)]
pub struct KMeansSearch {
    #[builder(default = vec![2, 3, 4, 5, 6, 7, 8])]
    pub n_clusters: Vec<usize>,
    #[builder(default = 0)]
    pub seed: u64,
    #[builder(default = 300)]
    pub max_iter: usize,
}
impl Default for KMeansSearch {
    fn default() -> Self {
        KMeansSearch::builder().build()
    }
}

impl From<&ModuleSearchConfig> for KMeansSearch {
    fn from(config: &ModuleSearchConfig) -> Self {
        KMeansSearch::builder()
            .n_clusters(config.n_clusters.clone())
            .seed(config.seed)
            .max_iter(config.max_iter)
            .build()
    }
}

impl Clusterer for KMeansSearch {
    fn search(&self, data: &PhosphoMatrix) -> Result<CandidateLabelings> {
        let (keys, points) = clusterable_points(data);
        if points.is_empty() {
            return Err(Error::Validation(
                "no phosphosites with values available for clustering".to_string(),
            ));
        }

        let mut candidates = CandidateLabelings::default();
        for &k in &self.n_clusters {
            if k == 0 || k > points.len() {
                debug!("Skipping n_clusters={} for {} phosphosites", k, points.len());
                continue;
            }
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            let (assignments, inertia) = self.fit(&points, k, &mut rng);
            let silhouette = silhouette_score(&points, &assignments, k);
            debug!(
                "KMeans n_clusters={} silhouette={:.4} inertia={:.4}",
                k, silhouette, inertia
            );

            let name = format!("KMeans{PARAM_DELIM}n_clusters{VAL_DELIM}{k}");
            let labels = keys
                .iter()
                .cloned()
                .zip(assignments.iter().map(|a| a.to_string()))
                .collect();
            let metrics = HashMap::from([
                (Metric::Silhouette, silhouette),
                (Metric::Inertia, inertia),
            ]);
            candidates.push(Candidate::new(ModuleLabeling::new(name, labels), metrics));
        }
        info!("Evaluated {} candidate labelings", candidates.candidates.len());
        Ok(candidates)
    }
}

impl KMeansSearch {
    /// Lloyd iterations from a k-means++ initialization
    fn fit(&self, points: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> (Vec<usize>, f64) {
        let mut centroids = init_centroids(points, k, rng);
        let mut assignments = vec![usize::MAX; points.len()];
        for _ in 0..self.max_iter {
            let mut changed = false;
            for (i, point) in points.iter().enumerate() {
                let nearest = nearest_centroid(point, &centroids);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            for (c, centroid) in centroids.iter_mut().enumerate() {
                let members = points
                    .iter()
                    .zip(assignments.iter())
                    .filter(|(_, a)| **a == c)
                    .map(|(p, _)| p)
                    .collect::<Vec<_>>();
                // empty clusters keep their previous centroid
                if members.is_empty() {
                    continue;
                }
                for (d, value) in centroid.iter_mut().enumerate() {
                    *value = members.iter().map(|p| p[d]).sum::<f64>() / members.len() as f64;
                }
            }
        }
        let inertia = points
            .iter()
            .zip(assignments.iter())
            .map(|(p, &a)| squared_distance(p, &centroids[a]))
            .sum();
        (assignments, inertia)
    }
}

fn clusterable_points(data: &PhosphoMatrix) -> (Vec<SiteKey>, Vec<Vec<f64>>) {
    data.iter()
        .filter(|(_, values)| values.iter().any(|v| !v.is_nan()))
        .map(|(key, values)| {
            let point = values
                .iter()
                .map(|v| if v.is_nan() { 0.0 } else { *v })
                .collect();
            (key.clone(), point)
        })
        .unzip()
}

fn init_centroids(points: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];
    while centroids.len() < k {
        let weights = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect::<Vec<_>>();
        let next = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..points.len()),
        };
        centroids.push(points[next].clone());
    }
    centroids
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    centroids
        .iter()
        .map(|c| squared_distance(point, c))
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Mean silhouette coefficient; `NaN` unless `2 <= k < n`
pub fn silhouette_score(points: &[Vec<f64>], assignments: &[usize], k: usize) -> f64 {
    let n = points.len();
    if k < 2 || k >= n {
        return f64::NAN;
    }
    let mut total = 0.0;
    for i in 0..n {
        let mut sums = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for j in 0..n {
            if i == j {
                continue;
            }
            sums[assignments[j]] += squared_distance(&points[i], &points[j]).sqrt();
            counts[assignments[j]] += 1;
        }
        let own = assignments[i];
        // singletons contribute zero
        if counts[own] == 0 {
            continue;
        }
        let a = sums[own] / counts[own] as f64;
        let b = (0..k)
            .filter(|&c| c != own && counts[c] > 0)
            .map(|c| sums[c] / counts[c] as f64)
            .fold(f64::INFINITY, f64::min);
        if b.is_finite() {
            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
    }
    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Selection, matrix::SampleMatrix};

    fn two_blobs() -> PhosphoMatrix {
        let rows = (0..6)
            .map(|i| SiteKey::new("P".to_string(), format!("S{i}")))
            .collect();
        let values = vec![
            vec![1.0, 1.0, 1.0],
            vec![1.1, 0.9, 1.0],
            vec![0.9, 1.0, 1.1],
            vec![-1.0, -1.0, -1.0],
            vec![-1.1, -0.9, -1.0],
            vec![-0.9, -1.0, f64::NAN],
        ];
        let columns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        SampleMatrix::new(rows, columns, values).unwrap()
    }

    #[test]
    fn test_search_recovers_blobs() {
        let search = KMeansSearch::builder().n_clusters(vec![2, 3]).build();
        let candidates = search.search(&two_blobs()).unwrap();
        assert_eq!(candidates.candidates.len(), 2);

        let best = candidates.pick_best(&Selection::default()).unwrap();
        assert_eq!(best.name(), "KMeans;n_clusters-2");
        let first = best.label(&SiteKey::new("P".into(), "S0".into())).unwrap();
        let last = best.label(&SiteKey::new("P".into(), "S5".into())).unwrap();
        assert_ne!(first, last);
        for i in 1..3 {
            let key = SiteKey::new("P".into(), format!("S{i}"));
            assert_eq!(best.label(&key), Some(first));
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let search = KMeansSearch::builder().n_clusters(vec![3]).seed(7).build();
        let a = search.search(&two_blobs()).unwrap();
        let b = search.search(&two_blobs()).unwrap();
        let labels = |c: &CandidateLabelings| {
            c.candidates[0]
                .labeling
                .iter()
                .map(|(_, l)| l.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(labels(&a), labels(&b));
    }

    #[test]
    fn test_silhouette_bounds() {
        let points = vec![vec![0.0], vec![0.1], vec![5.0], vec![5.1]];
        let s = silhouette_score(&points, &[0, 0, 1, 1], 2);
        assert!(s > 0.9 && s <= 1.0);
        assert!(silhouette_score(&points, &[0, 0, 0, 0], 1).is_nan());
    }
}
