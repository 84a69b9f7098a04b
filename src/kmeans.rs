//! k-means clustering of training descriptors into visual words.
//!
//! Both variants use k-means++ initialization. Unless a seed is configured,
//! initialization (and mini-batch selection) is random, so two trainings on
//! the same samples can produce different vocabularies.

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use tracing::debug;

use crate::*;

/// Anything that can learn a vocabulary of `k` words from training samples.
///
/// Quantization against the result is provided by the [`Quantizer`] impl of
/// [`Vocabulary`], so any algorithm satisfying this contract is substitutable.
pub trait Clusterer {
    fn train(&mut self, samples: &DescriptorSet, k: usize) -> BowResult<Vocabulary>;
}

/// Full-batch (Lloyd) k-means. Iterates until assignments stop changing or
/// the iteration budget is spent.
#[derive(Debug, Clone)]
pub struct KMeans {
    max_iterations: usize,
    seed: Option<u64>,
}

impl KMeans {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            seed: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.max_iterations,
            seed: config.seed,
        }
    }

    /// Configure a deterministic seed for k-means++ initialization.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Clusterer for KMeans {
    fn train(&mut self, samples: &DescriptorSet, k: usize) -> BowResult<Vocabulary> {
        check_training(samples, k)?;
        let dim = samples.dim();
        let rows = samples.as_flat();
        let mut rng = rng_from(self.seed);

        let mut centers = kmeans_plus_plus(&mut rng, rows, dim, k);
        let mut groups = assign(&centers, dim, rows);

        for iteration in 0..self.max_iterations {
            centers = update_centers(&centers, dim, rows, &groups, k);
            let new_groups = assign(&centers, dim, rows);
            let changed = groups.iter().zip(&new_groups).filter(|(a, b)| a != b).count();
            debug!(iteration, changed, "k-means step");
            groups = new_groups;
            if changed == 0 {
                break; // converged
            }
        }

        Ok(Vocabulary::from_centers(dim, centers)?.with_cluster_sizes(cluster_sizes(&groups, k)))
    }
}

/// Mini-batch k-means. Each step moves the centers toward a random batch of
/// samples with a per-center learning rate of `1 / count`.
#[derive(Debug, Clone)]
pub struct MiniBatchKMeans {
    batch_size: usize,
    max_iterations: usize,
    tolerance: f32,
    seed: Option<u64>,
}

impl MiniBatchKMeans {
    pub fn new(batch_size: usize, max_iterations: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_iterations,
            tolerance: 1e-4,
            seed: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Stop once no center moves by more than `tolerance` (squared distance) in a step.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }
}

impl Clusterer for MiniBatchKMeans {
    fn train(&mut self, samples: &DescriptorSet, k: usize) -> BowResult<Vocabulary> {
        check_training(samples, k)?;
        let dim = samples.dim();
        let rows = samples.as_flat();
        let n = samples.len();
        let mut rng = rng_from(self.seed);

        // k-means++ runs over a subsample of at most 3 batches
        let init_size = (3 * self.batch_size).max(3 * k).min(n);
        let init_rows = gather(rows, dim, index::sample(&mut rng, n, init_size).into_iter());
        let mut centers = kmeans_plus_plus(&mut rng, &init_rows, dim, k);
        let mut counts = vec![0usize; k];

        let batch_size = self.batch_size.min(n);
        for iteration in 0..self.max_iterations {
            let batch = gather(rows, dim, index::sample(&mut rng, n, batch_size).into_iter());
            let labels = assign(&centers, dim, &batch);
            let previous = centers.clone();

            for (x, &label) in batch.chunks_exact(dim).zip(&labels) {
                counts[label] += 1;
                let eta = 1. / counts[label] as f32;
                let center = &mut centers[label * dim..(label + 1) * dim];
                for (c, v) in center.iter_mut().zip(x) {
                    *c += eta * (v - *c);
                }
            }

            let shift = previous
                .chunks_exact(dim)
                .zip(centers.chunks_exact(dim))
                .map(|(a, b)| vector::squared_euclidean(a, b))
                .fold(0f32, f32::max);
            debug!(iteration, shift, "mini-batch k-means step");
            if shift <= self.tolerance {
                break;
            }
        }

        let groups = assign(&centers, dim, rows);
        Ok(Vocabulary::from_centers(dim, centers)?.with_cluster_sizes(cluster_sizes(&groups, k)))
    }
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

fn check_training(samples: &DescriptorSet, k: usize) -> BowResult<()> {
    if k == 0 {
        return Err(BowErr::InvalidConfig(
            "vocabulary size must be greater than 0".to_string(),
        ));
    }
    if samples.len() < k {
        return Err(BowErr::InsufficientTrainingData {
            samples: samples.len(),
            k,
        });
    }
    if !samples.as_flat().iter().all(|x| x.is_finite()) {
        return Err(BowErr::InvalidConfig(
            "training descriptors must be finite".to_string(),
        ));
    }
    Ok(())
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn gather(rows: &[f32], dim: usize, idx: impl Iterator<Item = usize>) -> Vec<f32> {
    let mut out = Vec::new();
    for i in idx {
        out.extend_from_slice(&rows[i * dim..(i + 1) * dim]);
    }
    out
}

/// k-means++ initialization: every further center is drawn with probability
/// proportional to its squared distance from the nearest chosen center.
fn kmeans_plus_plus(rng: &mut StdRng, rows: &[f32], dim: usize, k: usize) -> Vec<f32> {
    let n = rows.len() / dim;
    let row = |i: usize| &rows[i * dim..(i + 1) * dim];

    let mut centers = Vec::with_capacity(k * dim);
    centers.extend_from_slice(row(rng.gen_range(0..n)));

    let mut min_dist: Vec<f32> = (0..n)
        .map(|i| vector::squared_euclidean(row(i), &centers[..dim]))
        .collect();

    for _ in 1..k {
        let total: f64 = min_dist.iter().map(|&d| d as f64).sum();
        let threshold = rng.gen::<f64>() * total;

        let mut pick = n - 1;
        let mut cumulative = 0f64;
        for (i, &d) in min_dist.iter().enumerate() {
            cumulative += d as f64;
            if cumulative >= threshold && (d > 0. || total == 0.) {
                pick = i;
                break;
            }
        }

        let chosen = row(pick);
        centers.extend_from_slice(chosen);
        for (i, d) in min_dist.iter_mut().enumerate() {
            *d = d.min(vector::squared_euclidean(row(i), chosen));
        }
    }
    centers
}

/// Nearest center for every row.
fn assign(centers: &[f32], dim: usize, rows: &[f32]) -> Vec<usize> {
    let nearest = |x: &[f32]| vector::nearest(centers, dim, x).map_or(0, |(word, _)| word);

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        rows.par_chunks_exact(dim).map(nearest).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        rows.chunks_exact(dim).map(nearest).collect()
    }
}

/// Mean of each group. A center that lost all its members stays where it was.
fn update_centers(
    centers: &[f32],
    dim: usize,
    rows: &[f32],
    groups: &[usize],
    k: usize,
) -> Vec<f32> {
    let mut sums = vec![0f32; k * dim];
    let counts = cluster_sizes(groups, k);
    for (x, &g) in rows.chunks_exact(dim).zip(groups) {
        for (s, v) in sums[g * dim..(g + 1) * dim].iter_mut().zip(x) {
            *s += v;
        }
    }
    for (g, &count) in counts.iter().enumerate() {
        let sum = &mut sums[g * dim..(g + 1) * dim];
        if count > 0 {
            let inv = 1. / count as f32;
            sum.iter_mut().for_each(|s| *s *= inv);
        } else {
            sum.copy_from_slice(&centers[g * dim..(g + 1) * dim]);
        }
    }
    sums
}

fn cluster_sizes(groups: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0; k];
    for &g in groups {
        sizes[g] += 1;
    }
    sizes
}
