//! Density clustering for high-dimensional dense vectors.
//!
//! Rows are L2-normalized so Euclidean distance on the unit sphere tracks
//! cosine distance, then clustered with density semantics: single-linkage
//! over mutual-reachability distances, condensed into a cluster tree, with
//! excess-of-mass selection of the most stable clusters. No 2-d projection
//! is used: high-dimensional embeddings collapse into a near-uniform blob
//! under one and lose all structure.
//!
//! Labels: −1 marks noise; surviving clusters are renumbered densely from 0
//! in ascending order of their original ids, capped to `max_clusters` by
//! keeping the largest (ties to the lower id).

use std::collections::HashMap;

use kodama::{linkage, Dendrogram, Method};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::config::ClusterConfig;
use crate::types::ScoredChunk;

/// Cluster chunks by their dense vectors. A pool with missing or mixed
/// vector dimensions is treated as all noise; an empty pool yields an empty
/// labeling.
pub fn label_chunks(points: &[ScoredChunk], cfg: &ClusterConfig) -> Vec<i32> {
    if points.is_empty() {
        return Vec::new();
    }
    let dim = points[0].dense_vector.len();
    if dim == 0 || points.iter().any(|p| p.dense_vector.len() != dim) {
        tracing::warn!("inconsistent dense vector dimensions; treating pool as noise");
        return vec![-1; points.len()];
    }

    let mut matrix = Array2::<f32>::zeros((points.len(), dim));
    for (i, pt) in points.iter().enumerate() {
        for (j, v) in pt.dense_vector.iter().enumerate() {
            matrix[[i, j]] = *v;
        }
    }
    label_vectors(matrix.view(), cfg)
}

/// Cluster an `N × D` matrix of dense vectors.
pub fn label_vectors(matrix: ArrayView2<'_, f32>, cfg: &ClusterConfig) -> Vec<i32> {
    let n = matrix.nrows();
    if n == 0 {
        return Vec::new();
    }
    let min_cluster_size = cfg.min_cluster_size.max(n / 15);
    if n < min_cluster_size.max(2) {
        return vec![-1; n];
    }

    // Normalize rows onto the unit sphere.
    let mut data = matrix.to_owned();
    for mut row in data.rows_mut() {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }

    // Pairwise Euclidean distances, condensed upper-triangular layout.
    let rows: Vec<Vec<f64>> = (0..n - 1)
        .into_par_iter()
        .map(|i| {
            let a = data.row(i);
            ((i + 1)..n)
                .map(|j| {
                    let b = data.row(j);
                    a.iter()
                        .zip(b.iter())
                        .map(|(x, y)| {
                            let d = (x - y) as f64;
                            d * d
                        })
                        .sum::<f64>()
                        .sqrt()
                })
                .collect()
        })
        .collect();

    let dist = |i: usize, j: usize| -> f64 {
        if i < j {
            rows[i][j - i - 1]
        } else {
            rows[j][i - j - 1]
        }
    };

    // Core distance: distance to the min_samples-th nearest other point.
    let k = cfg.min_samples.max(1).min(n - 1);
    let core: Vec<f64> = (0..n)
        .map(|i| {
            let mut dists: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| dist(i, j)).collect();
            dists.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            dists[k - 1]
        })
        .collect();

    // Mutual reachability: d_mr(i,j) = max(core_i, core_j, d(i,j)).
    let mut condensed: Vec<f64> = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n - 1 {
        for j in (i + 1)..n {
            condensed.push(dist(i, j).max(core[i]).max(core[j]));
        }
    }

    let dendrogram = linkage(&mut condensed, n, Method::Single);
    let labels = extract_eom(&dendrogram, n, min_cluster_size);
    cap_and_renumber(labels, cfg.max_clusters)
}

/// A cluster in the condensed tree: born when its parent splits, accumulating
/// stability as points fall away at increasing density levels (λ = 1/distance).
struct CondensedCluster {
    parent: Option<usize>,
    birth: f64,
    stability: f64,
    children: Vec<usize>,
}

fn extract_eom(dendrogram: &Dendrogram<f64>, n: usize, min_cluster_size: usize) -> Vec<i32> {
    let steps = dendrogram.steps();
    if steps.is_empty() {
        return vec![-1; n];
    }

    let size = |node: usize| -> usize {
        if node < n {
            1
        } else {
            steps[node - n].size
        }
    };

    let collect_leaves = |node: usize| -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(x) = stack.pop() {
            if x < n {
                leaves.push(x);
            } else {
                let step = &steps[x - n];
                stack.push(step.cluster1);
                stack.push(step.cluster2);
            }
        }
        leaves
    };

    let mut clusters = vec![CondensedCluster {
        parent: None,
        birth: 0.0,
        stability: 0.0,
        children: Vec::new(),
    }];
    // Condensed cluster each point fell out of.
    let mut owner: Vec<usize> = vec![usize::MAX; n];

    let root_node = n + steps.len() - 1;
    let mut stack: Vec<(usize, usize)> = vec![(root_node, 0)];
    while let Some((node, c)) = stack.pop() {
        if node < n {
            owner[node] = c;
            continue;
        }
        let step = &steps[node - n];
        let lambda = 1.0 / step.dissimilarity.max(1e-12);
        let (a, b) = (step.cluster1, step.cluster2);
        let (sa, sb) = (size(a), size(b));
        let birth = clusters[c].birth;

        if sa >= min_cluster_size && sb >= min_cluster_size {
            // True split: the cluster dies, both sides live on.
            clusters[c].stability += (sa + sb) as f64 * (lambda - birth);
            for side in [a, b] {
                let id = clusters.len();
                clusters.push(CondensedCluster {
                    parent: Some(c),
                    birth: lambda,
                    stability: 0.0,
                    children: Vec::new(),
                });
                clusters[c].children.push(id);
                stack.push((side, id));
            }
        } else if sa >= min_cluster_size {
            // The cluster continues through the large side; the small side
            // falls away as candidate noise.
            clusters[c].stability += sb as f64 * (lambda - birth);
            for leaf in collect_leaves(b) {
                owner[leaf] = c;
            }
            stack.push((a, c));
        } else if sb >= min_cluster_size {
            clusters[c].stability += sa as f64 * (lambda - birth);
            for leaf in collect_leaves(a) {
                owner[leaf] = c;
            }
            stack.push((b, c));
        } else {
            // Both fragments are below threshold: the cluster disintegrates.
            clusters[c].stability += (sa + sb) as f64 * (lambda - birth);
            for leaf in collect_leaves(a) {
                owner[leaf] = c;
            }
            for leaf in collect_leaves(b) {
                owner[leaf] = c;
            }
        }
    }

    // Excess-of-mass selection, children before parents. The root is never
    // selectable: a pool with no internal split has no clusters.
    let m = clusters.len();
    let mut selected = vec![false; m];
    for i in (1..m).rev() {
        if clusters[i].children.is_empty() {
            selected[i] = true;
            continue;
        }
        let child_sum: f64 = clusters[i]
            .children
            .iter()
            .map(|&ch| clusters[ch].stability)
            .sum();
        if child_sum > clusters[i].stability {
            clusters[i].stability = child_sum;
        } else {
            selected[i] = true;
            let mut sub: Vec<usize> = clusters[i].children.clone();
            while let Some(x) = sub.pop() {
                selected[x] = false;
                sub.extend(clusters[x].children.iter().copied());
            }
        }
    }

    let selected_ids: Vec<usize> = (1..m).filter(|&i| selected[i]).collect();
    let mut labels = vec![-1i32; n];
    if selected_ids.is_empty() {
        return labels;
    }
    let index_of: HashMap<usize, i32> = selected_ids
        .iter()
        .enumerate()
        .map(|(rank, &id)| (id, rank as i32))
        .collect();

    // Each point belongs to the nearest selected ancestor of the cluster it
    // fell out of; no selected ancestor means noise.
    for p in 0..n {
        let mut cur = owner[p];
        if cur == usize::MAX {
            continue;
        }
        loop {
            if let Some(&label) = index_of.get(&cur) {
                labels[p] = label;
                break;
            }
            match clusters[cur].parent {
                Some(parent) => cur = parent,
                None => break,
            }
        }
    }
    labels
}

fn cap_and_renumber(labels: Vec<i32>, max_clusters: usize) -> Vec<i32> {
    let mut counts: HashMap<i32, usize> = HashMap::new();
    for &l in &labels {
        if l >= 0 {
            *counts.entry(l).or_insert(0) += 1;
        }
    }
    if counts.is_empty() {
        return labels;
    }

    let mut by_size: Vec<(i32, usize)> = counts.into_iter().collect();
    // Largest first; ties keep the lower original id.
    by_size.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut kept: Vec<i32> = by_size
        .into_iter()
        .take(max_clusters)
        .map(|(l, _)| l)
        .collect();
    kept.sort_unstable();

    let remap: HashMap<i32, i32> = kept
        .iter()
        .enumerate()
        .map(|(rank, &l)| (l, rank as i32))
        .collect();

    labels
        .into_iter()
        .map(|l| {
            if l >= 0 {
                remap.get(&l).copied().unwrap_or(-1)
            } else {
                -1
            }
        })
        .collect()
}
