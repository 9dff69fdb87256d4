//! Follow-up answer filter: re-score the pool against the accumulated
//! answers and keep the better half.

use crate::embedding::cosine_similarity;
use crate::types::ScoredChunk;

/// Keep the `max(⌈N/2⌉, min(3, N))` chunks most similar to the answer
/// context vector. The floor of three keeps the pool viable for another
/// round; a pool already smaller than three passes through whole.
pub fn filter_by_context(points: Vec<ScoredChunk>, ctx_vec: &[f32]) -> Vec<ScoredChunk> {
    let n = points.len();
    if n == 0 {
        return points;
    }

    let mut scored: Vec<(f32, ScoredChunk)> = points
        .into_iter()
        .map(|pt| (cosine_similarity(ctx_vec, &pt.dense_vector), pt))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let keep = ((n + 1) / 2).max(n.min(3));
    scored.truncate(keep);
    scored.into_iter().map(|(_, pt)| pt).collect()
}
