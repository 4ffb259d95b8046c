//! Distance computation for exact nearest-neighbor search.

use ordered_float::OrderedFloat;

/// Squared Euclidean distance between two vectors of equal length.
///
/// Callers check lengths; extra components of the longer slice are ignored.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Positions of the `k` vectors closest to `query`, with their distances.
///
/// Ordered by ascending squared L2 distance. The sort is stable, so equal
/// distances keep insertion order. Returns every vector when `k` exceeds
/// the number stored.
pub fn nearest(query: &[f32], vectors: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(OrderedFloat<f32>, usize)> = vectors
        .iter()
        .enumerate()
        .map(|(position, v)| (OrderedFloat(squared_l2(query, v)), position))
        .collect();

    scored.sort_by_key(|(distance, _)| *distance);

    scored
        .into_iter()
        .take(k)
        .map(|(distance, position)| (position, distance.0))
        .collect()
}
