//! Dense float vector helpers.
//!
//! All reductions run left to right in `f32`, so repeated calls on the same
//! inputs are bit-identical.

/// Dot product. Extra elements of the longer slice are ignored.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Euclidean (L2) norm.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scale `v` so its entries sum to 1. Returns the original sum.
///
/// A vector summing to zero is left untouched.
pub fn l1_normalize(v: &mut [f32]) -> f32 {
    let sum: f32 = v.iter().sum();
    if sum > 0. {
        let inv_sum = 1. / sum;
        for w in v.iter_mut() {
            *w *= inv_sum;
        }
    }
    sum
}

/// Scale `v` to unit Euclidean norm. Returns the original norm.
///
/// The zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm = l2_norm(v);
    if norm > 0. {
        for w in v.iter_mut() {
            *w /= norm;
        }
    }
    norm
}

/// Index of the row of `rows` (row-major, `dim` columns) nearest to `x`,
/// with its squared distance. Ties resolve to the lowest index.
///
/// Returns `None` when `rows` holds no complete row.
pub fn nearest(rows: &[f32], dim: usize, x: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, row) in rows.chunks_exact(dim.max(1)).enumerate() {
        let d = squared_euclidean(row, x);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((i, d)),
        }
    }
    best
}
