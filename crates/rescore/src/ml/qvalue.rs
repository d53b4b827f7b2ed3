//! Target-decoy competition q-values

use std::cmp::Ordering;

/// Order rows best first: by `scores` descending, then by `seed` (the native
/// score) descending, then by `keys` ascending. The result is a permutation
/// of row indices and is fully deterministic for distinct keys.
pub fn rank<K: Ord>(scores: &[f64], seed: &[f64], keys: &[K]) -> Vec<usize> {
    assert_eq!(scores.len(), seed.len());
    assert_eq!(scores.len(), keys.len());
    let mut order = (0..scores.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        scores[b]
            .total_cmp(&scores[a])
            .then_with(|| seed[b].total_cmp(&seed[a]))
            .then_with(|| keys[a].cmp(&keys[b]))
    });
    order
}

/// Result of a q-value estimation, in original row order
#[derive(Clone, Debug, PartialEq)]
pub struct QValues {
    pub q_values: Vec<f64>,
    /// Number of targets with q <= threshold
    pub passing: usize,
}

/// Assign q-values to rows ranked by `order` (see [`rank`]).
///
/// The FDR at score `s` is estimated as `(decoys >= s + correction) / (targets >= s)`,
/// capped at 1.0. Rows sharing a score are processed as a block and receive the
/// same estimate. The q-value is the cumulative minimum of the FDR, taken from
/// the worst scoring row upwards, so it never decreases with rank.
pub fn q_values(
    scores: &[f64],
    decoys: &[bool],
    order: &[usize],
    correction: f64,
    threshold: f64,
) -> QValues {
    assert_eq!(scores.len(), decoys.len());
    assert_eq!(scores.len(), order.len());

    let mut fdr = vec![1.0; order.len()];
    let mut decoy = 0usize;
    let mut target = 0usize;

    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end < order.len()
            && scores[order[end]].total_cmp(&scores[order[start]]) == Ordering::Equal
        {
            match decoys[order[end]] {
                true => decoy += 1,
                false => target += 1,
            }
            end += 1;
        }
        let estimate = match target {
            0 => 1.0,
            _ => ((decoy as f64 + correction) / target as f64).min(1.0),
        };
        fdr[start..end].iter_mut().for_each(|f| *f = estimate);
        start = end;
    }

    // Reverse, and calculate the cumulative minimum
    let mut q_values = vec![1.0; order.len()];
    let mut q_min = 1.0f64;
    let mut passing = 0;
    for (rank, &row) in order.iter().enumerate().rev() {
        q_min = q_min.min(fdr[rank]);
        q_values[row] = q_min;
        if q_min <= threshold && !decoys[row] {
            passing += 1;
        }
    }

    QValues { q_values, passing }
}
