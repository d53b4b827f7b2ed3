//! Peptide-level FDR
//!
//! PSMs are grouped by (peptide, decoy). The best scoring PSM of each group
//! represents it in target-decoy competition, and every member of the group
//! receives the representative's q-value.

use fnv::FnvHashMap;

use crate::ml::qvalue::{self, QValues};

/// Peptide-level q-values, in row order. `order` must be the PSM-level
/// ranking of rows, best first (see [`qvalue::rank`]). `passing` counts
/// target peptides, not PSMs
pub fn peptide_q_values(
    peptides: &[&str],
    scores: &[f64],
    decoys: &[bool],
    order: &[usize],
    correction: f64,
    threshold: f64,
) -> QValues {
    assert_eq!(peptides.len(), scores.len());
    assert_eq!(peptides.len(), decoys.len());

    // Visiting rows best first, the first member seen represents the group
    let mut groups: FnvHashMap<(&str, bool), usize> = FnvHashMap::default();
    let mut representatives = Vec::new();
    let mut group_of = vec![0; peptides.len()];
    for &row in order {
        let key = (peptides[row], decoys[row]);
        let group = *groups.entry(key).or_insert_with(|| {
            representatives.push(row);
            representatives.len() - 1
        });
        group_of[row] = group;
    }

    let rep_scores = representatives
        .iter()
        .map(|&row| scores[row])
        .collect::<Vec<_>>();
    let rep_decoys = representatives
        .iter()
        .map(|&row| decoys[row])
        .collect::<Vec<_>>();
    let rep_order = (0..representatives.len()).collect::<Vec<_>>();
    let peptide_q = qvalue::q_values(&rep_scores, &rep_decoys, &rep_order, correction, threshold);

    QValues {
        q_values: group_of
            .iter()
            .map(|&group| peptide_q.q_values[group])
            .collect(),
        passing: peptide_q.passing,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn groups_share_q_values() {
        let peptides = ["A", "A", "B", "C", "B", "A"];
        let scores = [10.0, 9.0, 8.0, 7.0, 6.0, 5.0];
        let decoys = [false, false, false, true, false, true];
        let keys = [0, 1, 2, 3, 4, 5];
        let order = qvalue::rank(&scores, &scores, &keys);
        let q = peptide_q_values(&peptides, &scores, &decoys, &order, 0.0, 0.01);

        // Representatives: A (10), B (8), C decoy (7), A decoy (5)
        // fdr = 0, 0, 1/2, 1
        assert_eq!(q.q_values, vec![0.0, 0.0, 0.0, 0.5, 0.0, 1.0]);
        assert_eq!(q.passing, 2);
    }

    #[test]
    fn target_and_decoy_of_same_peptide_are_separate() {
        let peptides = ["A", "A"];
        let scores = [2.0, 1.0];
        let decoys = [true, false];
        let order = qvalue::rank(&scores, &scores, &[0, 1]);
        let q = peptide_q_values(&peptides, &scores, &decoys, &order, 0.0, 0.01);
        assert_eq!(q.q_values, vec![1.0, 1.0]);
        assert_eq!(q.passing, 0);
    }
}
