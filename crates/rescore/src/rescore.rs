//! Semi-supervised rescoring
//!
//! Starting from the native search engine score, a linear discriminant is
//! repeatedly trained to separate confident targets from decoys, and the
//! q-values re-estimated under the new score. Each iteration yields an
//! immutable [`Snapshot`]; the one with the most passing targets wins.

use serde::{Deserialize, Serialize};

use crate::assemble::FeatureMatrix;
use crate::fdr;
use crate::ml::kde;
use crate::ml::linear_discriminant::LinearDiscriminantAnalysis;
use crate::ml::matrix::Matrix;
use crate::ml::qvalue;
use crate::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Reporting threshold for q-values
    pub fdr_threshold: f64,
    /// Targets at or below this q-value are positive training examples
    pub train_fdr: f64,
    pub max_iterations: usize,
    /// Added to the decoy count when estimating FDR
    pub decoy_correction: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            fdr_threshold: 0.01,
            train_fdr: 0.01,
            max_iterations: 10,
            decoy_correction: 1.0,
        }
    }
}

/// State of the model after one iteration
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// 0 for the native score
    pub iteration: usize,
    /// Discriminant weights over z-scored features; `None` for the native score
    pub weights: Option<Vec<f64>>,
    pub scores: Vec<f64>,
    pub q_values: Vec<f64>,
    /// Row indices, best first
    pub order: Vec<usize>,
    /// Targets with q <= threshold
    pub passing: usize,
}

/// Final result, in row order of the feature matrix
#[derive(Clone, Debug, PartialEq)]
pub struct Rescoring {
    pub best: Snapshot,
    /// Number of iterations performed, excluding the native snapshot
    pub iterations: usize,
    pub peptide_q: Vec<f64>,
    pub peptides_passing: usize,
    pub posterior_error: Option<Vec<f64>>,
}

impl Rescoring {
    pub fn scores(&self) -> &[f64] {
        &self.best.scores
    }

    pub fn q_values(&self) -> &[f64] {
        &self.best.q_values
    }
}

/// Standardize columns to zero mean and unit variance
fn z_score(features: &Matrix) -> Matrix {
    let mean = features.mean();
    let std = features.std();
    let mut scaled = features.clone();
    for row in 0..scaled.rows {
        for (col, value) in scaled.row_mut(row).iter_mut().enumerate() {
            let sd = match std[col] > 0.0 {
                true => std[col],
                false => 1.0,
            };
            *value = (*value - mean[col]) / sd;
        }
    }
    scaled
}

pub struct Engine {
    settings: Settings,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Engine { settings }
    }

    fn snapshot(
        &self,
        matrix: &FeatureMatrix,
        iteration: usize,
        weights: Option<Vec<f64>>,
        scores: Vec<f64>,
    ) -> Snapshot {
        let order = qvalue::rank(&scores, &matrix.seed, &matrix.ids);
        let q = qvalue::q_values(
            &scores,
            &matrix.decoys,
            &order,
            self.settings.decoy_correction,
            self.settings.fdr_threshold,
        );
        Snapshot {
            iteration,
            weights,
            scores,
            q_values: q.q_values,
            order,
            passing: q.passing,
        }
    }

    /// Rows used for training: confident targets and all decoys
    fn training_rows(&self, matrix: &FeatureMatrix, current: &Snapshot) -> (Vec<usize>, usize) {
        let mut positives = 0;
        let rows = (0..matrix.rows())
            .filter(|&row| {
                if matrix.decoys[row] {
                    return true;
                }
                let confident = current.q_values[row] <= self.settings.train_fdr;
                positives += confident as usize;
                confident
            })
            .collect();
        (rows, positives)
    }

    pub fn rescore(&self, matrix: &FeatureMatrix) -> Result<Rescoring, Error> {
        if !matrix.decoys.iter().any(|d| *d) {
            return Err(Error::NoDecoys);
        }
        let features = z_score(&matrix.features);

        let mut snapshots = vec![self.snapshot(matrix, 0, None, matrix.seed.clone())];
        log::info!(
            "- native score: {} PSMs at {} FDR",
            snapshots[0].passing,
            self.settings.fdr_threshold
        );

        for iteration in 1..=self.settings.max_iterations {
            let current = &snapshots[snapshots.len() - 1];
            let (rows, positives) = self.training_rows(matrix, current);
            if positives == 0 {
                log::warn!("- no confident targets to train on, keeping current scores");
                break;
            }

            let labels = rows.iter().map(|&row| matrix.decoys[row]).collect::<Vec<_>>();
            let lda = match LinearDiscriminantAnalysis::train(&features.select_rows(&rows), &labels)
            {
                Some(lda) => lda,
                None => {
                    log::warn!("- iteration {}: discriminant training failed", iteration);
                    break;
                }
            };
            let scores = lda.score(&features);
            let next = self.snapshot(matrix, iteration, Some(lda.weights().to_vec()), scores);
            log::debug!(
                "- iteration {}: {} positives, {} PSMs passing",
                iteration,
                positives,
                next.passing
            );

            let improved = next.passing > current.passing;
            snapshots.push(next);
            if !improved {
                break;
            }
        }

        let iterations = snapshots.len() - 1;
        // Most passing targets; the earliest snapshot wins ties
        let best = snapshots
            .into_iter()
            .reduce(|best, snap| match snap.passing > best.passing {
                true => snap,
                false => best,
            })
            .ok_or(Error::EmptyMatrix)?;
        log::info!(
            "- rescoring: {} PSMs at {} FDR (iteration {} of {})",
            best.passing,
            self.settings.fdr_threshold,
            best.iteration,
            iterations
        );

        let peptides = matrix
            .ids
            .iter()
            .map(|id| id.peptide.as_str())
            .collect::<Vec<_>>();
        let peptide_q = fdr::peptide_q_values(
            &peptides,
            &best.scores,
            &matrix.decoys,
            &best.order,
            self.settings.decoy_correction,
            self.settings.fdr_threshold,
        );

        let posterior_error = match kde::Builder::default().build(&best.scores, &matrix.decoys) {
            Some(estimator) => Some(
                best.scores
                    .iter()
                    .map(|score| estimator.posterior_error(*score))
                    .collect(),
            ),
            None => {
                log::warn!("- unable to estimate posterior error probabilities");
                None
            }
        };

        Ok(Rescoring {
            best,
            iterations,
            peptide_q: peptide_q.q_values,
            peptides_passing: peptide_q.passing,
            posterior_error,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psm::PsmId;

    fn matrix(rows: &[(f64, f64, bool)]) -> FeatureMatrix {
        let data = rows.iter().flat_map(|(a, b, _)| [*a, *b]).collect::<Vec<_>>();
        FeatureMatrix {
            names: vec!["search_engine_score".into(), "x".into()],
            features: Matrix::new(data, rows.len(), 2),
            decoys: rows.iter().map(|r| r.2).collect(),
            seed: rows.iter().map(|r| r.0).collect(),
            ids: (0..rows.len())
                .map(|i| PsmId {
                    spectrum_id: format!("{:04}", i),
                    peptide: format!("PEP{}", i),
                    charge: 2,
                    rank: 1,
                    ..Default::default()
                })
                .collect(),
            imputed: vec![],
        }
    }

    #[test]
    fn no_decoys() {
        let m = matrix(&[(1.0, 0.0, false), (2.0, 1.0, false)]);
        assert!(matches!(
            Engine::new(Settings::default()).rescore(&m),
            Err(Error::NoDecoys)
        ));
    }

    #[test]
    fn second_feature_improves_separation() {
        // The native score is weakly informative; `x` separates perfectly
        let mut rows = Vec::new();
        for i in 0..200 {
            let decoy = i % 2 == 1;
            let native = (i % 20) as f64 + if decoy { 0.0 } else { 5.0 };
            let x = if decoy { -1.0 } else { 1.0 } + (i % 7) as f64 * 0.05;
            rows.push((native, x, decoy));
        }
        let m = matrix(&rows);
        let settings = Settings {
            fdr_threshold: 0.05,
            train_fdr: 0.05,
            ..Default::default()
        };
        let result = Engine::new(settings).rescore(&m).unwrap();
        assert!(result.best.iteration >= 1);
        assert_eq!(result.best.passing, 100);
        assert!(result.best.weights.is_some());
        assert_eq!(result.peptides_passing, 100);
        assert_eq!(result.posterior_error.as_ref().map(Vec::len), Some(200));

        // q-values never decrease with rank
        let q = result.q_values();
        for w in result.best.order.windows(2) {
            assert!(q[w[0]] <= q[w[1]]);
        }
    }

    #[test]
    fn keeps_native_score_without_positives() {
        // Targets and decoys interleaved: nothing passes, nothing to train on
        let rows = (0..20)
            .map(|i| (i as f64, 0.0 + i as f64 * 0.1, i % 2 == 0))
            .collect::<Vec<_>>();
        let result = Engine::new(Settings::default()).rescore(&matrix(&rows)).unwrap();
        assert_eq!(result.best.iteration, 0);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.best.scores, m_seed(&rows));
    }

    fn m_seed(rows: &[(f64, f64, bool)]) -> Vec<f64> {
        rows.iter().map(|r| r.0).collect()
    }
}
