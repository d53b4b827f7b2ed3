//! Linear Discriminant Analysis
//!
//! Fisher's discriminant for two classes: the projection maximizing the ratio
//! of between-class to within-class scatter is the dominant eigenvector of
//! inv(Sw).dot(Sb). Sw is ridge regularized so that highly correlated or
//! nearly constant features do not make the system singular.

use super::gauss::Gauss;
use super::matrix::Matrix;

/// Relative strength of the ridge added to the diagonal of Sw
const RIDGE: f64 = 1E-3;

#[derive(Clone, Debug, PartialEq)]
pub struct LinearDiscriminantAnalysis {
    eigenvector: Vec<f64>,
}

impl LinearDiscriminantAnalysis {
    /// Fit a discriminant separating `decoy == false` from `decoy == true`
    /// rows. Returns `None` if either class is empty or the scatter matrices
    /// cannot be solved.
    pub fn train(features: &Matrix, decoy: &[bool]) -> Option<LinearDiscriminantAnalysis> {
        assert_eq!(features.rows, decoy.len());

        let x_bar = features.mean();
        let mut scatter_within = Matrix::zeros(features.cols, features.cols);
        let mut scatter_between = Matrix::zeros(features.cols, features.cols);

        // Target class mean first, then decoy class mean
        let mut class_means = Vec::with_capacity(2);

        for class in [false, true] {
            let rows = decoy
                .iter()
                .enumerate()
                .filter(|&(_, label)| *label == class)
                .map(|(row, _)| row)
                .collect::<Vec<_>>();
            if rows.is_empty() {
                log::trace!("- cannot fit linear model: empty class (decoy = {})", class);
                return None;
            }

            let mut class_data = features.select_rows(&rows);
            let class_mean = class_data.mean();

            for row in 0..class_data.rows {
                class_data
                    .row_mut(row)
                    .iter_mut()
                    .zip(&class_mean)
                    .for_each(|(x, mu)| *x -= mu);
            }

            scatter_within += class_data.transpose().dot(&class_data);

            let diff = Matrix::col_vector(
                class_mean
                    .iter()
                    .zip(x_bar.iter())
                    .map(|(x, y)| x - y)
                    .collect::<Vec<_>>(),
            );
            scatter_between += diff.dot(&diff.transpose());
            class_means.push(class_mean);
        }

        let trace = (0..features.cols)
            .map(|i| scatter_within[(i, i)])
            .sum::<f64>();
        let ridge = RIDGE * (trace / features.cols.max(1) as f64).max(1.0);
        for i in 0..features.cols {
            scatter_within[(i, i)] += ridge;
        }

        // For two classes, the difference of class means lies close to the
        // dominant eigenvector, which makes it a good starting point
        let initial = class_means[0]
            .iter()
            .zip(&class_means[1])
            .map(|(t, d)| t - d)
            .collect::<Vec<_>>();

        let mut evec =
            Gauss::solve(scatter_within, scatter_between).map(|mat| mat.power_method(&initial))?;

        if !evec.iter().all(|x| x.is_finite()) {
            log::trace!("- linear model eigenvector is not finite: {:?}", evec);
            return None;
        }

        // Power method can return the eigenvector with its sign flipped. Make
        // it so that the target class scores higher than the decoy class
        let dot = |v: &[f64]| v.iter().zip(&evec).fold(0.0, |acc, (x, w)| acc + x * w);
        if dot(&class_means[0]) < dot(&class_means[1]) {
            evec.iter_mut().for_each(|c| *c *= -1.0);
        }

        log::trace!("- linear model fit with eigenvector: {:?}", evec);

        Some(LinearDiscriminantAnalysis { eigenvector: evec })
    }

    pub fn weights(&self) -> &[f64] {
        &self.eigenvector
    }

    pub fn score(&self, features: &Matrix) -> Vec<f64> {
        features.dotv(&self.eigenvector)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ml::*;

    #[test]
    fn power_method() {
        let a = Matrix::new([1., 2., 3., 4.], 2, 2);
        let eigenvector = [0.4159736, 0.90937671];
        assert!(all_close(
            &a.power_method(&[0.54, 0.34]),
            &eigenvector,
            1E-5
        ));
    }

    #[test]
    fn linear_discriminant() {
        #[rustfmt::skip]
        let feats = Matrix::new(
            [
                5., 4., 3., 2.,
                4., 5., 4., 3.,
                6., 3., 4., 5.,
                1., 0., 2., 9.,
                5., 4., 4., 3.,
                2., 1., 1., 9.5,
                1., 0., 2., 8.,
                3., 2., -2., 10.,
            ],
            8,
            4,
        );
        let decoy = [false, false, false, true, false, true, true, true];

        let lda = LinearDiscriminantAnalysis::train(&feats, &decoy).expect("error training LDA");
        let scores = lda.score(&feats);

        let min_target = scores
            .iter()
            .zip(&decoy)
            .filter(|(_, d)| !**d)
            .map(|(s, _)| *s)
            .fold(f64::MAX, f64::min);
        let max_decoy = scores
            .iter()
            .zip(&decoy)
            .filter(|(_, d)| **d)
            .map(|(s, _)| *s)
            .fold(f64::MIN, f64::max);
        assert!(min_target > max_decoy, "{:?}", scores);
        assert!((norm(lda.weights()) - 1.0).abs() < 1E-8);
    }

    #[test]
    fn single_class_fails() {
        let feats = Matrix::new([1., 2., 3., 4.], 2, 2);
        assert!(LinearDiscriminantAnalysis::train(&feats, &[false, false]).is_none());
    }
}
