//! Retention time prediction using linear regression
//!
//! See Klammer et al., Anal. Chem. 2007, 79, 16, 6111–6118
//! https://doi.org/10.1021/ac070262k

use super::matrix::Matrix;
use crate::mass::VALID_AA;
use crate::peptide::Peptidoform;
use rayon::prelude::*;

/// Minimum coefficient of determination for a usable model
const MIN_R2: f64 = 0.7;

const FEATURES: usize = VALID_AA.len() * 3 + 3;
const N_TERMINAL: usize = VALID_AA.len();
const C_TERMINAL: usize = VALID_AA.len() * 2;
const PEPTIDE_LEN: usize = FEATURES - 3;
const PEPTIDE_MASS: usize = FEATURES - 2;
const INTERCEPT: usize = FEATURES - 1;

/// Mapping from residue (`b'A'..=b'Z'`) to embedding position
pub(super) fn residue_map() -> [usize; 26] {
    let mut map = [0; 26];
    for (idx, aa) in VALID_AA.iter().enumerate() {
        map[(aa - b'A') as usize] = idx;
    }
    map
}

#[derive(Clone, Debug)]
pub struct RetentionModel {
    beta: Vec<f64>,
    map: [usize; 26],
    pub r2: f64,
    /// Minimum retention time in training set
    pub rt_min: f64,
    /// Maximum retention time in training set
    pub rt_max: f64,
}

impl RetentionModel {
    /// Composition of the peptide, plus the first and last two residues,
    /// length and log mass. Modifications contribute through the mass term
    fn embed(peptide: &Peptidoform, map: &[usize; 26]) -> [f64; FEATURES] {
        let mut embedding = [0.0; FEATURES];
        let cterm = peptide.len().saturating_sub(2);
        for (aa_idx, residue) in peptide.sequence.bytes().enumerate() {
            let idx = map[(residue - b'A') as usize];
            embedding[idx] += 1.0;
            match aa_idx {
                0 | 1 => embedding[N_TERMINAL + idx] += 1.0,
                x if x >= cterm => embedding[C_TERMINAL + idx] += 1.0,
                _ => {}
            }
        }
        embedding[PEPTIDE_LEN] = peptide.len() as f64;
        embedding[PEPTIDE_MASS] = (peptide.monoisotopic() as f64).ln_1p();
        embedding[INTERCEPT] = 1.0;
        embedding
    }

    /// Attempt to fit a linear regression model: peptide sequence ~ retention
    /// time. Fails if the fit is degenerate or explains too little variance
    pub fn fit(peptides: &[&Peptidoform], rt: &[f64]) -> Option<Self> {
        assert_eq!(peptides.len(), rt.len());
        let map = residue_map();

        let (mut rt_min, mut rt_max) = (f64::MAX, f64::MIN);
        for &rt in rt {
            rt_min = rt_min.min(rt);
            rt_max = rt_max.max(rt);
        }

        let features = peptides
            .par_iter()
            .flat_map_iter(|peptide| Self::embed(peptide, &map))
            .collect::<Vec<_>>();
        let features = Matrix::new(features, peptides.len(), FEATURES);

        let (beta, r2) = super::regression(&features, rt)?;
        if r2 >= MIN_R2 {
            log::info!("- fit retention time model, rsq = {:.3}", r2);
            Some(Self {
                beta,
                map,
                r2,
                rt_min,
                rt_max,
            })
        } else {
            log::warn!("- fit retention time model, rsq = {:.3}", r2);
            None
        }
    }

    /// Predict the retention time of a peptide. Linear models can produce
    /// extreme values, so predictions are clamped near the training range
    pub fn predict(&self, peptide: &Peptidoform) -> f64 {
        let rt = Self::embed(peptide, &self.map)
            .iter()
            .zip(&self.beta)
            .fold(0.0f64, |sum, (x, y)| sum + x * y);
        rt.clamp(self.rt_min - 10.0, self.rt_max + 10.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hydrophobic_peptides_elute_later() {
        let sequences = [
            "LLLLK", "LLLGK", "LLGGK", "LGGGK", "GGGGK", "LLLLLLK", "GGGGGGK", "LGLGLGK",
            "GLGLGLK", "LLLGGGK", "FFLLK", "FGGGK", "GFFGK", "LFLFLFK", "GGGGGFK",
        ];
        let peptides = sequences
            .iter()
            .map(|s| s.parse::<Peptidoform>().unwrap())
            .collect::<Vec<_>>();
        // Each L adds 3 minutes, each F 4 minutes
        let rt = peptides
            .iter()
            .map(|p| {
                5.0 + p
                    .sequence
                    .bytes()
                    .map(|r| match r {
                        b'L' => 3.0,
                        b'F' => 4.0,
                        _ => 0.0,
                    })
                    .sum::<f64>()
            })
            .collect::<Vec<_>>();

        let refs = peptides.iter().collect::<Vec<_>>();
        let model = RetentionModel::fit(&refs, &rt).expect("model fits");
        assert!(model.r2 > 0.95, "{}", model.r2);

        let early = model.predict(&"GGGLK".parse().unwrap());
        let late = model.predict(&"LLLLLK".parse().unwrap());
        assert!(late > early, "{} {}", early, late);
        assert!(late <= model.rt_max + 10.0);
    }

    #[test]
    fn uninformative_fit_is_rejected() {
        let peptides = ["PEPTIDE", "PEPTIDE", "PEPTIDE"]
            .iter()
            .map(|s| s.parse::<Peptidoform>().unwrap())
            .collect::<Vec<_>>();
        let refs = peptides.iter().collect::<Vec<_>>();
        assert!(RetentionModel::fit(&refs, &[1.0, 20.0, 40.0]).is_none());
    }
}
