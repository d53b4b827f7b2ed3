//! Ion mobility prediction using linear regression
//!
//! Unlike retention time, mobility depends strongly on the precursor charge,
//! so the embedding carries charge and m/z terms next to the composition.

use super::matrix::Matrix;
use super::retention_model::residue_map;
use crate::mass::VALID_AA;
use crate::peptide::Peptidoform;
use rayon::prelude::*;

/// Residue classes counted by the embedding
const CLASSES: [&[u8]; 6] = [
    b"LIV",    // branched
    b"GAS",    // tiny
    b"STNQ",   // uncharged polar
    b"LVIFWY", // bulky
    b"RKH",    // positive
    b"DE",     // negative
];

const FEATURES: usize = VALID_AA.len() * 4 + CLASSES.len() + 6;
const PCT_FEATURES_START: usize = VALID_AA.len();
const N_TERMINAL: usize = VALID_AA.len() * 2;
const C_TERMINAL: usize = VALID_AA.len() * 3;
const CLASS_START: usize = VALID_AA.len() * 4;
const INV_PEPTIDE_CHARGE: usize = FEATURES - 6;
const PEPTIDE_CHARGE: usize = FEATURES - 5;
const PEPTIDE_MZ: usize = FEATURES - 4;
const PEPTIDE_LEN: usize = FEATURES - 3;
const PEPTIDE_MASS: usize = FEATURES - 2;
const INTERCEPT: usize = FEATURES - 1;

#[derive(Clone, Debug)]
pub struct MobilityModel {
    beta: Vec<f64>,
    map: [usize; 26],
    pub r2: f64,
}

impl MobilityModel {
    fn embed(peptide: &Peptidoform, charge: u8, map: &[usize; 26]) -> [f64; FEATURES] {
        let mut embedding = [0.0; FEATURES];
        let cterm = peptide.len().saturating_sub(2);
        let len = peptide.len() as f64;

        for (aa_idx, residue) in peptide.sequence.bytes().enumerate() {
            let idx = map[(residue - b'A') as usize];
            embedding[idx] += 1.0;
            match aa_idx {
                0 | 1 => embedding[N_TERMINAL + idx] += 1.0,
                x if x >= cterm => embedding[C_TERMINAL + idx] += 1.0,
                _ => {}
            }
            for (class, members) in CLASSES.iter().enumerate() {
                if members.contains(&residue) {
                    embedding[CLASS_START + class] += 1.0;
                }
            }
        }

        for idx in 0..VALID_AA.len() {
            embedding[PCT_FEATURES_START + idx] = embedding[idx] / len;
        }

        let charge = charge.max(1) as f64;
        let mass = peptide.monoisotopic() as f64;
        embedding[PEPTIDE_CHARGE] = charge;
        embedding[INV_PEPTIDE_CHARGE] = 1.0 / charge;
        embedding[PEPTIDE_LEN] = len;
        embedding[PEPTIDE_MASS] = mass / 1000.0;
        embedding[PEPTIDE_MZ] = (mass / charge) / 1000.0;
        embedding[INTERCEPT] = 1.0;
        embedding
    }

    /// Attempt to fit a linear regression model: peptide sequence + charge ~
    /// ion mobility
    pub fn fit(peptides: &[(&Peptidoform, u8)], ims: &[f64]) -> Option<Self> {
        assert_eq!(peptides.len(), ims.len());
        let map = residue_map();

        let features = peptides
            .par_iter()
            .flat_map_iter(|(peptide, charge)| Self::embed(peptide, *charge, &map))
            .collect::<Vec<_>>();
        let features = Matrix::new(features, peptides.len(), FEATURES);

        let (beta, r2) = super::regression(&features, ims)?;
        log::info!("- fit mobility model, rsq = {:.3}", r2);
        Some(Self { beta, map, r2 })
    }

    pub fn predict(&self, peptide: &Peptidoform, charge: u8) -> f64 {
        Self::embed(peptide, charge, &self.map)
            .iter()
            .zip(&self.beta)
            .fold(0.0f64, |sum, (x, y)| sum + x * y)
    }
}
