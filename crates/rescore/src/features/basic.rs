//! Features derived from the PSM alone, without any predictor

use std::collections::BTreeSet;

use super::{FeatureColumn, FeatureGenerator};
use crate::mass::PROTON;
use crate::psm::{Psm, PsmCollection};
use crate::Error;

#[derive(Clone, Debug, Default)]
pub struct BasicFeatures;

impl FeatureGenerator for BasicFeatures {
    fn name(&self) -> &str {
        "basic"
    }

    fn supports(&self, _: &Psm) -> bool {
        true
    }

    fn generate(&self, psms: &PsmCollection) -> Result<Vec<FeatureColumn>, Error> {
        let charges = psms.iter().map(Psm::charge).collect::<BTreeSet<_>>();
        let mut one_hot = charges
            .iter()
            .map(|z| (*z, FeatureColumn::new(format!("charge_{}", z))))
            .collect::<Vec<_>>();

        let mut abs_charge = FeatureColumn::new("abs_charge");
        let mut pep_len = FeatureColumn::new("pep_len");
        let mut missed = FeatureColumn::new("missed_cleavages");
        let mut theoretical = FeatureColumn::new("theoretical_mass");
        let mut experimental = FeatureColumn::new("experimental_mass");
        let mut mass_error = FeatureColumn::new("mass_error");

        for psm in psms {
            let id = psm.id();
            let charge = psm.charge();
            for (z, col) in one_hot.iter_mut() {
                col.insert(id, Some((*z == charge) as u8 as f64));
            }
            abs_charge.insert(id, Some(charge as f64));
            pep_len.insert(id, Some(psm.peptidoform().len() as f64));
            missed.insert(id, Some(psm.peptidoform().missed_cleavages() as f64));

            let calc = psm.peptidoform().monoisotopic() as f64;
            theoretical.insert(id, Some(calc));
            let exp = psm
                .precursor_mz
                .map(|mz| (mz - PROTON as f64) * charge as f64);
            experimental.insert(id, exp);
            mass_error.insert(id, exp.map(|exp| exp - calc));
        }

        let mut columns = one_hot.into_iter().map(|(_, col)| col).collect::<Vec<_>>();
        columns.extend([
            abs_charge,
            pep_len,
            missed,
            theoretical,
            experimental,
            mass_error,
        ]);
        Ok(columns)
    }
}
