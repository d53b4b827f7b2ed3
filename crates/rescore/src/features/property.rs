//! Observed vs. predicted retention time and ion mobility
//!
//! Predictions come either from an external [`Predictor`], linearly
//! calibrated against confident identifications, or from a linear model
//! trained on those identifications directly.

use std::sync::Arc;
use std::time::Duration;

use fnv::FnvHashMap;

use super::{FeatureColumn, FeatureGenerator};
use crate::ml::mobility_model::MobilityModel;
use crate::ml::qvalue;
use crate::ml::retention_model::RetentionModel;
use crate::predictor::{predict_with_timeout, PredictionRequest, Predictor};
use crate::psm::{Psm, PsmCollection};
use crate::Error;

/// Decoy correction used when selecting confident PSMs for calibration
const CALIBRATION_CORRECTION: f64 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Property {
    RetentionTime,
    IonMobility,
}

impl Property {
    pub fn generator(&self) -> &'static str {
        match self {
            Property::RetentionTime => "retention_time",
            Property::IonMobility => "ion_mobility",
        }
    }

    /// Suffix used in feature names
    fn short(&self) -> &'static str {
        match self {
            Property::RetentionTime => "rt",
            Property::IonMobility => "im",
        }
    }

    fn observed(&self, psm: &Psm) -> Option<f64> {
        let value = match self {
            Property::RetentionTime => psm.rt,
            Property::IonMobility => psm.ion_mobility,
        };
        value.map(f64::from).filter(|v| v.is_finite())
    }
}

#[derive(Clone)]
pub enum PropertySource {
    External {
        predictor: Arc<dyn Predictor>,
        timeout: Option<Duration>,
    },
    /// Fit a linear model on the confident PSMs of the collection
    SelfTrained,
}

#[derive(Clone)]
pub struct PropertyFeatures {
    property: Property,
    source: PropertySource,
    /// Native q-value threshold for PSMs used in calibration/training
    pub calibration_fdr: f64,
    /// Minimum number of confident PSMs needed
    pub min_psms: usize,
}

impl PropertyFeatures {
    pub fn new(property: Property, source: PropertySource) -> Self {
        PropertyFeatures {
            property,
            source,
            calibration_fdr: 0.01,
            min_psms: 50,
        }
    }

    /// Indices of rank 1 targets passing `calibration_fdr` on the native score
    fn confident(&self, psms: &PsmCollection) -> Vec<usize> {
        let scores = psms
            .iter()
            .map(|psm| psms.oriented_score(psm))
            .collect::<Vec<_>>();
        let decoys = psms.iter().map(Psm::is_decoy).collect::<Vec<_>>();
        let ids = psms.iter().map(Psm::id).collect::<Vec<_>>();
        let order = qvalue::rank(&scores, &scores, &ids);
        let q = qvalue::q_values(
            &scores,
            &decoys,
            &order,
            CALIBRATION_CORRECTION,
            self.calibration_fdr,
        );

        psms.iter()
            .enumerate()
            .filter(|(idx, psm)| {
                !psm.is_decoy()
                    && psm.rank() == 1
                    && q.q_values[*idx] <= self.calibration_fdr
                    && self.supports(psm)
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    fn self_trained(
        &self,
        psms: &[Psm],
        confident: &[usize],
        supported: &[usize],
    ) -> Result<Vec<Option<f64>>, Error> {
        let observed = confident
            .iter()
            .filter_map(|&idx| self.property.observed(&psms[idx]))
            .collect::<Vec<_>>();
        match self.property {
            Property::RetentionTime => {
                let peptides = confident
                    .iter()
                    .map(|&idx| psms[idx].peptidoform())
                    .collect::<Vec<_>>();
                let model = RetentionModel::fit(&peptides, &observed).ok_or_else(|| {
                    Error::unavailable(self.name(), "retention time model fit failed")
                })?;
                Ok(supported
                    .iter()
                    .map(|&idx| Some(model.predict(psms[idx].peptidoform())))
                    .collect())
            }
            Property::IonMobility => {
                let peptides = confident
                    .iter()
                    .map(|&idx| (psms[idx].peptidoform(), psms[idx].charge()))
                    .collect::<Vec<_>>();
                let model = MobilityModel::fit(&peptides, &observed).ok_or_else(|| {
                    Error::unavailable(self.name(), "ion mobility model fit failed")
                })?;
                Ok(supported
                    .iter()
                    .map(|&idx| Some(model.predict(psms[idx].peptidoform(), psms[idx].charge())))
                    .collect())
            }
        }
    }

    fn external(
        &self,
        predictor: &Arc<dyn Predictor>,
        timeout: Option<Duration>,
        psms: &[Psm],
        confident: &[usize],
        supported: &[usize],
    ) -> Result<Vec<Option<f64>>, Error> {
        let requests = supported
            .iter()
            .map(|&idx| PredictionRequest {
                peptidoform: psms[idx].peptidoform().clone(),
                charge: psms[idx].charge(),
                rt: psms[idx].rt,
            })
            .collect::<Vec<_>>();
        let raw = predict_with_timeout(Arc::clone(predictor), requests, timeout)
            .map_err(|e| Error::unavailable(self.name(), e))?
            .into_iter()
            .map(|p| p.and_then(|values| values.first().copied()))
            .collect::<Vec<_>>();

        // Calibrate raw predictions onto the observed scale
        let position = supported
            .iter()
            .enumerate()
            .map(|(pos, &idx)| (idx, pos))
            .collect::<FnvHashMap<_, _>>();
        let (x, y): (Vec<f64>, Vec<f64>) = confident
            .iter()
            .filter_map(|idx| {
                let predicted = raw[*position.get(idx)?]?;
                Some((predicted, self.property.observed(&psms[*idx])?))
            })
            .unzip();
        if x.len() < self.min_psms {
            return Err(Error::unavailable(
                self.name(),
                format!("only {} confident PSMs have predictions", x.len()),
            ));
        }
        let (slope, intercept) = crate::ml::linear_fit(&x, &y).ok_or_else(|| {
            Error::unavailable(self.name(), "calibration of predictions failed")
        })?;
        log::debug!(
            "{}: calibrated predictions, slope = {:.4}, intercept = {:.4}",
            self.name(),
            slope,
            intercept
        );

        Ok(raw
            .into_iter()
            .map(|p| p.map(|p| slope * p + intercept))
            .collect())
    }
}

impl FeatureGenerator for PropertyFeatures {
    fn name(&self) -> &str {
        self.property.generator()
    }

    fn supports(&self, psm: &Psm) -> bool {
        !psm.peptidoform().is_empty() && self.property.observed(psm).is_some()
    }

    fn generate(&self, psms: &PsmCollection) -> Result<Vec<FeatureColumn>, Error> {
        let confident = self.confident(psms);
        if confident.len() < self.min_psms {
            return Err(Error::unavailable(
                self.name(),
                format!(
                    "{} confident PSMs at {} FDR, need at least {}",
                    confident.len(),
                    self.calibration_fdr,
                    self.min_psms
                ),
            ));
        }

        let slice = psms.as_slice();
        let supported = slice
            .iter()
            .enumerate()
            .filter(|(_, psm)| self.supports(psm))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        log::trace!(
            "{}: {} confident, {} supported PSMs",
            self.name(),
            confident.len(),
            supported.len()
        );

        let predicted = match &self.source {
            PropertySource::SelfTrained => self.self_trained(slice, &confident, &supported)?,
            PropertySource::External { predictor, timeout } => {
                self.external(predictor, *timeout, slice, &confident, &supported)?
            }
        };

        let short = self.property.short();
        let mut observed_col = FeatureColumn::new(format!("observed_{}", short));
        let mut predicted_col = FeatureColumn::new(format!("predicted_{}", short));
        let mut diff_col = FeatureColumn::new(format!("{}_diff", short));
        let mut best_col = FeatureColumn::new(format!("{}_diff_best", short));

        let mut best: FnvHashMap<&str, f64> = FnvHashMap::default();
        let mut diffs = Vec::with_capacity(supported.len());
        for (&idx, prediction) in supported.iter().zip(&predicted) {
            let psm = &slice[idx];
            let observed = self.property.observed(psm);
            let diff = observed
                .zip(*prediction)
                .map(|(obs, pred)| (obs - pred).abs())
                .filter(|d| d.is_finite());
            if let Some(diff) = diff {
                let entry = best.entry(psm.peptide()).or_insert(diff);
                *entry = entry.min(diff);
            }
            observed_col.insert(psm.id(), observed);
            predicted_col.insert(psm.id(), *prediction);
            diff_col.insert(psm.id(), diff);
            diffs.push(diff);
        }
        for (&idx, diff) in supported.iter().zip(&diffs) {
            let psm = &slice[idx];
            let value = diff.and_then(|_| best.get(psm.peptide()).copied());
            best_col.insert(psm.id(), value);
        }

        Ok(vec![observed_col, predicted_col, diff_col, best_col])
    }
}
