//! Agreement between predicted and observed fragment ion intensities

use std::sync::Arc;
use std::time::Duration;

use super::{FeatureColumn, FeatureGenerator};
use crate::ion_series::{fragment_ladder, Kind};
use crate::mass::Tolerance;
use crate::ml::{cosine, mse, pearson, spearman};
use crate::predictor::{predict_with_timeout, PredictionRequest, Predictor};
use crate::psm::{Psm, PsmCollection};
use crate::spectrum::SpectrumIndex;
use crate::Error;

const MIN_LENGTH: usize = 2;
const MAX_LENGTH: usize = 30;
const MAX_CHARGE: u8 = 6;

/// Pseudo-count added before taking logarithms
const LOG_OFFSET: f64 = 0.001;

pub const FEATURES: [&str; 8] = [
    "spec_pearson",
    "spec_pearson_log",
    "spec_spearman",
    "cos",
    "spec_mse",
    "b_pearson",
    "y_pearson",
    "matched_fraction",
];

pub struct IntensityFeatures {
    spectra: Arc<SpectrumIndex>,
    predictor: Arc<dyn Predictor>,
    pub tolerance: Tolerance,
    pub timeout: Option<Duration>,
}

/// Scale to unit total intensity, clamping negative predictions to zero
fn normalize(intensities: &mut [f64]) {
    intensities.iter_mut().for_each(|x| *x = x.max(0.0));
    let total = intensities.iter().sum::<f64>();
    if total > 0.0 {
        intensities.iter_mut().for_each(|x| *x /= total);
    }
}

/// Similarity scores in the order of [`FEATURES`]
fn similarity(predicted: &[f64], observed: &[f64], kinds: &[Kind]) -> [Option<f64>; 8] {
    let log = |v: &[f64]| v.iter().map(|x| (x + LOG_OFFSET).log2()).collect::<Vec<_>>();
    let split = |v: &[f64], kind: Kind| {
        v.iter()
            .zip(kinds)
            .filter(|(_, k)| **k == kind)
            .map(|(x, _)| *x)
            .collect::<Vec<_>>()
    };

    let matched = observed.iter().filter(|x| **x > 0.0).count();
    [
        pearson(predicted, observed),
        pearson(&log(predicted), &log(observed)),
        spearman(predicted, observed),
        cosine(predicted, observed),
        mse(predicted, observed),
        pearson(&split(predicted, Kind::B), &split(observed, Kind::B)),
        pearson(&split(predicted, Kind::Y), &split(observed, Kind::Y)),
        Some(matched as f64 / observed.len().max(1) as f64),
    ]
}

impl IntensityFeatures {
    pub fn new(spectra: Arc<SpectrumIndex>, predictor: Arc<dyn Predictor>) -> Self {
        IntensityFeatures {
            spectra,
            predictor,
            tolerance: Tolerance::default(),
            timeout: None,
        }
    }

    fn score(&self, psm: &Psm, prediction: Option<Vec<f64>>) -> [Option<f64>; 8] {
        let spectrum = match self.spectra.get(psm.spectrum_id()) {
            Some(spectrum) => spectrum,
            None => return [None; 8],
        };
        let ions = fragment_ladder(psm.peptidoform());
        let mut predicted = match prediction {
            Some(p) if p.len() == ions.len() => p,
            Some(p) => {
                log::trace!(
                    "{}: expected {} intensities, got {}",
                    psm.id(),
                    ions.len(),
                    p.len()
                );
                return [None; 8];
            }
            None => return [None; 8],
        };
        let mut observed = ions
            .iter()
            .map(|ion| spectrum.matched_intensity(ion.mz(), self.tolerance) as f64)
            .collect::<Vec<_>>();
        normalize(&mut predicted);
        normalize(&mut observed);

        let kinds = ions.iter().map(|ion| ion.kind).collect::<Vec<_>>();
        similarity(&predicted, &observed, &kinds)
    }
}

impl FeatureGenerator for IntensityFeatures {
    fn name(&self) -> &str {
        "ms2"
    }

    fn supports(&self, psm: &Psm) -> bool {
        (MIN_LENGTH..=MAX_LENGTH).contains(&psm.peptidoform().len())
            && psm.charge() <= MAX_CHARGE
            && self.spectra.get(psm.spectrum_id()).is_some()
    }

    fn generate(&self, psms: &PsmCollection) -> Result<Vec<FeatureColumn>, Error> {
        let supported = psms
            .iter()
            .filter(|psm| self.supports(psm))
            .collect::<Vec<_>>();
        if supported.is_empty() {
            return Err(Error::unavailable(
                self.name(),
                "no PSM has a matching spectrum",
            ));
        }

        let requests = supported
            .iter()
            .map(|psm| PredictionRequest {
                peptidoform: psm.peptidoform().clone(),
                charge: psm.charge(),
                rt: psm.rt,
            })
            .collect();
        let predictions =
            predict_with_timeout(Arc::clone(&self.predictor), requests, self.timeout)
                .map_err(|e| Error::unavailable(self.name(), e))?;

        let mut columns = FEATURES.map(FeatureColumn::new);
        let mut failed = 0;
        for (psm, prediction) in supported.iter().zip(predictions) {
            let values = self.score(psm, prediction);
            if values[0].is_none() {
                failed += 1;
            }
            for (column, value) in columns.iter_mut().zip(values) {
                column.insert(psm.id(), value);
            }
        }
        if failed > 0 {
            log::debug!(
                "{}: no intensity correlation for {} of {} PSMs",
                self.name(),
                failed,
                supported.len()
            );
        }
        Ok(columns.into())
    }
}
