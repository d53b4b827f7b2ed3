//! Observed MS2 spectra and precursor back-filling

use std::collections::BTreeSet;

use fnv::FnvHashMap;
use serde::Serialize;

use crate::mass::Tolerance;
use crate::psm::PsmCollection;
use crate::Error;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spectrum {
    pub id: String,
    pub precursor_mz: Option<f64>,
    pub charge: Option<u8>,
    /// Retention time, in minutes
    pub rt: Option<f32>,
    pub ion_mobility: Option<f32>,
    /// Fragment m/z, sorted ascending
    pub mz: Vec<f32>,
    pub intensity: Vec<f32>,
}

impl Spectrum {
    /// Sort peaks by m/z, keeping intensities aligned
    pub fn sort_peaks(&mut self) {
        if self.mz.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut peaks = self
            .mz
            .iter()
            .copied()
            .zip(self.intensity.iter().copied())
            .collect::<Vec<_>>();
        peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
        (self.mz, self.intensity) = peaks.into_iter().unzip();
    }

    /// Most intense peak within `tolerance` of `mz`, or 0.0 if none
    pub fn matched_intensity(&self, mz: f32, tolerance: Tolerance) -> f32 {
        let (lo, hi) = tolerance.bounds(mz);
        let start = self.mz.partition_point(|x| *x < lo);
        self.mz[start..]
            .iter()
            .zip(&self.intensity[start..])
            .take_while(|(x, _)| **x <= hi)
            .fold(0.0f32, |acc, (_, i)| acc.max(*i))
    }
}

/// Spectra of a single run, keyed by spectrum id
#[derive(Clone, Debug, Default)]
pub struct SpectrumIndex {
    spectra: FnvHashMap<String, Spectrum>,
}

impl SpectrumIndex {
    pub fn new(spectra: Vec<Spectrum>) -> Self {
        let mut index = SpectrumIndex::default();
        for spectrum in spectra {
            index.insert(spectrum);
        }
        index
    }

    pub fn insert(&mut self, mut spectrum: Spectrum) {
        spectrum.sort_peaks();
        if let Some(previous) = self.spectra.insert(spectrum.id.clone(), spectrum) {
            log::warn!("duplicate spectrum id `{}`, keeping the last", previous.id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Spectrum> {
        self.spectra.get(id)
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MsDataType {
    RetentionTime,
    IonMobility,
    PrecursorMz,
    Ms2Spectra,
}

/// Precursor data types present (and non-zero) for every PSM
pub fn available_data(psms: &PsmCollection) -> BTreeSet<MsDataType> {
    let mut available = BTreeSet::new();
    if psms.iter().all(|psm| psm.rt.map_or(false, |rt| rt != 0.0)) {
        available.insert(MsDataType::RetentionTime);
    }
    if psms
        .iter()
        .all(|psm| psm.ion_mobility.map_or(false, |im| im != 0.0))
    {
        available.insert(MsDataType::IonMobility);
    }
    if psms
        .iter()
        .all(|psm| psm.precursor_mz.map_or(false, |mz| mz != 0.0))
    {
        available.insert(MsDataType::PrecursorMz);
    }
    available
}

/// Fill in precursor values that are required but missing from the PSMs,
/// using the observed spectra. Returns the data types available afterwards
pub fn add_precursor_values(
    psms: &mut PsmCollection,
    required: &BTreeSet<MsDataType>,
    spectra: Option<&SpectrumIndex>,
) -> Result<BTreeSet<MsDataType>, Error> {
    let mut available = available_data(psms);
    if spectra.is_some() {
        available.insert(MsDataType::Ms2Spectra);
    }

    let missing = required.difference(&available).copied().collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(available);
    }
    log::debug!("missing precursor data: {:?}", missing);

    let spectra = spectra.ok_or_else(|| {
        Error::SpectrumParsing(format!(
            "Spectrum path must be provided to read missing precursor data ({:?})",
            missing
        ))
    })?;

    for psm in psms.iter_mut() {
        let spectrum = spectra.get(psm.spectrum_id()).ok_or_else(|| {
            Error::SpectrumParsing(format!(
                "spectrum `{}` of run `{}` not found in spectrum file",
                psm.spectrum_id(),
                psm.run()
            ))
        })?;
        for data in &missing {
            match data {
                MsDataType::RetentionTime => {
                    if let Some(rt) = spectrum.rt.filter(|rt| *rt != 0.0) {
                        psm.rt = Some(rt);
                    }
                }
                MsDataType::IonMobility => {
                    if let Some(im) = spectrum.ion_mobility.filter(|im| *im != 0.0) {
                        psm.ion_mobility = Some(im);
                    }
                }
                MsDataType::PrecursorMz => {
                    if let Some(mz) = spectrum.precursor_mz.filter(|mz| *mz != 0.0) {
                        psm.precursor_mz = Some(mz);
                    }
                }
                MsDataType::Ms2Spectra => {}
            }
        }
    }

    let mut available = available_data(psms);
    available.insert(MsDataType::Ms2Spectra);
    Ok(available)
}
