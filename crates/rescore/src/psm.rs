use std::fmt::Display;

use fnv::FnvHashMap;
use serde::Serialize;

use crate::peptide::Peptidoform;
use crate::Error;

/// Identity of a PSM
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PsmId {
    pub spectrum_id: String,
    /// Canonical peptidoform string
    pub peptide: String,
    pub charge: u8,
    pub rank: u32,
    /// Spectrum ids are only unique within a run
    pub run: String,
}

impl Display for PsmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}/{}",
            self.run, self.spectrum_id, self.peptide, self.charge, self.rank
        )
    }
}

/// Outputs of the rescoring engine, attached once per PSM
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Rescored {
    pub score: f64,
    pub q_value: f64,
    pub peptide_q: f64,
    pub posterior_error: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct Psm {
    id: PsmId,
    decoy: bool,
    peptidoform: Peptidoform,
    pub proteins: Vec<String>,
    /// Observed retention time, in minutes
    pub rt: Option<f32>,
    pub ion_mobility: Option<f32>,
    pub precursor_mz: Option<f64>,
    /// Native search engine score, as reported
    pub score: f64,
    features: Vec<(String, f64)>,
    rescored: Option<Rescored>,
}

impl Psm {
    pub fn new<S: Into<String>>(
        spectrum_id: S,
        peptidoform: Peptidoform,
        charge: u8,
        rank: u32,
        decoy: bool,
        score: f64,
    ) -> Self {
        let id = PsmId {
            spectrum_id: spectrum_id.into(),
            peptide: peptidoform.to_string(),
            charge,
            rank,
            run: String::new(),
        };
        Psm {
            id,
            decoy,
            peptidoform,
            proteins: Vec::new(),
            rt: None,
            ion_mobility: None,
            precursor_mz: None,
            score,
            features: Vec::new(),
            rescored: None,
        }
    }

    /// Assign the PSM to `run`, which is part of its identity
    pub fn with_run<S: Into<String>>(mut self, run: S) -> Self {
        self.id.run = run.into();
        self
    }

    pub fn id(&self) -> &PsmId {
        &self.id
    }

    pub fn peptidoform(&self) -> &Peptidoform {
        &self.peptidoform
    }

    pub fn run(&self) -> &str {
        &self.id.run
    }

    pub fn spectrum_id(&self) -> &str {
        &self.id.spectrum_id
    }

    /// Canonical peptidoform string
    pub fn peptide(&self) -> &str {
        &self.id.peptide
    }

    pub fn charge(&self) -> u8 {
        self.id.charge
    }

    pub fn rank(&self) -> u32 {
        self.id.rank
    }

    pub fn is_decoy(&self) -> bool {
        self.decoy
    }

    pub fn add_feature<S: Into<String>>(&mut self, name: S, value: f64) -> Result<(), Error> {
        let name = name.into();
        if self.features.iter().any(|(n, _)| *n == name) {
            return Err(Error::DuplicateFeature {
                feature: name,
                psm: self.id.to_string(),
            });
        }
        self.features.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<f64, Error> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| Error::MissingFeature {
                feature: name.into(),
                psm: self.id.to_string(),
            })
    }

    /// Features in insertion order
    pub fn features(&self) -> &[(String, f64)] {
        &self.features
    }

    pub fn rescored(&self) -> Option<&Rescored> {
        self.rescored.as_ref()
    }

    /// Attach rescoring outputs. Returns `false` if outputs were already
    /// attached, in which case they are left untouched
    pub(crate) fn attach(&mut self, rescored: Rescored) -> bool {
        if self.rescored.is_some() {
            return false;
        }
        self.rescored = Some(rescored);
        true
    }
}

/// PSMs in search engine output order, unique by identity
#[derive(Clone, Debug, Default)]
pub struct PsmCollection {
    psms: Vec<Psm>,
    index: FnvHashMap<PsmId, usize>,
    lower_score_is_better: bool,
}

impl PsmCollection {
    pub fn new(psms: Vec<Psm>, lower_score_is_better: bool) -> Result<Self, Error> {
        let mut collection = PsmCollection {
            psms: Vec::with_capacity(psms.len()),
            index: FnvHashMap::default(),
            lower_score_is_better,
        };
        for psm in psms {
            collection.push(psm)?;
        }
        Ok(collection)
    }

    pub fn empty(lower_score_is_better: bool) -> Self {
        PsmCollection {
            lower_score_is_better,
            ..Default::default()
        }
    }

    /// Append a PSM, failing if its identity is already present
    pub fn push(&mut self, psm: Psm) -> Result<(), Error> {
        if self.index.contains_key(psm.id()) {
            return Err(Error::DuplicatePsm(psm.id().to_string()));
        }
        self.index.insert(psm.id().clone(), self.psms.len());
        self.psms.push(psm);
        Ok(())
    }

    pub fn index_of(&self, id: &PsmId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &PsmId) -> Option<&Psm> {
        self.index_of(id).map(|idx| &self.psms[idx])
    }

    pub fn get_mut(&mut self, id: &PsmId) -> Option<&mut Psm> {
        let idx = self.index_of(id)?;
        self.psms.get_mut(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Psm> {
        self.psms.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Psm> {
        self.psms.iter_mut()
    }

    pub fn as_slice(&self) -> &[Psm] {
        &self.psms
    }

    pub fn len(&self) -> usize {
        self.psms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psms.is_empty()
    }

    pub fn decoys(&self) -> usize {
        self.psms.iter().filter(|psm| psm.is_decoy()).count()
    }

    pub fn targets(&self) -> usize {
        self.len() - self.decoys()
    }

    pub fn lower_score_is_better(&self) -> bool {
        self.lower_score_is_better
    }

    /// Native score oriented so that higher is better
    pub fn oriented_score(&self, psm: &Psm) -> f64 {
        match self.lower_score_is_better {
            true => -psm.score,
            false => psm.score,
        }
    }

    /// Runs present in the collection, in order of first appearance
    pub fn runs(&self) -> Vec<&str> {
        let mut runs: Vec<&str> = Vec::new();
        for psm in &self.psms {
            if !runs.contains(&psm.run()) {
                runs.push(psm.run());
            }
        }
        runs
    }

    /// Partition into one collection per run, in order of first appearance
    pub fn split_by_run(self) -> Vec<(String, PsmCollection)> {
        let mut split: Vec<(String, PsmCollection)> = Vec::new();
        for psm in self.psms {
            let idx = match split.iter().position(|(run, _)| run == psm.run()) {
                Some(idx) => idx,
                None => {
                    split.push((
                        psm.run().to_string(),
                        PsmCollection::empty(self.lower_score_is_better),
                    ));
                    split.len() - 1
                }
            };
            let collection = &mut split[idx].1;
            collection.index.insert(psm.id().clone(), collection.psms.len());
            collection.psms.push(psm);
        }
        split
    }

    /// Drop PSMs ranked worse than `max_rank`, returning how many were removed
    pub fn retain_rank(&mut self, max_rank: u32) -> usize {
        let before = self.psms.len();
        self.psms.retain(|psm| psm.rank() <= max_rank);
        self.index = self
            .psms
            .iter()
            .enumerate()
            .map(|(idx, psm)| (psm.id().clone(), idx))
            .collect();
        before - self.psms.len()
    }
}

impl<'a> IntoIterator for &'a PsmCollection {
    type Item = &'a Psm;
    type IntoIter = std::slice::Iter<'a, Psm>;

    fn into_iter(self) -> Self::IntoIter {
        self.psms.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn psm(spectrum: &str, peptide: &str, rank: u32, decoy: bool) -> Psm {
        Psm::new(spectrum, peptide.parse().unwrap(), 2, rank, decoy, 10.0)
    }

    #[test]
    fn features_are_unique_per_psm() {
        let mut psm = psm("scan=1", "PEPTIDE", 1, false);
        psm.add_feature("hyperscore", 30.0).unwrap();
        psm.add_feature("delta_next", 2.0).unwrap();
        assert!(matches!(
            psm.add_feature("hyperscore", 31.0),
            Err(Error::DuplicateFeature { .. })
        ));
        assert_eq!(psm.get("hyperscore").unwrap(), 30.0);
        assert!(matches!(
            psm.get("poisson"),
            Err(Error::MissingFeature { .. })
        ));
        assert_eq!(psm.features()[1].0, "delta_next");
    }

    #[test]
    fn identity_uses_canonical_peptide() {
        let a = psm("scan=1", "PEM[Oxidation]TIDE", 1, false);
        let b = psm("scan=1", "PEM[+15.9949]TIDE", 1, false);
        assert_eq!(a.id(), b.id());
        assert!(matches!(
            PsmCollection::new(vec![a, b], false),
            Err(Error::DuplicatePsm(_))
        ));
    }

    #[test]
    fn collection_index() {
        let psms = vec![
            psm("scan=1", "PEPTIDE", 1, false),
            psm("scan=1", "PEPTIDE", 2, true),
            psm("scan=2", "EDITPEP", 1, true),
        ];
        let mut collection = PsmCollection::new(psms, true).unwrap();
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.decoys(), 2);
        assert_eq!(collection.targets(), 1);

        let id = collection.as_slice()[2].id().clone();
        assert_eq!(collection.index_of(&id), Some(2));
        assert_eq!(collection.oriented_score(&collection.as_slice()[0]), -10.0);

        assert_eq!(collection.retain_rank(1), 1);
        assert_eq!(collection.index_of(&id), Some(1));
        assert!(collection.iter().all(|psm| psm.rank() == 1));
    }

    #[test]
    fn runs_are_part_of_identity() {
        let psms = vec![
            psm("scan=1", "PEPTIDEK", 1, false).with_run("runA"),
            psm("scan=2", "PEPTIDEK", 1, true).with_run("runA"),
            psm("scan=1", "PEPTIDEK", 1, false).with_run("runB"),
        ];
        let collection = PsmCollection::new(psms, false).unwrap();
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.runs(), vec!["runA", "runB"]);
        assert_eq!(collection.as_slice()[2].run(), "runB");

        let split = collection.split_by_run();
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].0, "runA");
        assert_eq!(split[0].1.len(), 2);
        assert_eq!(split[1].1.len(), 1);
        let id = split[1].1.as_slice()[0].id().clone();
        assert_eq!(split[1].1.index_of(&id), Some(0));
        assert_eq!(split[1].1.get(&id).unwrap().peptidoform().len(), 8);
    }

    #[test]
    fn rescored_attached_once() {
        let mut psm = psm("scan=1", "PEPTIDE", 1, false);
        let first = Rescored {
            score: 1.0,
            q_value: 0.01,
            peptide_q: 0.01,
            posterior_error: None,
        };
        assert!(psm.attach(first));
        assert!(!psm.attach(Rescored { score: 2.0, ..first }));
        assert_eq!(psm.rescored().unwrap().score, 1.0);
    }
}
