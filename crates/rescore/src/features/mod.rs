//! Feature generators
//!
//! A generator derives one or more named columns from a [`PsmCollection`].
//! Generators never modify the collection: their output is joined onto the
//! feature matrix by PSM identity during assembly.

use fnv::FnvHashMap;

use crate::psm::{Psm, PsmCollection, PsmId};
use crate::Error;

pub mod basic;
pub mod intensity;
pub mod property;

pub use basic::BasicFeatures;
pub use intensity::IntensityFeatures;
pub use property::{Property, PropertyFeatures, PropertySource};

/// A named feature, with values keyed by PSM identity.
///
/// A PSM absent from `values` is not supported by the generator; `None`
/// marks a supported PSM whose value could not be computed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub values: FnvHashMap<PsmId, Option<f64>>,
}

impl FeatureColumn {
    pub fn new<S: Into<String>>(name: S) -> Self {
        FeatureColumn {
            name: name.into(),
            values: FnvHashMap::default(),
        }
    }

    /// Record a value; non-finite values are stored as missing
    pub fn insert(&mut self, id: &PsmId, value: Option<f64>) {
        self.values
            .insert(id.clone(), value.filter(|v| v.is_finite()));
    }

    pub fn get(&self, id: &PsmId) -> Option<f64> {
        self.values.get(id).copied().flatten()
    }

    /// Number of PSMs carrying an actual value
    pub fn observed(&self) -> usize {
        self.values.values().filter(|v| v.is_some()).count()
    }
}

pub trait FeatureGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this generator can produce values for `psm`
    fn supports(&self, psm: &Psm) -> bool;

    /// Produce feature columns for the supported PSMs of `psms`. Must not
    /// depend on anything but the collection and the generator's own settings
    fn generate(&self, psms: &PsmCollection) -> Result<Vec<FeatureColumn>, Error>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn non_finite_values_are_missing() {
        let id = PsmId {
            spectrum_id: "1".into(),
            peptide: "PEPTIDE".into(),
            charge: 2,
            rank: 1,
            run: "run1".into(),
        };
        let mut col = FeatureColumn::new("x");
        col.insert(&id, Some(f64::NAN));
        assert_eq!(col.values.get(&id), Some(&None));
        assert_eq!(col.observed(), 0);

        col.insert(&id, Some(1.5));
        assert_eq!(col.get(&id), Some(1.5));
        assert_eq!(col.observed(), 1);
    }
}
