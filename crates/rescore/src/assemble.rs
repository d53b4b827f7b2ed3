//! Join native and generated features into a single dense matrix

use serde::{Deserialize, Serialize};

use crate::features::FeatureColumn;
use crate::ml::matrix::Matrix;
use crate::psm::{Psm, PsmCollection, PsmId};
use crate::Error;

/// Name of the column holding the oriented native score
pub const SEARCH_ENGINE_SCORE: &str = "search_engine_score";

/// How missing values are replaced
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Imputation {
    /// Median of the observed values
    #[default]
    Median,
    /// Mean of the observed values
    Mean,
    /// Drop any column with a missing value
    DropFeature,
}

#[derive(Clone, Debug)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    /// One row per PSM, in collection order
    pub features: Matrix,
    pub decoys: Vec<bool>,
    /// Oriented native score of each row, used to break ties
    pub seed: Vec<f64>,
    pub ids: Vec<PsmId>,
    /// Number of imputed values per surviving column
    pub imputed: Vec<(String, usize)>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> usize {
        self.features.rows
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

struct Candidate {
    name: String,
    values: Vec<Option<f64>>,
}

fn finite(value: f64) -> Option<f64> {
    Some(value).filter(|v| v.is_finite())
}

/// Oriented native scores, with non-finite values ranked below every finite one
fn seeds(psms: &PsmCollection) -> Vec<f64> {
    let scores = psms
        .iter()
        .map(|psm| finite(psms.oriented_score(psm)))
        .collect::<Vec<_>>();
    let floor = scores
        .iter()
        .flatten()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let floor = match floor.is_finite() {
        true => floor - 1.0,
        false => 0.0,
    };
    scores.into_iter().map(|s| s.unwrap_or(floor)).collect()
}

/// Native feature names, in order of first appearance
fn native_names(psms: &PsmCollection) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for psm in psms {
        for (name, _) in psm.features() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }
    names
}

fn candidates(psms: &PsmCollection, columns: &[FeatureColumn]) -> Result<Vec<Candidate>, Error> {
    let mut candidates = vec![Candidate {
        name: SEARCH_ENGINE_SCORE.into(),
        values: psms.iter().map(|psm| finite(psms.oriented_score(psm))).collect(),
    }];

    for name in native_names(psms) {
        if name == SEARCH_ENGINE_SCORE {
            return Err(duplicate(psms, name));
        }
        candidates.push(Candidate {
            name: name.into(),
            values: psms
                .iter()
                .map(|psm| psm.get(name).ok().and_then(finite))
                .collect(),
        });
    }

    for column in columns {
        if candidates.iter().any(|c| c.name == column.name) {
            return Err(duplicate(psms, &column.name));
        }
        candidates.push(Candidate {
            name: column.name.clone(),
            values: psms.iter().map(|psm| column.get(psm.id())).collect(),
        });
    }
    Ok(candidates)
}

fn duplicate(psms: &PsmCollection, name: &str) -> Error {
    let psm = psms
        .iter()
        .find(|psm| psm.get(name).is_ok())
        .or_else(|| psms.iter().next())
        .map(|psm| psm.id().to_string())
        .unwrap_or_default();
    Error::DuplicateFeature {
        feature: name.into(),
        psm,
    }
}

/// Replace missing values in place. Returns the number of imputed values, or
/// `None` if the column cannot be used
fn impute(candidate: &mut Candidate, imputation: Imputation) -> Option<usize> {
    let observed = candidate.values.iter().flatten().copied().collect::<Vec<_>>();
    if observed.is_empty() {
        log::debug!("dropping feature `{}`: no observed values", candidate.name);
        return None;
    }
    let (min, max) = observed
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), x| (lo.min(*x), hi.max(*x)));
    if max - min <= f64::EPSILON * max.abs().max(1.0) {
        log::debug!("dropping feature `{}`: no variance", candidate.name);
        return None;
    }

    let missing = candidate.values.len() - observed.len();
    if missing == 0 {
        return Some(0);
    }
    let fill = match imputation {
        Imputation::Median => crate::ml::median(&observed)?,
        Imputation::Mean => crate::ml::mean(&observed),
        Imputation::DropFeature => {
            log::debug!(
                "dropping feature `{}`: {} missing values",
                candidate.name,
                missing
            );
            return None;
        }
    };
    candidate
        .values
        .iter_mut()
        .filter(|v| v.is_none())
        .for_each(|v| *v = Some(fill));
    Some(missing)
}

/// Build the feature matrix for `psms`: the oriented native score, then native
/// features, then generated `columns`. Rows follow collection order exactly
pub fn assemble(
    psms: &PsmCollection,
    columns: &[FeatureColumn],
    imputation: Imputation,
) -> Result<FeatureMatrix, Error> {
    let mut names = Vec::new();
    let mut imputed = Vec::new();
    let mut kept = Vec::new();
    for mut candidate in candidates(psms, columns)? {
        if let Some(count) = impute(&mut candidate, imputation) {
            if count > 0 {
                log::debug!("imputed {} values of feature `{}`", count, candidate.name);
            }
            names.push(candidate.name.clone());
            imputed.push((candidate.name, count));
            kept.push(candidate.values);
        }
    }
    if kept.is_empty() {
        return Err(Error::EmptyMatrix);
    }

    let rows = psms.len();
    let cols = kept.len();
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        // Every kept value is defined after imputation
        data.extend(kept.iter().map(|col| col[row].unwrap_or_default()));
    }
    log::info!(
        "assembled feature matrix: {} PSMs x {} features",
        rows,
        cols
    );

    Ok(FeatureMatrix {
        names,
        features: Matrix::new(data, rows, cols),
        decoys: psms.iter().map(Psm::is_decoy).collect(),
        seed: seeds(psms),
        ids: psms.iter().map(|psm| psm.id().clone()).collect(),
        imputed,
    })
}
