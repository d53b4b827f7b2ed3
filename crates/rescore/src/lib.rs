pub mod assemble;
pub mod fdr;
pub mod features;
pub mod input;
pub mod ion_series;
pub mod mass;
pub mod mgf;
pub mod ml;
pub mod peptide;
pub mod pipeline;
pub mod predictor;
pub mod psm;
pub mod rescore;
pub mod spectrum;

pub use peptide::PeptideError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structurally invalid search engine output
    #[error("malformed {format} input: {reason}")]
    Format { format: &'static str, reason: String },
    /// A feature generator could not use its predictor at all
    #[error("feature generator `{generator}` unavailable: {reason}")]
    PredictorUnavailable { generator: String, reason: String },
    #[error("feature `{feature}` is already present for PSM {psm}")]
    DuplicateFeature { feature: String, psm: String },
    #[error("feature `{feature}` is missing for PSM {psm}")]
    MissingFeature { feature: String, psm: String },
    #[error("PSM identity {0} occurs more than once")]
    DuplicatePsm(String),
    #[error("no usable feature columns survived assembly")]
    EmptyMatrix,
    #[error("no decoy PSMs present, target-decoy FDR estimation is impossible")]
    NoDecoys,
    #[error("spectrum parsing failed: {0}")]
    SpectrumParsing(String),
    #[error("invalid peptide: {0}")]
    Peptide(#[from] PeptideError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn format<S: Into<String>>(format: &'static str, reason: S) -> Self {
        Error::Format {
            format,
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable<G: Into<String>, R: ToString>(generator: G, reason: R) -> Self {
        Error::PredictorUnavailable {
            generator: generator.into(),
            reason: reason.to_string(),
        }
    }
}
