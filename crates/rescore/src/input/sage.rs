//! Sage `results.sage.tsv`

use std::io::Read;
use std::path::Path;

use super::{
    is_decoy, parse_f64, parse_opt_f64, parse_score, tab_reader, Accumulator, Columns, FileFormat,
    Ingested, PsmReader, ReadOptions,
};
use crate::peptide::{parse_charge, Peptidoform};
use crate::psm::Psm;
use crate::Error;

const FORMAT: &str = "sage";

/// Default score column
pub const SCORE: &str = "sage_discriminant_score";

/// Sage columns carried over as native rescoring features. Everything else is
/// either an identity field, or a result of Sage's own FDR control
pub const NATIVE_FEATURES: [&str; 18] = [
    "expmass",
    "calcmass",
    "peptide_len",
    "missed_cleavages",
    "isotope_error",
    "precursor_ppm",
    "fragment_ppm",
    "hyperscore",
    "delta_next",
    "delta_best",
    "matched_peaks",
    "longest_b",
    "longest_y",
    "longest_y_pct",
    "matched_intensity_pct",
    "scored_candidates",
    "poisson",
    "ms2_intensity",
];

pub struct SageReader;

struct Layout {
    peptide: usize,
    proteins: usize,
    filename: usize,
    scannr: usize,
    rank: usize,
    label: usize,
    charge: usize,
    score: (usize, String),
    expmass: Option<usize>,
    rt: Option<usize>,
    ion_mobility: Option<usize>,
    features: Vec<(usize, &'static str)>,
}

impl Layout {
    fn new(columns: &Columns, options: &ReadOptions) -> Result<Self, Error> {
        let score = options.score_column.as_deref().unwrap_or(SCORE);
        let features = NATIVE_FEATURES
            .iter()
            .filter(|name| **name != score)
            .filter_map(|name| columns.get(name).map(|idx| (idx, *name)))
            .collect();
        Ok(Layout {
            peptide: columns.require("peptide")?,
            proteins: columns.require("proteins")?,
            filename: columns.require("filename")?,
            scannr: columns.require("scannr")?,
            rank: columns.require("rank")?,
            label: columns.require("label")?,
            charge: columns.require("charge")?,
            score: (columns.require(score)?, score.to_string()),
            expmass: columns.get("expmass"),
            rt: columns.get("rt"),
            ion_mobility: columns.get("ion_mobility"),
            features,
        })
    }

    fn parse(&self, record: &csv::StringRecord, options: &ReadOptions) -> Result<Psm, String> {
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or_default();

        let peptidoform = field(self.peptide)
            .parse::<Peptidoform>()
            .map_err(|e| e.to_string())?;
        let charge = parse_charge(field(self.charge))
            .ok_or_else(|| format!("invalid charge `{}`", field(self.charge)))?;
        let rank = field(self.rank)
            .parse::<u32>()
            .map_err(|_| format!("invalid rank `{}`", field(self.rank)))?;
        let label = match field(self.label) {
            "1" => true,
            "-1" => false,
            x => return Err(format!("invalid label `{x}`")),
        };
        let proteins = field(self.proteins)
            .split(';')
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        let decoy = is_decoy(Some(!label), &proteins, options.decoy_pattern.as_ref())
            .unwrap_or(!label);
        let score = parse_score(record, self.score.0, &self.score.1)?;

        let run = Path::new(field(self.filename))
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .or_else(|| options.run.clone())
            .unwrap_or_default();
        let mut psm =
            Psm::new(field(self.scannr), peptidoform, charge, rank, decoy, score).with_run(run);
        psm.proteins = proteins;
        psm.rt = parse_opt_f64(record, self.rt).map(|rt| rt as f32);
        psm.ion_mobility = parse_opt_f64(record, self.ion_mobility)
            .filter(|im| *im != 0.0)
            .map(|im| im as f32);
        // Sage reports the neutral experimental mass
        psm.precursor_mz = parse_opt_f64(record, self.expmass)
            .map(|mass| (mass + charge as f64 * crate::mass::PROTON as f64) / charge as f64);

        for &(idx, name) in &self.features {
            let value = parse_f64(record, idx, name)?;
            if value.is_finite() {
                psm.add_feature(name, value).map_err(|e| e.to_string())?;
            }
        }
        Ok(psm)
    }
}

impl PsmReader for SageReader {
    fn format(&self) -> FileFormat {
        FileFormat::Sage
    }

    fn read(&self, source: &mut dyn Read, options: &ReadOptions) -> Result<Ingested, Error> {
        let mut rdr = tab_reader(source);
        let columns = Columns::new(FORMAT, rdr.headers()?)?;
        let layout = Layout::new(&columns, options)?;

        let mut acc = Accumulator::new(FORMAT, options);
        for (line, record) in rdr.records().enumerate() {
            let row = record
                .map_err(|e| e.to_string())
                .and_then(|record| layout.parse(&record, options));
            acc.push(line + 2, row);
        }
        acc.finish()
    }
}
