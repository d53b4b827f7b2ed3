//! Generic PSM TSV, as written by psm_utils
//!
//! Charge is carried as a ProForma suffix of the peptidoform (`PEPTIDE/2`),
//! and engine features as `rescoring:<name>` columns.

use std::io::Read;

use regex::Regex;

use super::{
    is_decoy, parse_opt_f64, parse_score, tab_reader, Accumulator, Columns, FileFormat,
    Ingested, PsmReader, ReadOptions, DEFAULT_DECOY_PATTERN,
};
use crate::peptide::{parse_charge, Peptidoform};
use crate::psm::Psm;
use crate::Error;

const FORMAT: &str = "tsv";

const FEATURE_PREFIX: &str = "rescoring:";

pub struct TsvReader;

struct Layout {
    spectrum_id: usize,
    peptidoform: usize,
    charge: Option<usize>,
    is_decoy: Option<usize>,
    score: (usize, String),
    proteins: Option<usize>,
    rank: Option<usize>,
    run: Option<usize>,
    rt: Option<usize>,
    ion_mobility: Option<usize>,
    precursor_mz: Option<usize>,
    features: Vec<(usize, String)>,
}

/// Parse a protein list written either as a Python list repr
/// (`['P1', 'P2']`) or separated by semicolons
fn parse_proteins(s: &str) -> Vec<String> {
    let s = s.trim();
    let inner = s
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'));
    let (items, sep) = match inner {
        Some(inner) => (inner, ','),
        None => (s, ';'),
    };
    items
        .split(sep)
        .map(|p| p.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

impl Layout {
    fn new(columns: &Columns, options: &ReadOptions) -> Result<Self, Error> {
        let score = options.score_column.as_deref().unwrap_or("score");
        let features = columns
            .names()
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                name.strip_prefix(FEATURE_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (idx, name.to_string()))
            })
            .collect();
        Ok(Layout {
            spectrum_id: columns.require("spectrum_id")?,
            peptidoform: columns.require("peptidoform")?,
            charge: columns.get("precursor_charge").or_else(|| columns.get("charge")),
            is_decoy: columns.get("is_decoy"),
            score: (columns.require(score)?, score.to_string()),
            proteins: columns.get("protein_list"),
            rank: columns.get("rank"),
            run: columns.get("run"),
            rt: columns.get("retention_time"),
            ion_mobility: columns.get("ion_mobility"),
            precursor_mz: columns.get("precursor_mz"),
            features,
        })
    }

    fn parse(
        &self,
        record: &csv::StringRecord,
        options: &ReadOptions,
        fallback: &Regex,
    ) -> Result<Psm, String> {
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or_default();

        let (peptidoform, suffix_charge) =
            Peptidoform::parse(field(self.peptidoform)).map_err(|e| e.to_string())?;
        let charge = suffix_charge
            .or_else(|| self.charge.and_then(|idx| parse_charge(field(idx))))
            .ok_or_else(|| "no charge state".to_string())?;
        let rank = match self.rank.map(field).filter(|r| !r.is_empty()) {
            Some(r) => r.parse::<u32>().map_err(|_| format!("invalid rank `{r}`"))?,
            None => 1,
        };
        let proteins = self.proteins.map(|idx| parse_proteins(field(idx))).unwrap_or_default();

        let label = match self.is_decoy.map(field).filter(|d| !d.is_empty()) {
            Some(d) => Some(parse_bool(d).ok_or_else(|| format!("invalid is_decoy `{d}`"))?),
            None => None,
        };
        let decoy = match is_decoy(label, &proteins, options.decoy_pattern.as_ref()) {
            Some(decoy) => decoy,
            None => is_decoy(None, &proteins, Some(fallback)).unwrap_or_default(),
        };
        let score = parse_score(record, self.score.0, &self.score.1)?;

        let run = self
            .run
            .map(field)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .or_else(|| options.run.clone())
            .unwrap_or_default();
        let mut psm = Psm::new(field(self.spectrum_id), peptidoform, charge, rank, decoy, score)
            .with_run(run);
        psm.proteins = proteins;
        psm.rt = parse_opt_f64(record, self.rt).map(|rt| rt as f32);
        psm.ion_mobility = parse_opt_f64(record, self.ion_mobility)
            .filter(|im| *im != 0.0)
            .map(|im| im as f32);
        psm.precursor_mz = parse_opt_f64(record, self.precursor_mz).filter(|mz| *mz != 0.0);

        for (idx, name) in &self.features {
            // Missing feature values are left for imputation
            if let Some(value) = parse_opt_f64(record, Some(*idx)) {
                psm.add_feature(name.as_str(), value)
                    .map_err(|e| e.to_string())?;
            }
        }
        Ok(psm)
    }
}

impl PsmReader for TsvReader {
    fn format(&self) -> FileFormat {
        FileFormat::Tsv
    }

    fn read(&self, source: &mut dyn Read, options: &ReadOptions) -> Result<Ingested, Error> {
        let fallback = Regex::new(DEFAULT_DECOY_PATTERN)
            .map_err(|e| Error::format(FORMAT, e.to_string()))?;
        let mut rdr = tab_reader(source);
        let columns = Columns::new(FORMAT, rdr.headers()?)?;
        let layout = Layout::new(&columns, options)?;

        let mut acc = Accumulator::new(FORMAT, options);
        for (line, record) in rdr.records().enumerate() {
            let row = record
                .map_err(|e| e.to_string())
                .and_then(|record| layout.parse(&record, options, &fallback));
            acc.push(line + 2, row);
        }
        acc.finish()
    }
}
