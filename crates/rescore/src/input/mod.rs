//! Ingestion of search engine output
//!
//! Every supported format is read by a [`PsmReader`], which normalizes PSM
//! identity, decoy status, charge and modification notation into a
//! [`PsmCollection`]. Rows that cannot be parsed, or that duplicate an
//! existing identity, are skipped and counted rather than failing the run.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use fnv::FnvHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::psm::{Psm, PsmCollection};
use crate::Error;

pub mod pin;
pub mod sage;
pub mod tsv;

/// Decoy protein prefixes recognized when a format carries no explicit label
pub const DEFAULT_DECOY_PATTERN: &str = "^(?:DECOY_|rev_)";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Sage,
    Percolator,
    Tsv,
}

impl FileFormat {
    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::Sage => "sage",
            FileFormat::Percolator => "percolator",
            FileFormat::Tsv => "tsv",
        }
    }

    pub fn reader(&self) -> Box<dyn PsmReader> {
        match self {
            FileFormat::Sage => Box::new(sage::SageReader),
            FileFormat::Percolator => Box::new(pin::PinReader),
            FileFormat::Tsv => Box::new(tsv::TsvReader),
        }
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sage" => Ok(FileFormat::Sage),
            "pin" | "percolator" => Ok(FileFormat::Percolator),
            "tsv" | "psm_utils" => Ok(FileFormat::Tsv),
            other => Err(Error::format("input", format!("unknown PSM file format `{other}`"))),
        }
    }
}

/// Infer the file format from the header line of a tab separated file
pub fn infer_format(header: &str) -> Option<FileFormat> {
    let columns = header
        .trim_end()
        .split('\t')
        .map(|c| c.trim())
        .collect::<Vec<_>>();
    let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
    if has("scannr") && has("label") && has("peptide") {
        Some(FileFormat::Sage)
    } else if has("specid") && has("label") && has("peptide") {
        Some(FileFormat::Percolator)
    } else if has("spectrum_id") && has("peptidoform") {
        Some(FileFormat::Tsv)
    } else {
        None
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Protein accession pattern marking decoys. When set, it overrides any
    /// label present in the file: a PSM is a decoy iff all of its proteins
    /// match
    pub decoy_pattern: Option<Regex>,
    /// Column holding the native search engine score
    pub score_column: Option<String>,
    pub lower_score_is_better: bool,
    /// PSMs ranked worse than this are filtered out
    pub max_rank: Option<u32>,
    /// Run name for formats that do not carry one per row
    pub run: Option<String>,
}

/// Result of reading one PSM file
#[derive(Debug)]
pub struct Ingested {
    pub psms: PsmCollection,
    /// Rows that could not be parsed or duplicated an identity
    pub skipped: usize,
    /// Rows removed by `max_rank`
    pub filtered: usize,
}

pub trait PsmReader: Send + Sync {
    fn format(&self) -> FileFormat;
    fn read(&self, source: &mut dyn Read, options: &ReadOptions) -> Result<Ingested, Error>;
}

/// Read a PSM file from disk, inferring the format from its header if none
/// is given. The file stem is used as run name where rows carry none
pub fn read_path<P: AsRef<Path>>(
    path: P,
    format: Option<FileFormat>,
    options: &ReadOptions,
) -> Result<Ingested, Error> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);

    let format = match format {
        Some(format) => format,
        None => {
            let header = {
                let buf = reader.fill_buf()?;
                let end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
                String::from_utf8_lossy(&buf[..end]).into_owned()
            };
            infer_format(&header).ok_or_else(|| {
                Error::format(
                    "input",
                    format!("could not infer PSM file format of {}", path.display()),
                )
            })?
        }
    };

    let mut options = options.clone();
    if options.run.is_none() {
        options.run = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }

    log::trace!("reading {} as {} PSMs", path.display(), format.name());
    format.reader().read(&mut reader, &options)
}

/// Column name -> index lookup for a header record
pub(crate) struct Columns {
    format: &'static str,
    map: FnvHashMap<String, usize>,
    names: Vec<String>,
}

impl Columns {
    pub fn new(format: &'static str, header: &csv::StringRecord) -> Result<Self, Error> {
        if header.is_empty() || header.iter().all(|h| h.trim().is_empty()) {
            return Err(Error::format(format, "missing header line"));
        }
        let names = header.iter().map(|h| h.trim().to_string()).collect::<Vec<_>>();
        let map = names
            .iter()
            .enumerate()
            .rev()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Ok(Columns { format, map, names })
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.map.get(name).copied()
    }

    /// Case-insensitive lookup
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn require(&self, name: &str) -> Result<usize, Error> {
        self.get(name)
            .ok_or_else(|| Error::format(self.format, format!("missing required column `{name}`")))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Decide whether a PSM is a decoy. A configured pattern takes precedence
/// over an explicit label
pub(crate) fn is_decoy(label: Option<bool>, proteins: &[String], pattern: Option<&Regex>) -> Option<bool> {
    match (pattern, label) {
        (Some(re), _) => Some(!proteins.is_empty() && proteins.iter().all(|p| re.is_match(p))),
        (None, label) => label,
    }
}

pub(crate) fn parse_f64(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let field = record.get(idx).map(str::trim).unwrap_or_default();
    field
        .parse::<f64>()
        .map_err(|_| format!("column `{name}`: `{field}` is not a number"))
}

/// Parse the native score, which must be a finite number
pub(crate) fn parse_score(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let score = parse_f64(record, idx, name)?;
    match score.is_finite() {
        true => Ok(score),
        false => Err(format!("column `{name}`: score `{score}` is not finite")),
    }
}

/// Parse an optional numeric field; empty, `NA`, and non-finite values are
/// treated as absent
pub(crate) fn parse_opt_f64(record: &csv::StringRecord, idx: Option<usize>) -> Option<f64> {
    let field = record.get(idx?)?.trim();
    field.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Accumulates parsed rows into a collection, counting skipped rows
pub(crate) struct Accumulator<'a> {
    format: &'static str,
    options: &'a ReadOptions,
    psms: PsmCollection,
    skipped: usize,
    filtered: usize,
}

impl<'a> Accumulator<'a> {
    pub fn new(format: &'static str, options: &'a ReadOptions) -> Self {
        Accumulator {
            format,
            options,
            psms: PsmCollection::empty(options.lower_score_is_better),
            skipped: 0,
            filtered: 0,
        }
    }

    pub fn push(&mut self, line: usize, row: Result<Psm, String>) {
        match row {
            Ok(psm) => {
                if matches!(self.options.max_rank, Some(max) if psm.rank() > max) {
                    self.filtered += 1;
                    return;
                }
                if let Err(e) = self.psms.push(psm) {
                    log::debug!("{} line {}: {}", self.format, line, e);
                    self.skipped += 1;
                }
            }
            Err(reason) => {
                log::debug!("{} line {}: {}", self.format, line, reason);
                self.skipped += 1;
            }
        }
    }

    pub fn finish(self) -> Result<Ingested, Error> {
        if self.psms.is_empty() && self.filtered == 0 {
            return Err(Error::format(
                self.format,
                format!("no parsable PSM rows ({} rows skipped)", self.skipped),
            ));
        }
        if self.skipped > 0 {
            log::warn!(
                "{}: skipped {} malformed or duplicate PSM rows",
                self.format,
                self.skipped
            );
        }
        if self.filtered > 0 {
            log::warn!(
                "{}: filtered {} PSMs ranked worse than {}",
                self.format,
                self.filtered,
                self.options.max_rank.unwrap_or_default()
            );
        }
        Ok(Ingested {
            psms: self.psms,
            skipped: self.skipped,
            filtered: self.filtered,
        })
    }
}

pub(crate) fn tab_reader(source: &mut dyn Read) -> csv::Reader<&mut dyn Read> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(source)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_names() {
        assert_eq!("sage".parse::<FileFormat>().unwrap(), FileFormat::Sage);
        assert_eq!("PIN".parse::<FileFormat>().unwrap(), FileFormat::Percolator);
        assert_eq!("percolator".parse::<FileFormat>().unwrap(), FileFormat::Percolator);
        assert_eq!("tsv".parse::<FileFormat>().unwrap(), FileFormat::Tsv);
        assert!(matches!(
            "mzid".parse::<FileFormat>(),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn format_inference() {
        assert_eq!(
            infer_format("psm_id\tpeptide\tproteins\tfilename\tscannr\trank\tlabel"),
            Some(FileFormat::Sage)
        );
        assert_eq!(
            infer_format("SpecId\tLabel\tScanNr\tExpMass\tPeptide\tProteins\n"),
            Some(FileFormat::Percolator)
        );
        assert_eq!(
            infer_format("peptidoform\tspectrum_id\trun\tis_decoy"),
            Some(FileFormat::Tsv)
        );
        assert_eq!(infer_format("a,b,c"), None);
    }

    #[test]
    fn decoy_pattern_overrides_label() {
        let re = Regex::new(DEFAULT_DECOY_PATTERN).unwrap();
        let decoy = vec!["rev_P12345".to_string(), "DECOY_Q99999".to_string()];
        let shared = vec!["rev_P12345".to_string(), "P67890".to_string()];
        assert_eq!(is_decoy(Some(false), &decoy, Some(&re)), Some(true));
        assert_eq!(is_decoy(Some(true), &shared, Some(&re)), Some(false));
        assert_eq!(is_decoy(Some(true), &shared, None), Some(true));
        assert_eq!(is_decoy(None, &[], None), None);
    }
}
