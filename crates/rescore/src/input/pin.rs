//! Percolator input (`.pin`) files
//!
//! Tab separated, with a fixed set of identity columns, any number of feature
//! columns, and the protein accessions as trailing fields of each row. The
//! second line may hold the `DefaultDirection` pseudo-row.

use std::io::Read;

use super::{
    is_decoy, parse_f64, parse_opt_f64, parse_score, tab_reader, Accumulator, Columns, FileFormat,
    Ingested, PsmReader, ReadOptions,
};
use crate::peptide::{parse_charge, Peptidoform};
use crate::psm::Psm;
use crate::Error;

const FORMAT: &str = "percolator";

/// Score columns tried, in order, when none is configured
const SCORE_CANDIDATES: [&str; 4] = ["score", "hyperscore", "lnExpect", "XCorr"];

/// Columns never used as features
const RESERVED: [&str; 12] = [
    "SpecId",
    "Label",
    "ScanNr",
    "ExpMass",
    "CalcMass",
    "Peptide",
    "Proteins",
    "rt",
    "retentiontime",
    "rank",
    "charge",
    "ion_mobility",
];

pub struct PinReader;

struct Layout {
    spec_id: usize,
    label: usize,
    peptide: usize,
    rank: Option<usize>,
    charge: Option<usize>,
    /// One-hot `ChargeN` columns
    charge_columns: Vec<(usize, u8)>,
    score: (usize, String),
    expmass: Option<usize>,
    rt: Option<usize>,
    ion_mobility: Option<usize>,
    features: Vec<(usize, String)>,
}

/// Parse `Charge3` or `charge3` into 3
fn one_hot_charge(name: &str) -> Option<u8> {
    let digits = name
        .strip_prefix("Charge")
        .or_else(|| name.strip_prefix("charge"))?;
    digits.parse::<u8>().ok()
}

impl Layout {
    fn new(columns: &Columns, options: &ReadOptions) -> Result<Self, Error> {
        let score = match &options.score_column {
            Some(score) => (columns.require(score)?, score.clone()),
            None => SCORE_CANDIDATES
                .iter()
                .find_map(|name| columns.find(name).map(|idx| (idx, columns.names()[idx].clone())))
                .ok_or_else(|| {
                    Error::format(
                        FORMAT,
                        format!("no score column found, tried {}", SCORE_CANDIDATES.join(", ")),
                    )
                })?,
        };

        let peptide = columns.require("Peptide")?;
        let charge_columns = columns
            .names()
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| one_hot_charge(name).map(|z| (idx, z)))
            .collect::<Vec<_>>();

        // Feature columns sit between the identity columns and `Peptide`
        let features = columns.names()[..peptide]
            .iter()
            .enumerate()
            .filter(|(idx, name)| {
                *idx != score.0
                    && one_hot_charge(name).is_none()
                    && !RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
            })
            .map(|(idx, name)| (idx, name.clone()))
            .collect();

        Ok(Layout {
            spec_id: columns.require("SpecId")?,
            label: columns.require("Label")?,
            peptide,
            rank: columns.find("rank"),
            charge: columns.find("charge"),
            charge_columns,
            score,
            expmass: columns.get("ExpMass"),
            rt: columns.find("rt").or_else(|| columns.find("retentiontime")),
            ion_mobility: columns.find("ion_mobility"),
            features,
        })
    }

    fn parse(&self, record: &csv::StringRecord, options: &ReadOptions) -> Result<Psm, String> {
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or_default();

        let decoy_label = match field(self.label) {
            "1" => false,
            "-1" => true,
            x => return Err(format!("invalid label `{x}`")),
        };

        let (peptidoform, suffix_charge) =
            Peptidoform::parse(field(self.peptide)).map_err(|e| e.to_string())?;
        let charge = self
            .charge
            .and_then(|idx| parse_charge(field(idx)))
            .or_else(|| {
                self.charge_columns
                    .iter()
                    .find(|(idx, _)| field(*idx) == "1")
                    .map(|(_, z)| *z)
            })
            .or(suffix_charge)
            .ok_or_else(|| "no charge state".to_string())?;
        let rank = match self.rank {
            Some(idx) => field(idx)
                .parse::<u32>()
                .map_err(|_| format!("invalid rank `{}`", field(idx)))?,
            None => 1,
        };

        let proteins = record
            .iter()
            .skip(self.peptide + 1)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        let decoy = is_decoy(Some(decoy_label), &proteins, options.decoy_pattern.as_ref())
            .unwrap_or(decoy_label);
        let score = parse_score(record, self.score.0, &self.score.1)?;

        let mut psm = Psm::new(field(self.spec_id), peptidoform, charge, rank, decoy, score)
            .with_run(options.run.clone().unwrap_or_default());
        psm.proteins = proteins;
        psm.rt = parse_opt_f64(record, self.rt).map(|rt| rt as f32);
        psm.ion_mobility = parse_opt_f64(record, self.ion_mobility)
            .filter(|im| *im != 0.0)
            .map(|im| im as f32);
        psm.precursor_mz = parse_opt_f64(record, self.expmass)
            .map(|mass| (mass + charge as f64 * crate::mass::PROTON as f64) / charge as f64);

        for (idx, name) in &self.features {
            let value = parse_f64(record, *idx, name)?;
            if value.is_finite() {
                psm.add_feature(name.as_str(), value)
                    .map_err(|e| e.to_string())?;
            }
        }
        Ok(psm)
    }
}

impl PsmReader for PinReader {
    fn format(&self) -> FileFormat {
        FileFormat::Percolator
    }

    fn read(&self, source: &mut dyn Read, options: &ReadOptions) -> Result<Ingested, Error> {
        let mut rdr = tab_reader(source);
        let columns = Columns::new(FORMAT, rdr.headers()?)?;
        let layout = Layout::new(&columns, options)?;

        let mut acc = Accumulator::new(FORMAT, options);
        for (line, record) in rdr.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    acc.push(line + 2, Err(e.to_string()));
                    continue;
                }
            };
            if record
                .get(0)
                .map_or(false, |f| f.eq_ignore_ascii_case("DefaultDirection"))
            {
                continue;
            }
            acc.push(line + 2, layout.parse(&record, options));
        }
        acc.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PIN: &str = "SpecId\tLabel\tScanNr\tExpMass\tCalcMass\tlnExpect\tdeltaLCn\tCharge2\tCharge3\tPeptide\tProteins
DefaultDirection\t-\t-\t-\t-\t1\t0.5\t0\t0\t-\t-
target_0_1_2_1\t1\t1\t799.36\t799.36\t12.5\t0.3\t1\t0\tK.PEPTIDE.R\tsp|P1|A\tsp|P2|B
decoy_0_2_3_1\t-1\t2\t799.36\t799.36\t2.5\t0.1\t0\t1\tR.EDITPEP.K\trev_sp|P1|A
target_0_3_2_1\t1\t3\t799.36\t799.36\tnan-ish\t0.1\t1\t0\tK.PEPTIDE.R\tsp|P1|A
";

    #[test]
    fn read_pin() {
        let options = ReadOptions {
            run: Some("run1".into()),
            ..Default::default()
        };
        let ingested = PinReader.read(&mut PIN.as_bytes(), &options).unwrap();
        assert_eq!(ingested.skipped, 1);

        let psms = ingested.psms;
        assert_eq!(psms.len(), 2);
        let target = &psms.as_slice()[0];
        assert_eq!(target.spectrum_id(), "target_0_1_2_1");
        assert_eq!(target.peptide(), "PEPTIDE");
        assert_eq!(target.charge(), 2);
        assert_eq!(target.rank(), 1);
        assert_eq!(target.run(), "run1");
        assert_eq!(target.proteins, vec!["sp|P1|A", "sp|P2|B"]);
        assert_eq!(target.score, 12.5);
        assert!(!target.is_decoy());

        // Only non-reserved, non-score columns become features
        let names = target
            .features()
            .iter()
            .map(|(n, _)| n.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["deltaLCn"]);

        let decoy = &psms.as_slice()[1];
        assert!(decoy.is_decoy());
        assert_eq!(decoy.charge(), 3);
    }

    #[test]
    fn non_finite_scores_are_skipped() {
        let pin = "SpecId\tLabel\tScanNr\tlnExpect\tPeptide\tProteins
a\t1\t1\t12.5\tK.PEPTIDE.R/2\tP1
b\t-1\t2\tNaN\tR.EDITPEP.K/2\trev_P1
c\t-1\t3\tinf\tR.EDITPEP.K/3\trev_P1
d\t-1\t4\t-infinity\tR.EDITPEP.K/4\trev_P1
";
        let ingested = PinReader.read(&mut pin.as_bytes(), &ReadOptions::default()).unwrap();
        assert_eq!(ingested.skipped, 3);
        assert_eq!(ingested.psms.len(), 1);
        assert_eq!(ingested.psms.decoys(), 0);
    }

    #[test]
    fn missing_score_column() {
        let pin = "SpecId\tLabel\tScanNr\tfoo\tPeptide\tProteins\nx\t1\t1\t0.5\tPEPTIDE/2\tP1\n";
        assert!(matches!(
            PinReader.read(&mut pin.as_bytes(), &ReadOptions::default()),
            Err(Error::Format { .. })
        ));

        let options = ReadOptions {
            score_column: Some("foo".into()),
            ..Default::default()
        };
        let psms = PinReader.read(&mut pin.as_bytes(), &options).unwrap().psms;
        assert_eq!(psms.as_slice()[0].charge(), 2);
        assert_eq!(psms.as_slice()[0].score, 0.5);
    }
}
