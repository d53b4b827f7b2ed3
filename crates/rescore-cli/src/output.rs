use rayon::prelude::*;
use rescore_core::assemble::SEARCH_ENGINE_SCORE;
use rescore_core::pipeline::Report;
use rescore_core::psm::{Psm, PsmCollection};

use crate::runner::Runner;

const MISSING: &[u8] = b"";

fn float<F: ryu::Float>(value: F) -> Vec<u8> {
    ryu::Buffer::new().format(value).as_bytes().to_vec()
}

fn optional<F: ryu::Float>(value: Option<F>) -> Vec<u8> {
    value.map(float).unwrap_or_else(|| MISSING.to_vec())
}

impl Runner {
    fn reported(&self, psm: &Psm) -> bool {
        self.parameters
            .max_psm_rank_output
            .map_or(true, |max| psm.rank() <= max)
    }

    /// Feature columns of the rescoring matrix, minus the native score
    fn feature_columns(report: &Report) -> Vec<(usize, &str)> {
        report
            .matrix
            .names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() != SEARCH_ENGINE_SCORE)
            .map(|(col, name)| (col, name.as_str()))
            .collect()
    }

    pub fn serialize_psm(
        &self,
        psm: &Psm,
        row: &[f64],
        columns: &[(usize, &str)],
    ) -> csv::ByteRecord {
        let mut record = csv::ByteRecord::new();
        record.push_field(psm.spectrum_id().as_bytes());
        record.push_field(psm.peptidoform().to_string().as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.charge()).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.rank()).as_bytes());
        record.push_field(psm.run().as_bytes());
        record.push_field(psm.proteins.join(";").as_bytes());
        record.push_field(match psm.is_decoy() {
            true => &b"decoy"[..],
            false => &b"target"[..],
        });
        record.push_field(&optional(psm.rt));
        record.push_field(&optional(psm.ion_mobility));
        record.push_field(&float(psm.score));
        for (col, _) in columns {
            record.push_field(&float(row[*col]));
        }
        match psm.rescored() {
            Some(rescored) => {
                record.push_field(&float(rescored.score));
                record.push_field(&float(rescored.q_value));
                record.push_field(&float(rescored.peptide_q));
                record.push_field(&optional(rescored.posterior_error));
            }
            None => (0..4).for_each(|_| record.push_field(MISSING)),
        }
        record
    }

    /// Write every reported PSM with its features and rescoring outputs
    pub fn write_psms(
        &self,
        stem: &str,
        psms: &PsmCollection,
        report: &Report,
    ) -> anyhow::Result<String> {
        let path = self.make_path(format!("{}.rescore.tsv", stem));

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let columns = Self::feature_columns(report);
        let mut headers = csv::ByteRecord::from(vec![
            "spectrum_id",
            "peptide",
            "charge",
            "rank",
            "run",
            "proteins",
            "label",
            "rt",
            "ion_mobility",
            SEARCH_ENGINE_SCORE,
        ]);
        for (_, name) in &columns {
            headers.push_field(name.as_bytes());
        }
        for name in ["rescore_score", "q_value", "peptide_q", "posterior_error"] {
            headers.push_field(name.as_bytes());
        }

        wtr.write_byte_record(&headers)?;
        for record in psms
            .as_slice()
            .par_iter()
            .enumerate()
            .filter(|(_, psm)| self.reported(psm))
            .map(|(row, psm)| self.serialize_psm(psm, report.matrix.features.row(row), &columns))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn serialize_pin(
        &self,
        re: &regex::Regex,
        psm: &Psm,
        row: &[f64],
    ) -> csv::ByteRecord {
        let scannr = re
            .captures(psm.spectrum_id())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().as_bytes())
            .unwrap_or(psm.spectrum_id().as_bytes());

        let mut record = csv::ByteRecord::new();
        record.push_field(
            format!(
                "{}_{}_{}_{}",
                psm.run(),
                psm.spectrum_id(),
                psm.charge(),
                psm.rank()
            )
            .as_bytes(),
        );
        record.push_field(match psm.is_decoy() {
            true => &b"-1"[..],
            false => &b"1"[..],
        });
        record.push_field(scannr);
        for value in row {
            record.push_field(&float(*value));
        }
        record.push_field(psm.peptidoform().to_string().as_bytes());
        record.push_field(psm.proteins.join(";").as_bytes());
        record
    }

    /// Write the assembled feature matrix in Percolator's tab-delimited
    /// input format
    pub fn write_pin(
        &self,
        stem: &str,
        psms: &PsmCollection,
        report: &Report,
    ) -> anyhow::Result<String> {
        let path = self.make_path(format!("{}.rescore.pin", stem));

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(vec![]);

        let mut headers = csv::ByteRecord::from(vec!["SpecId", "Label", "ScanNr"]);
        for name in &report.matrix.names {
            headers.push_field(name.as_bytes());
        }
        headers.push_field(b"Peptide");
        headers.push_field(b"Proteins");

        let re = regex::Regex::new(r"scan=(\d+)")?;

        wtr.write_byte_record(&headers)?;
        for record in psms
            .as_slice()
            .par_iter()
            .enumerate()
            .filter(|(_, psm)| self.reported(psm))
            .map(|(row, psm)| self.serialize_pin(&re, psm, report.matrix.features.row(row)))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }
}
