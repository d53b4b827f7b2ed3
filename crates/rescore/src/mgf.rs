//! Mascot Generic Format spectrum files

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::Regex;

use crate::peptide::parse_charge;
use crate::spectrum::{Spectrum, SpectrumIndex};
use crate::Error;

#[derive(Clone, Debug, Default)]
pub struct MgfReader {
    /// Extracts the spectrum id from the `TITLE` line: the first capture
    /// group if the pattern has one, otherwise the whole match
    id_pattern: Option<Regex>,
}

impl MgfReader {
    pub fn new(id_pattern: Option<Regex>) -> Self {
        MgfReader { id_pattern }
    }

    fn spectrum_id(&self, title: &str) -> String {
        match &self.id_pattern {
            Some(re) => re
                .captures(title)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| title.to_string()),
            None => title.to_string(),
        }
    }

    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> Result<SpectrumIndex, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::SpectrumParsing(format!("{}: {}", path.display(), e)))?;
        let spectra = self.read(BufReader::new(file))?;
        log::info!("read {} spectra from {}", spectra.len(), path.display());
        Ok(SpectrumIndex::new(spectra))
    }

    pub fn read<R: BufRead>(&self, source: R) -> Result<Vec<Spectrum>, Error> {
        let mut spectra = Vec::new();
        let mut current: Option<Spectrum> = None;
        let mut skipped = 0usize;

        for (line_no, line) in source.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line == "BEGIN IONS" {
                if current.is_some() {
                    return Err(Error::SpectrumParsing(format!(
                        "line {}: BEGIN IONS inside an unterminated block",
                        line_no + 1
                    )));
                }
                current = Some(Spectrum::default());
                continue;
            }

            let spectrum = match current.as_mut() {
                Some(spectrum) => spectrum,
                // Global parameters are not used
                None => continue,
            };

            if line == "END IONS" {
                if let Some(spectrum) = current.take() {
                    if spectrum.id.is_empty() {
                        log::warn!("line {}: spectrum without TITLE, skipping", line_no + 1);
                        skipped += 1;
                    } else {
                        spectra.push(spectrum);
                    }
                }
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim();
                match key.trim().to_ascii_uppercase().as_str() {
                    "TITLE" => spectrum.id = self.spectrum_id(value),
                    "PEPMASS" => {
                        spectrum.precursor_mz = value
                            .split_whitespace()
                            .next()
                            .and_then(|mz| mz.parse::<f64>().ok())
                    }
                    "CHARGE" => {
                        spectrum.charge = value.split(|c: char| c == ',' || c == ' ').find_map(parse_charge)
                    }
                    "RTINSECONDS" => {
                        spectrum.rt = value.parse::<f32>().ok().map(|rt| rt / 60.0)
                    }
                    "ION_MOBILITY" | "INVERSE_ION_MOBILITY" => {
                        spectrum.ion_mobility = value
                            .split_whitespace()
                            .last()
                            .and_then(|im| im.parse::<f32>().ok())
                    }
                    _ => {}
                }
                continue;
            }

            let mut fields = line.split_whitespace();
            match (
                fields.next().and_then(|mz| mz.parse::<f32>().ok()),
                fields.next().map_or(Some(0.0), |i| i.parse::<f32>().ok()),
            ) {
                (Some(mz), Some(intensity)) => {
                    spectrum.mz.push(mz);
                    spectrum.intensity.push(intensity);
                }
                _ => log::warn!("line {}: malformed peak `{}`", line_no + 1, line),
            }
        }

        if current.is_some() {
            return Err(Error::SpectrumParsing(
                "unterminated BEGIN IONS block at end of file".into(),
            ));
        }
        if skipped > 0 {
            log::warn!("skipped {} spectra without TITLE", skipped);
        }
        Ok(spectra)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MGF: &str = "COM=test
BEGIN IONS
TITLE=run1.1001.1001.2 File:\"run1.raw\", NativeID:\"controllerType=0 controllerNumber=1 scan=1001\"
PEPMASS=400.68726 12345.6
CHARGE=2+
RTINSECONDS=630
ION_MOBILITY=3 1.012
98.06 10.0
227.1026 100
bad peak
END IONS

BEGIN IONS
TITLE=run1.1002.1002.3
PEPMASS=500.1
CHARGE=3+
RTINSECONDS=660.0
148.06 50
END IONS
";

    #[test]
    fn read_mgf() {
        let spectra = MgfReader::default().read(MGF.as_bytes()).unwrap();
        assert_eq!(spectra.len(), 2);
        let first = &spectra[0];
        assert!(first.id.starts_with("run1.1001.1001.2"));
        assert_eq!(first.precursor_mz, Some(400.68726));
        assert_eq!(first.charge, Some(2));
        assert_eq!(first.rt, Some(10.5));
        assert_eq!(first.ion_mobility, Some(1.012));
        assert_eq!(first.mz, vec![98.06, 227.1026]);
        assert_eq!(first.intensity, vec![10.0, 100.0]);
        assert_eq!(spectra[1].ion_mobility, None);
    }

    #[test]
    fn spectrum_id_pattern() {
        let reader = MgfReader::new(Some(Regex::new(r"scan=(\d+)").unwrap()));
        let spectra = reader.read(MGF.as_bytes()).unwrap();
        assert_eq!(spectra[0].id, "1001");
        // No match: the whole title is used
        assert_eq!(spectra[1].id, "run1.1002.1002.3");

        let index = SpectrumIndex::new(spectra);
        assert!(index.get("1001").is_some());
    }

    #[test]
    fn unterminated_block() {
        let text = "BEGIN IONS\nTITLE=x\n100 1\n";
        assert!(matches!(
            MgfReader::default().read(text.as_bytes()),
            Err(Error::SpectrumParsing(_))
        ));
    }
}
