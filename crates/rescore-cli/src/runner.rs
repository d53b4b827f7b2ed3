use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::info;
use regex::Regex;
use rescore_core::features::{
    BasicFeatures, IntensityFeatures, Property, PropertyFeatures, PropertySource,
};
use rescore_core::input::{read_path, ReadOptions};
use rescore_core::mgf::MgfReader;
use rescore_core::pipeline::{Pipeline, Report};
use rescore_core::predictor::command::CommandPredictor;
use rescore_core::predictor::Predictor;
use rescore_core::psm::PsmCollection;
use rescore_core::spectrum::{self, MsDataType, SpectrumIndex};
use serde::Serialize;

use super::input::{infer_spectrum_path, PropertySettings, Settings};

pub struct Runner {
    pub parameters: Settings,
    start: Instant,
}

/// Outcome of rescoring a single PSM file
#[derive(Serialize, Clone, Debug)]
pub struct RunReport {
    pub psm_path: String,
    pub run: String,
    pub skipped: usize,
    pub filtered: usize,
    #[serde(flatten)]
    pub report: Report,
}

#[derive(Serialize)]
struct Results<'a> {
    #[serde(flatten)]
    parameters: &'a Settings,
    runs: &'a [RunReport],
}

impl Runner {
    pub fn new(parameters: Settings) -> Self {
        Runner {
            parameters,
            start: Instant::now(),
        }
    }

    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    fn timeout(&self) -> Option<Duration> {
        self.parameters
            .generator_timeout
            .map(Duration::from_secs_f64)
    }

    fn read_options(&self) -> anyhow::Result<ReadOptions> {
        let decoy_pattern = self
            .parameters
            .decoy_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        Ok(ReadOptions {
            decoy_pattern,
            score_column: self.parameters.score_column.clone(),
            lower_score_is_better: self.parameters.lower_score_is_better,
            max_rank: self.parameters.max_psm_rank_input,
            run: None,
        })
    }

    /// Load the spectra of `run`, if a spectrum path is configured
    fn read_spectra(&self, run: &str) -> anyhow::Result<Option<SpectrumIndex>> {
        let configured = match &self.parameters.spectrum_path {
            Some(configured) => configured,
            None => return Ok(None),
        };
        let path = match infer_spectrum_path(configured, run) {
            Some(path) => path,
            None => {
                log::warn!(
                    "no spectrum file found for run `{}` in `{}`",
                    run,
                    configured
                );
                return Ok(None);
            }
        };
        let id_pattern = self
            .parameters
            .spectrum_id_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        let spectra = MgfReader::new(id_pattern)
            .read_path(&path)
            .with_context(|| format!("Failed to read spectra from `{}`", path.display()))?;
        Ok(Some(spectra))
    }

    /// Precursor data needed by the enabled generators
    fn required_data(&self) -> BTreeSet<MsDataType> {
        let generators = &self.parameters.feature_generators;
        let mut required = BTreeSet::new();
        if generators.basic {
            required.insert(MsDataType::PrecursorMz);
        }
        if generators.retention_time.enabled {
            required.insert(MsDataType::RetentionTime);
        }
        if generators.ion_mobility.enabled {
            required.insert(MsDataType::IonMobility);
        }
        required
    }

    fn predictor(&self, name: &str, command: &[String]) -> Arc<dyn Predictor> {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        let predictor =
            CommandPredictor::new(name.to_string(), program, args).with_timeout(self.timeout());
        Arc::new(predictor)
    }

    fn property(&self, property: Property, settings: &PropertySettings) -> PropertyFeatures {
        let source = match &settings.command {
            Some(command) => PropertySource::External {
                predictor: self.predictor(property.generator(), command),
                timeout: self.timeout(),
            },
            None => PropertySource::SelfTrained,
        };
        let mut generator = PropertyFeatures::new(property, source);
        generator.calibration_fdr = settings.calibration_fdr;
        generator.min_psms = settings.min_psms;
        generator
    }

    /// Assemble the generators usable with the available data
    fn pipeline(
        &self,
        available: &BTreeSet<MsDataType>,
        spectra: Option<Arc<SpectrumIndex>>,
    ) -> Pipeline {
        let generators = &self.parameters.feature_generators;
        let mut pipeline = Pipeline::new(self.parameters.pipeline.clone());

        if generators.basic {
            pipeline = pipeline.with_generator(Box::new(BasicFeatures));
        }
        if generators.retention_time.enabled {
            match available.contains(&MsDataType::RetentionTime) {
                true => {
                    pipeline = pipeline.with_generator(Box::new(
                        self.property(Property::RetentionTime, &generators.retention_time),
                    ))
                }
                false => log::warn!("retention time unavailable, skipping `retention_time` features"),
            }
        }
        if generators.ion_mobility.enabled {
            match available.contains(&MsDataType::IonMobility) {
                true => {
                    pipeline = pipeline.with_generator(Box::new(
                        self.property(Property::IonMobility, &generators.ion_mobility),
                    ))
                }
                false => log::info!("ion mobility unavailable, skipping `ion_mobility` features"),
            }
        }
        if generators.ms2.enabled {
            match (spectra, &generators.ms2.command) {
                (Some(spectra), Some(command)) => {
                    let mut ms2 = IntensityFeatures::new(spectra, self.predictor("ms2", command));
                    ms2.tolerance = generators.ms2.fragment_tol;
                    ms2.timeout = self.timeout();
                    pipeline = pipeline.with_generator(Box::new(ms2));
                }
                _ => log::warn!("no spectra available, skipping `ms2` features"),
            }
        }
        pipeline
    }

    /// Fill in missing precursor data from the spectra, where possible
    fn precursor_data(
        &self,
        psms: &mut PsmCollection,
        spectra: Option<&SpectrumIndex>,
    ) -> anyhow::Result<BTreeSet<MsDataType>> {
        let required = self.required_data();
        match spectra {
            Some(spectra) => Ok(spectrum::add_precursor_values(psms, &required, Some(spectra))?),
            None => {
                let available = spectrum::available_data(psms);
                let missing = required.difference(&available).collect::<Vec<_>>();
                if !missing.is_empty() {
                    log::warn!(
                        "missing precursor data {:?}, set `spectrum_path` to read it from spectra",
                        missing
                    );
                }
                Ok(available)
            }
        }
    }

    /// Rescore the PSMs of a single run
    fn rescore_run(
        &self,
        psm_path: &str,
        run: &str,
        psms: &mut PsmCollection,
    ) -> anyhow::Result<Report> {
        let spectra = self.read_spectra(run)?;
        let available = self
            .precursor_data(psms, spectra.as_ref())
            .with_context(|| format!("Failed to add precursor data to PSMs of `{}`", psm_path))?;
        log::debug!("{}: available data: {:?}", run, available);

        let pipeline = self.pipeline(&available, spectra.map(Arc::new));
        let report = pipeline.run(psms).with_context(|| {
            format!("Failed to rescore PSMs of run `{}` in `{}`", run, psm_path)
        })?;

        info!(
            "- {}: {} target PSMs, {} target peptides at {} FDR using {} features",
            run,
            report.passing_psms,
            report.passing_peptides,
            self.parameters.pipeline.rescore.fdr_threshold,
            report.features.len()
        );
        for warning in &report.warnings {
            log::warn!(
                "- {}: generator `{}` skipped ({} PSMs affected): {}",
                run,
                warning.generator,
                warning.affected,
                warning.reason
            );
        }
        Ok(report)
    }

    /// Rescore every run of a PSM file independently. Skipped and filtered
    /// rows are counted per file, and reported with its first run
    fn process(&self, psm_path: &str) -> anyhow::Result<(Vec<RunReport>, Vec<String>)> {
        let start = Instant::now();
        let options = self.read_options()?;
        let ingested = read_path(psm_path, self.parameters.psm_format, &options)
            .with_context(|| format!("Failed to read PSMs from `{}`", psm_path))?;
        info!(
            "read {} PSMs ({} targets, {} decoys) from {} in {}ms",
            ingested.psms.len(),
            ingested.psms.targets(),
            ingested.psms.decoys(),
            psm_path,
            start.elapsed().as_millis()
        );

        let file_stem = Path::new(psm_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let split = ingested.psms.split_by_run();
        let single = split.len() == 1;
        if !single {
            info!("{} contains {} runs", psm_path, split.len());
        }

        let mut reports = Vec::with_capacity(split.len());
        let mut outputs = Vec::new();
        for (idx, (run, mut psms)) in split.into_iter().enumerate() {
            let report = self.rescore_run(psm_path, &run, &mut psms)?;

            let stem = match (single, run.is_empty()) {
                (true, _) | (false, true) => file_stem.clone(),
                (false, false) => format!("{}.{}", file_stem, run),
            };
            outputs.push(self.write_psms(&stem, &psms, &report)?);
            if self.parameters.write_pin {
                outputs.push(self.write_pin(&stem, &psms, &report)?);
            }

            let (skipped, filtered) = match idx {
                0 => (ingested.skipped, ingested.filtered),
                _ => (0, 0),
            };
            reports.push(RunReport {
                psm_path: psm_path.to_string(),
                run,
                skipped,
                filtered,
                report,
            });
        }
        Ok((reports, outputs))
    }

    pub fn run(mut self) -> anyhow::Result<Vec<RunReport>> {
        let mut runs = Vec::with_capacity(self.parameters.psm_paths.len());
        let mut output_paths = Vec::new();
        for psm_path in &self.parameters.psm_paths {
            let (reports, outputs) = self.process(psm_path)?;
            runs.extend(reports);
            output_paths.extend(outputs);
        }
        self.parameters.output_paths.extend(output_paths);

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        for output in &self.parameters.output_paths {
            info!("- {}", output);
        }
        let results = Results {
            parameters: &self.parameters,
            runs: &runs,
        };
        let bytes = serde_json::to_vec_pretty(&results)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(runs)
    }
}
