use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use clap::ArgMatches;
use regex::Regex;
use rescore_core::assemble::Imputation;
use rescore_core::input::FileFormat;
use rescore_core::mass::Tolerance;
use rescore_core::pipeline;
use rescore_core::rescore;
use serde::{Deserialize, Serialize};

/// Spectrum file extensions that can be read, in order of preference
pub const SPECTRUM_EXTENSIONS: [&str; 1] = ["mgf"];

#[derive(Serialize, Clone, Debug)]
/// Actual rescoring parameters - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub psm_paths: Vec<String>,
    pub psm_format: Option<FileFormat>,
    pub spectrum_path: Option<String>,
    pub spectrum_id_pattern: Option<String>,
    pub decoy_pattern: Option<String>,
    pub score_column: Option<String>,
    pub lower_score_is_better: bool,
    pub max_psm_rank_input: Option<u32>,
    pub max_psm_rank_output: Option<u32>,
    pub write_pin: bool,
    /// Seconds a predictor may take before its generator is skipped
    pub generator_timeout: Option<f64>,
    pub pipeline: pipeline::Settings,
    pub feature_generators: GeneratorSettings,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    psm_paths: Option<Vec<String>>,
    psm_format: Option<String>,
    spectrum_path: Option<String>,
    spectrum_id_pattern: Option<String>,
    decoy_pattern: Option<String>,
    score_column: Option<String>,
    lower_score_is_better: Option<bool>,
    max_psm_rank_input: Option<u32>,
    max_psm_rank_output: Option<u32>,
    output_directory: Option<String>,
    write_pin: Option<bool>,
    threads: Option<usize>,
    generator_timeout: Option<f64>,
    imputation: Option<Imputation>,
    rescoring: Option<RescoringOptions>,
    feature_generators: Option<GeneratorOptions>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct RescoringOptions {
    fdr_threshold: Option<f64>,
    train_fdr: Option<f64>,
    max_iterations: Option<usize>,
    decoy_correction: Option<f64>,
}

impl From<RescoringOptions> for rescore::Settings {
    fn from(value: RescoringOptions) -> rescore::Settings {
        let default = rescore::Settings::default();
        let settings = rescore::Settings {
            fdr_threshold: value.fdr_threshold.unwrap_or(default.fdr_threshold),
            train_fdr: value.train_fdr.unwrap_or(default.train_fdr),
            max_iterations: value.max_iterations.unwrap_or(default.max_iterations),
            decoy_correction: value
                .decoy_correction
                .unwrap_or(default.decoy_correction)
                .abs(),
        };
        if settings.fdr_threshold > 0.1 {
            log::warn!("rescoring.fdr_threshold is higher than expected");
        }
        if settings.train_fdr > settings.fdr_threshold {
            log::warn!("rescoring.train_fdr is higher than rescoring.fdr_threshold");
        }
        if settings.max_iterations == 0 {
            log::warn!("rescoring.max_iterations is 0, only the native score will be used");
        }
        settings
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct PropertyOptions {
    enabled: Option<bool>,
    /// External predictor program and arguments; a linear model is trained
    /// on the data if unset
    command: Option<Vec<String>>,
    calibration_fdr: Option<f64>,
    min_psms: Option<usize>,
}

#[derive(Serialize, Clone, Debug)]
pub struct PropertySettings {
    pub enabled: bool,
    pub command: Option<Vec<String>>,
    pub calibration_fdr: f64,
    pub min_psms: usize,
}

impl Default for PropertySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            calibration_fdr: 0.01,
            min_psms: 50,
        }
    }
}

impl From<PropertyOptions> for PropertySettings {
    fn from(value: PropertyOptions) -> Self {
        let default = Self::default();
        Self {
            enabled: value.enabled.unwrap_or(default.enabled),
            command: value.command.filter(|c| !c.is_empty()),
            calibration_fdr: value.calibration_fdr.unwrap_or(default.calibration_fdr),
            min_psms: value.min_psms.unwrap_or(default.min_psms),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct Ms2Options {
    enabled: Option<bool>,
    command: Option<Vec<String>>,
    fragment_tol: Option<Tolerance>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct Ms2Settings {
    pub enabled: bool,
    pub command: Option<Vec<String>>,
    pub fragment_tol: Tolerance,
}

impl From<Ms2Options> for Ms2Settings {
    fn from(value: Ms2Options) -> Self {
        let command = value.command.filter(|c| !c.is_empty());
        Self {
            // Only usable with a predictor
            enabled: value.enabled.unwrap_or(command.is_some()),
            command,
            fragment_tol: value.fragment_tol.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct GeneratorOptions {
    basic: Option<bool>,
    retention_time: Option<PropertyOptions>,
    ion_mobility: Option<PropertyOptions>,
    ms2: Option<Ms2Options>,
}

#[derive(Serialize, Clone, Debug)]
pub struct GeneratorSettings {
    pub basic: bool,
    pub retention_time: PropertySettings,
    pub ion_mobility: PropertySettings,
    pub ms2: Ms2Settings,
}

impl From<GeneratorOptions> for GeneratorSettings {
    fn from(value: GeneratorOptions) -> Self {
        Self {
            basic: value.basic.unwrap_or(true),
            retention_time: value.retention_time.map(Into::into).unwrap_or_default(),
            ion_mobility: value.ion_mobility.map(Into::into).unwrap_or_default(),
            ms2: value.ms2.map(Into::into).unwrap_or_default(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorOptions::default().into()
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let mut psm_paths = matches
            .get_many::<String>("psm_paths")
            .map(|paths| paths.cloned().collect::<Vec<_>>())
            .unwrap_or_default();

        // The first positional argument is either a configuration file or
        // the first PSM file
        let mut input = match matches.get_one::<String>("parameters") {
            Some(path) if path.to_ascii_lowercase().ends_with(".json") => Input::load(path)
                .with_context(|| format!("Failed to read parameters from `{path}`"))?,
            Some(path) => {
                psm_paths.insert(0, path.clone());
                Input::default()
            }
            None => Input::default(),
        };

        // Handle JSON configuration overrides
        if !psm_paths.is_empty() {
            log::trace!("overriding `psm_paths` parameter.");
            input.psm_paths = Some(psm_paths);
        }
        if let Some(spectrum_path) = matches.get_one::<String>("spectrum_path") {
            log::trace!("overriding `spectrum_path` parameter.");
            input.spectrum_path = Some(spectrum_path.into());
        }
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(format) = matches.get_one::<String>("psm_format") {
            log::trace!("overriding `psm_format` parameter.");
            input.psm_format = Some(format.into());
        }
        if let Some(threads) = matches.get_one::<u16>("threads").copied() {
            input.threads = Some(threads as usize);
        }
        if matches.get_flag("write-pin") {
            input.write_pin = Some(true);
        }

        ensure!(
            input.psm_paths.as_ref().map_or(false, |p| !p.is_empty()),
            "`psm_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::open(path.as_ref())?;
        serde_json::from_reader(BufReader::new(file)).map_err(anyhow::Error::from)
    }

    fn check_pattern(name: &str, pattern: &Option<String>) -> anyhow::Result<()> {
        if let Some(pattern) = pattern {
            Regex::new(pattern).with_context(|| format!("`{name}` is not a valid regex"))?;
        }
        Ok(())
    }

    fn check_command(name: &str, command: &Option<Vec<String>>) -> anyhow::Result<()> {
        if let Some(program) = command.as_ref().and_then(|c| c.first()) {
            ensure!(
                !program.trim().is_empty(),
                "`feature_generators.{name}.command` must name a program"
            );
        }
        Ok(())
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let psm_paths = self
            .psm_paths
            .filter(|p| !p.is_empty())
            .context("`psm_paths` must be provided!")?;

        let psm_format = self
            .psm_format
            .as_deref()
            .map(str::parse::<FileFormat>)
            .transpose()?;

        Self::check_pattern("decoy_pattern", &self.decoy_pattern)?;
        Self::check_pattern("spectrum_id_pattern", &self.spectrum_id_pattern)?;

        if let Some(timeout) = self.generator_timeout {
            ensure!(
                timeout.is_finite() && timeout > 0.0,
                "`generator_timeout` must be a positive number of seconds"
            );
        }
        if let (Some(input), Some(output)) = (self.max_psm_rank_input, self.max_psm_rank_output) {
            if output > input {
                log::warn!("`max_psm_rank_output` is greater than `max_psm_rank_input`, only ranks up to {} are available", input);
            }
        }

        let feature_generators: GeneratorSettings =
            self.feature_generators.map(Into::into).unwrap_or_default();
        Self::check_command("retention_time", &feature_generators.retention_time.command)?;
        Self::check_command("ion_mobility", &feature_generators.ion_mobility.command)?;
        Self::check_command("ms2", &feature_generators.ms2.command)?;
        if feature_generators.ms2.enabled {
            ensure!(
                feature_generators.ms2.command.is_some(),
                "`feature_generators.ms2` requires a predictor `command`"
            );
            if self.spectrum_path.is_none() {
                log::warn!("`feature_generators.ms2` is enabled, but no `spectrum_path` is set");
            }
        }

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        let pipeline = pipeline::Settings {
            rescore: self.rescoring.map(Into::into).unwrap_or_default(),
            imputation: self.imputation.unwrap_or_default(),
            threads: Some(self.threads.unwrap_or_else(num_cpus::get).max(1)),
        };

        Ok(Settings {
            version: clap::crate_version!().into(),
            psm_paths,
            psm_format,
            spectrum_path: self.spectrum_path,
            spectrum_id_pattern: self.spectrum_id_pattern,
            decoy_pattern: self.decoy_pattern,
            score_column: self.score_column,
            lower_score_is_better: self.lower_score_is_better.unwrap_or(false),
            max_psm_rank_input: self.max_psm_rank_input,
            max_psm_rank_output: self.max_psm_rank_output,
            write_pin: self.write_pin.unwrap_or(false),
            generator_timeout: self.generator_timeout,
            pipeline,
            feature_generators,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

/// Resolve the spectrum file of `run`. A configured file is used as is; for a
/// directory, the first file named after the run with a supported extension
pub fn infer_spectrum_path<P: AsRef<Path>>(configured: P, run: &str) -> Option<PathBuf> {
    let configured = configured.as_ref();
    if configured.is_file() {
        return Some(configured.to_path_buf());
    }
    if !configured.is_dir() {
        return None;
    }

    let mut candidates = std::fs::read_dir(configured)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let ext = path.extension()?.to_str()?.to_ascii_lowercase();
            let preference = SPECTRUM_EXTENSIONS.iter().position(|e| *e == ext)?;
            (stem == run).then_some((preference, path))
        })
        .collect::<Vec<_>>();
    candidates.sort();
    candidates.into_iter().next().map(|(_, path)| path)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let input: Input = serde_json::from_str(r#"{ "psm_paths": ["a.pin"] }"#).unwrap();
        let settings = input.build().unwrap();
        assert_eq!(settings.psm_paths, vec!["a.pin"]);
        assert_eq!(settings.psm_format, None);
        assert_eq!(settings.pipeline.rescore, rescore::Settings::default());
        assert_eq!(settings.pipeline.imputation, Imputation::Median);
        assert!(settings.feature_generators.basic);
        assert!(settings.feature_generators.retention_time.enabled);
        assert!(!settings.feature_generators.ms2.enabled);
        assert!(!settings.write_pin);
    }

    #[test]
    fn nested_options() {
        let input: Input = serde_json::from_str(
            r#"{
                "psm_paths": ["a.tsv"],
                "psm_format": "psm_utils",
                "imputation": "drop_feature",
                "rescoring": { "train_fdr": 0.05, "max_iterations": 3 },
                "feature_generators": {
                    "ion_mobility": { "enabled": false },
                    "ms2": { "command": ["predict-ms2", "--model", "HCD"], "fragment_tol": { "ppm": [-10.0, 10.0] } }
                }
            }"#,
        )
        .unwrap();
        let settings = input.build().unwrap();
        assert_eq!(settings.psm_format, Some(FileFormat::Tsv));
        assert_eq!(settings.pipeline.imputation, Imputation::DropFeature);
        assert_eq!(settings.pipeline.rescore.train_fdr, 0.05);
        assert_eq!(settings.pipeline.rescore.max_iterations, 3);
        assert_eq!(settings.pipeline.rescore.fdr_threshold, 0.01);
        assert!(!settings.feature_generators.ion_mobility.enabled);
        assert!(settings.feature_generators.ms2.enabled);
        assert_eq!(
            settings.feature_generators.ms2.fragment_tol,
            Tolerance::Ppm(-10.0, 10.0)
        );
    }

    #[test]
    fn invalid_settings() {
        let input: Input =
            serde_json::from_str(r#"{ "psm_paths": ["a.pin"], "psm_format": "mzid" }"#).unwrap();
        assert!(input.build().is_err());

        let input: Input =
            serde_json::from_str(r#"{ "psm_paths": ["a.pin"], "decoy_pattern": "(" }"#).unwrap();
        assert!(input.build().is_err());

        let input: Input =
            serde_json::from_str(r#"{ "psm_paths": ["a.pin"], "generator_timeout": 0 }"#).unwrap();
        assert!(input.build().is_err());

        let input: Input = serde_json::from_str(
            r#"{ "psm_paths": ["a.pin"], "feature_generators": { "ms2": { "enabled": true } } }"#,
        )
        .unwrap();
        assert!(input.build().is_err());

        let input: Input = serde_json::from_str(r#"{ "psm_paths": [] }"#).unwrap();
        assert!(input.build().is_err());
    }
}
