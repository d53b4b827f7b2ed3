//! Orchestration of a single rescoring run
//!
//! Feature generators run concurrently on a bounded thread pool. A generator
//! whose predictor is unavailable is skipped with a [`Warning`]; any other
//! failure aborts the run. The surviving columns are assembled, rescored, and
//! the outputs attached to the PSMs.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assemble::{assemble, FeatureMatrix, Imputation};
use crate::features::{FeatureColumn, FeatureGenerator};
use crate::psm::{PsmCollection, Rescored};
use crate::rescore::{self, Engine};
use crate::Error;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rescore: rescore::Settings,
    pub imputation: Imputation,
    /// Worker threads for feature generation; rayon's default if unset
    pub threads: Option<usize>,
}

/// A feature generator that was skipped
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Warning {
    pub generator: String,
    pub reason: String,
    /// Number of PSMs left without this generator's features
    pub affected: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub psms: usize,
    pub targets: usize,
    pub decoys: usize,
    pub features: Vec<String>,
    pub imputed: Vec<(String, usize)>,
    pub warnings: Vec<Warning>,
    pub passing_psms: usize,
    pub passing_peptides: usize,
    pub iterations: usize,
    pub best_iteration: usize,
    /// Discriminant weights of the selected model, if any was trained
    pub weights: Option<Vec<(String, f64)>>,
    #[serde(skip)]
    pub matrix: FeatureMatrix,
}

#[derive(Default)]
pub struct Pipeline {
    settings: Settings,
    generators: Vec<Box<dyn FeatureGenerator>>,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        Pipeline {
            settings,
            generators: Vec::new(),
        }
    }

    pub fn with_generator(mut self, generator: Box<dyn FeatureGenerator>) -> Self {
        self.generators.push(generator);
        self
    }

    pub fn generators(&self) -> impl Iterator<Item = &str> {
        self.generators.iter().map(|g| g.name())
    }

    /// Run every generator, in parallel, collecting columns in registration
    /// order
    fn generate(&self, psms: &PsmCollection) -> Result<(Vec<FeatureColumn>, Vec<Warning>), Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.threads.unwrap_or(0))
            .thread_name(|idx| format!("rescore-generator-{}", idx))
            .build()
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let results = pool.install(|| {
            self.generators
                .par_iter()
                .map(|generator| {
                    let start = std::time::Instant::now();
                    let result = generator.generate(psms);
                    log::trace!(
                        "- generator `{}` finished in {}ms",
                        generator.name(),
                        start.elapsed().as_millis()
                    );
                    result
                })
                .collect::<Vec<_>>()
        });

        let mut columns = Vec::new();
        let mut warnings = Vec::new();
        for (generator, result) in self.generators.iter().zip(results) {
            match result {
                Ok(generated) => {
                    log::info!(
                        "- generator `{}`: {} features",
                        generator.name(),
                        generated.len()
                    );
                    columns.extend(generated);
                }
                Err(Error::PredictorUnavailable { generator: name, reason }) => {
                    let affected = psms.iter().filter(|psm| generator.supports(psm)).count();
                    log::warn!(
                        "- generator `{}` skipped for {} PSMs: {}",
                        name,
                        affected,
                        reason
                    );
                    warnings.push(Warning {
                        generator: name,
                        reason,
                        affected,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok((columns, warnings))
    }

    /// Rescore `psms` in place. On success every PSM carries its rescoring
    /// outputs and the observed values of all generated features
    pub fn run(&self, psms: &mut PsmCollection) -> Result<Report, Error> {
        if psms.decoys() == 0 {
            return Err(Error::NoDecoys);
        }

        let (columns, warnings) = self.generate(psms)?;
        let matrix = assemble(psms, &columns, self.settings.imputation)?;
        let result = Engine::new(self.settings.rescore.clone()).rescore(&matrix)?;

        // Identities are immutable, so generated columns can be attached by id
        for column in &columns {
            for (id, value) in &column.values {
                if let (Some(value), Some(psm)) = (value, psms.get_mut(id)) {
                    psm.add_feature(column.name.as_str(), *value)?;
                }
            }
        }

        let mut already = 0;
        for (row, psm) in psms.iter_mut().enumerate() {
            let rescored = Rescored {
                score: result.best.scores[row],
                q_value: result.best.q_values[row],
                peptide_q: result.peptide_q[row],
                posterior_error: result.posterior_error.as_ref().map(|pep| pep[row]),
            };
            if !psm.attach(rescored) {
                already += 1;
            }
        }
        if already > 0 {
            log::warn!("{} PSMs were already rescored, outputs left unchanged", already);
        }

        let weights = result.best.weights.as_ref().map(|weights| {
            matrix
                .names
                .iter()
                .cloned()
                .zip(weights.iter().copied())
                .collect()
        });

        Ok(Report {
            psms: psms.len(),
            targets: psms.targets(),
            decoys: psms.decoys(),
            features: matrix.names.clone(),
            imputed: matrix.imputed.clone(),
            warnings,
            passing_psms: result.best.passing,
            passing_peptides: result.peptides_passing,
            iterations: result.iterations,
            best_iteration: result.best.iteration,
            weights,
            matrix,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psm::Psm;

    struct Unavailable;

    impl FeatureGenerator for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn supports(&self, psm: &Psm) -> bool {
            !psm.is_decoy()
        }

        fn generate(&self, _: &PsmCollection) -> Result<Vec<FeatureColumn>, Error> {
            Err(Error::unavailable("unavailable", "no predictor"))
        }
    }

    struct Broken;

    impl FeatureGenerator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn supports(&self, _: &Psm) -> bool {
            true
        }

        fn generate(&self, _: &PsmCollection) -> Result<Vec<FeatureColumn>, Error> {
            Err(Error::EmptyMatrix)
        }
    }

    fn collection() -> PsmCollection {
        let psms = (0..200)
            .map(|i| {
                let decoy = i >= 150;
                let score = if decoy { i as f64 - 150.0 } else { 100.0 + i as f64 };
                Psm::new(format!("scan={}", i), "PEPTIDE".parse().unwrap(), 2, 1, decoy, score)
            })
            .collect();
        PsmCollection::new(psms, false).unwrap()
    }

    #[test]
    fn unavailable_generator_is_a_warning() {
        let mut psms = collection();
        let pipeline = Pipeline::new(Settings::default())
            .with_generator(Box::new(crate::features::BasicFeatures))
            .with_generator(Box::new(Unavailable));
        let report = pipeline.run(&mut psms).unwrap();
        assert_eq!(
            report.warnings,
            vec![Warning {
                generator: "unavailable".into(),
                reason: "no predictor".into(),
                affected: 150
            }]
        );
        assert_eq!(report.psms, 200);
        assert!(psms.iter().all(|psm| psm.rescored().is_some()));
        // Generated values are attached to the PSMs
        assert_eq!(psms.as_slice()[0].get("pep_len").unwrap(), 7.0);
    }

    #[test]
    fn other_errors_are_fatal() {
        let mut psms = collection();
        let pipeline = Pipeline::new(Settings::default()).with_generator(Box::new(Broken));
        assert!(matches!(pipeline.run(&mut psms), Err(Error::EmptyMatrix)));
        assert!(psms.iter().all(|psm| psm.rescored().is_none()));
    }

    #[test]
    fn bounded_pool() {
        let mut psms = collection();
        let settings = Settings {
            threads: Some(1),
            ..Default::default()
        };
        let report = Pipeline::new(settings)
            .with_generator(Box::new(crate::features::BasicFeatures))
            .run(&mut psms)
            .unwrap();
        assert_eq!(report.passing_psms, 150);
    }
}
