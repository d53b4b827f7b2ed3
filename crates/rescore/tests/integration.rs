//! End-to-end rescoring scenarios over synthetic PSM collections

use std::sync::Arc;
use std::time::Duration;

use quickcheck_macros::quickcheck;
use rescore_core::assemble::{assemble, Imputation};
use rescore_core::features::{BasicFeatures, Property, PropertyFeatures, PropertySource};
use rescore_core::input::pin::PinReader;
use rescore_core::input::{PsmReader, ReadOptions};
use rescore_core::ml::qvalue;
use rescore_core::pipeline::{Pipeline, Settings};
use rescore_core::predictor::{Prediction, PredictionRequest, Predictor, PredictorError};
use rescore_core::psm::{Psm, PsmCollection};
use rescore_core::rescore::Engine;
use rescore_core::Error;

const RESIDUES: &[u8] = b"ACDEFGHILMNPQSTVWY";

/// A distinct, valid peptide sequence for every index
fn peptide(mut idx: usize) -> String {
    let mut seq = String::from("PEP");
    loop {
        seq.push(RESIDUES[idx % RESIDUES.len()] as char);
        idx /= RESIDUES.len();
        if idx == 0 {
            break;
        }
    }
    seq.push('K');
    seq
}

fn psm(idx: usize, decoy: bool, score: f64) -> Psm {
    let mut psm = Psm::new(
        format!("scan={:05}", idx),
        peptide(idx).parse().unwrap(),
        2,
        1,
        decoy,
        score,
    );
    psm.rt = Some(10.0 + (idx % 50) as f32);
    psm
}

/// `targets` scored strictly above `decoys`
fn separable(targets: usize, decoys: usize) -> PsmCollection {
    let psms = (0..targets + decoys)
        .map(|i| match i < targets {
            true => psm(i, false, 1000.0 + i as f64),
            false => psm(i, true, (i - targets) as f64),
        })
        .collect();
    PsmCollection::new(psms, false).unwrap()
}

struct SlowPredictor;

impl Predictor for SlowPredictor {
    fn name(&self) -> &str {
        "slow"
    }

    fn predict(&self, requests: &[PredictionRequest]) -> Result<Vec<Prediction>, PredictorError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(requests.iter().map(|_| Some(vec![0.0])).collect())
    }
}

#[test]
fn separable_targets_pass() {
    let mut psms = separable(100, 100);
    let report = Pipeline::new(Settings::default())
        .with_generator(Box::new(BasicFeatures))
        .run(&mut psms)
        .unwrap();
    assert!(report.passing_psms >= 99, "{}", report.passing_psms);
    assert!(report.passing_peptides >= 99);

    let passing = psms
        .iter()
        .filter(|psm| !psm.is_decoy())
        .filter(|psm| psm.rescored().map_or(false, |r| r.q_value <= 0.01))
        .count();
    assert_eq!(passing, report.passing_psms);
    // Decoys never pass
    assert!(psms
        .iter()
        .filter(|psm| psm.is_decoy())
        .all(|psm| psm.rescored().unwrap().q_value > 0.01));
}

#[test]
fn timed_out_predictor_falls_back_to_native_score() {
    let mut psms = separable(100, 100);
    let rt = PropertyFeatures::new(
        Property::RetentionTime,
        PropertySource::External {
            predictor: Arc::new(SlowPredictor),
            timeout: Some(Duration::from_millis(50)),
        },
    );
    let report = Pipeline::new(Settings::default())
        .with_generator(Box::new(rt))
        .run(&mut psms)
        .unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].generator, "retention_time");
    assert!(report.warnings[0].reason.contains("timed out"));
    assert_eq!(report.psms, 200);
    assert_eq!(psms.len(), 200);
    assert_eq!(report.features, vec!["search_engine_score"]);
    assert!(psms.iter().all(|psm| psm.rescored().is_some()));
}

#[test]
fn ties_are_broken_deterministically() {
    // Pairs of PSMs share a native score
    let psms = (0..200)
        .map(|i| psm(i, i % 4 == 3, (i / 2) as f64))
        .collect();
    let psms = PsmCollection::new(psms, false).unwrap();
    let matrix = assemble(&psms, &[], Imputation::Median).unwrap();

    let engine = Engine::new(Default::default());
    let first = engine.rescore(&matrix).unwrap();
    let second = engine.rescore(&matrix).unwrap();
    assert_eq!(first, second);

    let order = &first.best.order;
    for w in order.windows(2) {
        let (a, b) = (w[0], w[1]);
        if first.scores()[a] == first.scores()[b] && matrix.seed[a] == matrix.seed[b] {
            assert!(matrix.ids[a] < matrix.ids[b]);
        }
    }
}

#[test]
fn idempotent() {
    let base = separable(150, 60);
    let run = || {
        let mut psms = base.clone();
        Pipeline::new(Settings::default())
            .with_generator(Box::new(BasicFeatures))
            .with_generator(Box::new(PropertyFeatures::new(
                Property::RetentionTime,
                PropertySource::SelfTrained,
            )))
            .run(&mut psms)
            .unwrap();
        psms.iter()
            .map(|psm| *psm.rescored().unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn non_finite_decoy_score_is_not_ranked() {
    let mut pin = String::from("SpecId\tLabel\tScanNr\tlnExpect\tPeptide\tProteins\n");
    for i in 0..200 {
        let (label, score) = match i < 100 {
            true => (1, 1000.0 + i as f64),
            false => (-1, i as f64),
        };
        pin.push_str(&format!("{i}\t{label}\t{i}\t{score}\t{}/2\tP{i}\n", peptide(i)));
    }
    pin.push_str(&format!("200\t-1\t200\tNaN\t{}/2\tP200\n", peptide(200)));

    let ingested = PinReader.read(&mut pin.as_bytes(), &ReadOptions::default()).unwrap();
    assert_eq!(ingested.skipped, 1);
    let mut psms = ingested.psms;
    assert_eq!(psms.decoys(), 100);

    let report = Pipeline::new(Settings::default()).run(&mut psms).unwrap();
    assert!(report.passing_psms >= 99, "{}", report.passing_psms);
}

#[test]
fn no_decoys() {
    let mut psms = separable(50, 0);
    let pipeline = Pipeline::new(Settings::default()).with_generator(Box::new(BasicFeatures));
    assert!(matches!(pipeline.run(&mut psms), Err(Error::NoDecoys)));
}

#[test]
fn no_usable_features() {
    let psms = (0..20).map(|i| psm(i, i % 2 == 0, 1.0)).collect();
    let mut psms = PsmCollection::new(psms, false).unwrap();
    let pipeline = Pipeline::new(Settings::default());
    assert!(matches!(pipeline.run(&mut psms), Err(Error::EmptyMatrix)));
}

#[test]
fn duplicate_identity() {
    let psms = vec![psm(1, false, 1.0), psm(1, true, 2.0)];
    assert!(matches!(
        PsmCollection::new(psms, false),
        Err(Error::DuplicatePsm(_))
    ));
}

#[quickcheck]
fn q_values_monotonic_with_rank(rows: Vec<(i16, bool)>) {
    let scores = rows.iter().map(|(s, _)| *s as f64).collect::<Vec<_>>();
    let decoys = rows.iter().map(|(_, d)| *d).collect::<Vec<_>>();
    let keys = (0..rows.len()).collect::<Vec<_>>();
    let order = qvalue::rank(&scores, &scores, &keys);
    let q = qvalue::q_values(&scores, &decoys, &order, 1.0, 0.01);
    for w in order.windows(2) {
        assert!(q.q_values[w[0]] <= q.q_values[w[1]]);
    }
    assert!(q.q_values.iter().all(|q| (0.0..=1.0).contains(q)));
}

#[quickcheck]
fn matrix_rows_match_collection(rows: Vec<(u8, bool, Option<u8>)>) {
    let psms = rows
        .iter()
        .enumerate()
        .map(|(idx, (score, decoy, feature))| {
            let mut psm = psm(idx, *decoy, *score as f64);
            if let Some(value) = feature {
                psm.add_feature("feature", *value as f64).unwrap();
            }
            psm
        })
        .collect();
    let psms = PsmCollection::new(psms, false).unwrap();
    match assemble(&psms, &[], Imputation::Median) {
        Ok(matrix) => {
            assert_eq!(matrix.rows(), psms.len());
            assert_eq!(matrix.features.shape(), (psms.len(), matrix.names.len()));
            for row in 0..matrix.rows() {
                assert!(matrix.features.row(row).iter().all(|x| x.is_finite()));
            }
        }
        Err(Error::EmptyMatrix) => {}
        Err(e) => panic!("unexpected error: {}", e),
    }
}
