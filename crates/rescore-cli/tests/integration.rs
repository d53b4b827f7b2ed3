use std::path::PathBuf;

use rescore_cli::input::Input;
use rescore_cli::runner::Runner;

const RESIDUES: &[u8] = b"ACDEFGHILMNPQSTVWY";

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

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rescore-cli-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 150 targets scored above 50 decoys
fn write_pin(dir: &PathBuf) -> PathBuf {
    let mut pin = String::from(
        "SpecId\tLabel\tScanNr\tExpMass\trank\tCharge2\tretentiontime\thyperscore\tdeltaLCn\tPeptide\tProteins\n",
    );
    for idx in 0..200 {
        let decoy = idx >= 150;
        let score = match decoy {
            true => (idx - 150) as f64,
            false => 100.0 + idx as f64,
        };
        pin.push_str(&format!(
            "scan={idx}\t{label}\t{idx}\t{mass:.4}\t1\t1\t{rt:.2}\t{score}\t{delta:.3}\t{peptide}\t{protein}\n",
            label = if decoy { "-1" } else { "1" },
            mass = 800.0 + idx as f64,
            rt = 10.0 + (idx % 37) as f64,
            delta = (idx % 11) as f64 * 0.01,
            peptide = peptide(idx),
            protein = if decoy { "rev_P1" } else { "P1" },
        ));
    }
    let path = dir.join("run1.pin");
    std::fs::write(&path, pin).unwrap();
    path
}

#[test]
fn rescore_pin_file() -> anyhow::Result<()> {
    let dir = scratch("pin");
    let pin = write_pin(&dir);

    let input: Input = serde_json::from_value(serde_json::json!({
        "psm_paths": [pin.display().to_string()],
        "output_directory": dir.display().to_string(),
        "write_pin": true,
        "threads": 2,
    }))?;
    let runs = Runner::new(input.build()?).run()?;

    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.run, "run1");
    assert_eq!(run.report.psms, 200);
    assert_eq!(run.report.decoys, 50);
    assert_eq!(run.report.passing_psms, 150);
    assert!(run.report.features.iter().any(|f| f == "deltaLCn"));
    assert!(run.report.features.iter().any(|f| f == "pep_len"));

    let tsv = std::fs::read_to_string(dir.join("run1.rescore.tsv"))?;
    let mut lines = tsv.lines();
    let header = lines.next().unwrap().split('\t').collect::<Vec<_>>();
    assert_eq!(header[0], "spectrum_id");
    assert_eq!(header[header.len() - 4..], ["rescore_score", "q_value", "peptide_q", "posterior_error"]);
    assert_eq!(lines.count(), 200);

    let pin = std::fs::read_to_string(dir.join("run1.rescore.pin"))?;
    assert!(pin.starts_with("SpecId\tLabel\tScanNr\tsearch_engine_score"));
    assert_eq!(pin.lines().count(), 201);

    let results: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("results.json"))?)?;
    assert_eq!(results["runs"][0]["passing_psms"], 150);
    assert_eq!(results["output_paths"].as_array().map(Vec::len), Some(3));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn output_rank_filter() -> anyhow::Result<()> {
    let dir = scratch("rank");
    let pin = write_pin(&dir);

    let input: Input = serde_json::from_value(serde_json::json!({
        "psm_paths": [pin.display().to_string()],
        "output_directory": dir.display().to_string(),
        "max_psm_rank_output": 0,
        "feature_generators": { "retention_time": { "enabled": false } },
    }))?;
    Runner::new(input.build()?).run()?;

    // Header only
    let tsv = std::fs::read_to_string(dir.join("run1.rescore.tsv"))?;
    assert_eq!(tsv.lines().count(), 1);
    assert!(!dir.join("run1.rescore.pin").exists());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn runs_within_one_file() -> anyhow::Result<()> {
    let dir = scratch("runs");
    let mut tsv = String::from(
        "spectrum_id\tpeptidoform\trun\tis_decoy\tscore\tprecursor_mz\tretention_time\tprotein_list\n",
    );
    // Identical spectrum ids and peptides in both runs
    for run in ["runA", "runB"] {
        for idx in 0..200 {
            let decoy = idx >= 150;
            let score = match decoy {
                true => (idx - 150) as f64,
                false => 100.0 + idx as f64,
            };
            tsv.push_str(&format!(
                "scan={idx}\t{peptide}/2\t{run}\t{label}\t{score}\t{mz:.4}\t{rt:.2}\t{protein}\n",
                peptide = peptide(idx),
                label = if decoy { "True" } else { "False" },
                mz = 400.0 + idx as f64,
                rt = 10.0 + (idx % 37) as f64,
                protein = if decoy { "rev_P1" } else { "P1" },
            ));
        }
    }
    tsv.push_str(&format!("scan=0\t{}/2\trunA\tFalse\t1.0\t400.0\t10.0\tP1\n", peptide(0)));
    let path = dir.join("psms.tsv");
    std::fs::write(&path, tsv)?;

    let input: Input = serde_json::from_value(serde_json::json!({
        "psm_paths": [path.display().to_string()],
        "psm_format": "tsv",
        "output_directory": dir.display().to_string(),
    }))?;
    let runs = Runner::new(input.build()?).run()?;

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run, "runA");
    assert_eq!(runs[1].run, "runB");
    assert_eq!(runs[0].skipped, 1);
    assert_eq!(runs[1].skipped, 0);
    for run in &runs {
        assert_eq!(run.report.psms, 200);
        assert_eq!(run.report.decoys, 50);
        assert!(run.report.passing_psms >= 149, "{}", run.report.passing_psms);

        let tsv = std::fs::read_to_string(dir.join(format!("psms.{}.rescore.tsv", run.run)))?;
        assert_eq!(tsv.lines().count(), 201);
        assert!(tsv.lines().skip(1).all(|line| line.contains(&run.run)));
    }

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn missing_psm_file() {
    let dir = scratch("missing");
    let input: Input = serde_json::from_value(serde_json::json!({
        "psm_paths": [dir.join("nope.pin").display().to_string()],
        "output_directory": dir.display().to_string(),
    }))
    .unwrap();
    let err = Runner::new(input.build().unwrap()).run().unwrap_err();
    assert!(err.to_string().contains("Failed to read PSMs"));
    std::fs::remove_dir_all(&dir).unwrap();
}
