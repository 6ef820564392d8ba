use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const MASK: &str = "1,0,1,0,1,0,1,0,1,0,1,0,1,0";

fn srkf() -> Command {
    let mut cmd = Command::cargo_bin("srkf").unwrap();
    cmd.env_remove("SRKF_CONFIG");
    cmd
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    srkf()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    srkf()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("srkf"));
}

#[test]
fn test_help_flag() {
    srkf()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Kalman"));
}

// =============================================================================
// VARIANTS SUBCOMMAND
// =============================================================================

#[test]
fn test_variants_subcommand() {
    srkf()
        .arg("variants")
        .assert()
        .success()
        .stdout(predicate::str::contains("Potter_GramSchmidt"))
        .stdout(predicate::str::contains("Carlson_Givens"))
        .stdout(predicate::str::contains("Bierman_Householder"));
}

#[test]
fn test_variants_json() {
    let output = srkf().arg("variants").arg("--json").assert().success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let arr = parsed.as_array().unwrap();
    assert_eq!(arr.len(), 9);

    let names: Vec<&str> = arr
        .iter()
        .map(|v| v.get("name").unwrap().as_str().unwrap())
        .collect();
    assert_eq!(names[0], "Potter_GramSchmidt");
    assert_eq!(names[8], "Bierman_Householder");
    for v in arr {
        assert!(v.get("rule").is_some());
        assert!(v.get("kernel").is_some());
        assert!(v.get("rule_documentation").is_some());
    }
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_subcommand() {
    srkf()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("srkf CLI v"))
        .stdout(predicate::str::contains("Artifact directory"));
}

#[test]
fn test_info_json() {
    let output = srkf().arg("info").arg("--json").assert().success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(parsed.get("cli_version").is_some());
    assert_eq!(parsed["variant_count"], 9);
    assert_eq!(parsed["channels"].as_array().unwrap().len(), 14);
    assert_eq!(parsed["defaults"]["sampling_rate"], 128.0);
    assert_eq!(parsed["defaults"]["spectral"]["segment_length"], 128);
}

// =============================================================================
// VALIDATE SUBCOMMAND
// =============================================================================

#[test]
fn test_validate_nonexistent_file() {
    srkf()
        .arg("validate")
        .arg("--file")
        .arg("/nonexistent/file.csv")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_validate_missing_channel() {
    let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(tmp, "AF3,F7").unwrap();
    writeln!(tmp, "1.0,2.0").unwrap();
    tmp.flush().unwrap();

    srkf()
        .arg("validate")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("F3"));
}

#[test]
fn test_validate_headerless_file() {
    let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    for t in 0..32 {
        let row: Vec<String> = (0..14).map(|c| ((t + c) % 5).to_string()).collect();
        writeln!(tmp, "{}", row.join(",")).unwrap();
    }
    tmp.flush().unwrap();

    srkf()
        .arg("validate")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("32 samples"));
}

#[test]
fn test_validate_json_output() {
    let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    for t in 0..256 {
        let row: Vec<String> = (0..14).map(|c| (t * c % 11).to_string()).collect();
        writeln!(tmp, "{}", row.join(",")).unwrap();
    }
    tmp.flush().unwrap();

    let output = srkf()
        .arg("validate")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .arg("--fs")
        .arg("256")
        .arg("--json")
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["valid"], true);
    assert_eq!(parsed["samples"], 256);
    assert_eq!(parsed["sampling_rate"], 256.0);
    assert!(parsed["error"].is_null());
}

// =============================================================================
// RUN SUBCOMMAND - ARGUMENT VALIDATION
// =============================================================================

#[test]
fn test_run_missing_file_arg() {
    srkf()
        .arg("run")
        .arg("--mask")
        .arg(MASK)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}

#[test]
fn test_run_missing_mask_arg() {
    srkf()
        .arg("run")
        .arg("--file")
        .arg("/tmp/test.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--mask"));
}

#[test]
fn test_run_nonexistent_file() {
    srkf()
        .arg("run")
        .arg("--file")
        .arg("/nonexistent/file.csv")
        .arg("--mask")
        .arg(MASK)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_run_invalid_variant() {
    let tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();

    srkf()
        .arg("run")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .arg("--variant")
        .arg("Joseph_Givens")
        .arg("--mask")
        .arg(MASK)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Joseph"));
}

#[test]
fn test_run_short_mask() {
    let tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();

    srkf()
        .arg("run")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .arg("--mask")
        .arg("1,0,1")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("14"));
}

#[test]
fn test_run_invalid_overlap() {
    let tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();

    srkf()
        .arg("run")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .arg("--mask")
        .arg(MASK)
        .arg("--overlap")
        .arg("1.0")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("overlap"));
}

#[test]
fn test_run_bad_config_from_env() {
    let tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();

    srkf()
        .env("SRKF_CONFIG", "/nonexistent/srkf.json")
        .arg("run")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .arg("--mask")
        .arg(MASK)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Cannot read config"));
}

// =============================================================================
// BATCH SUBCOMMAND - ARGUMENT VALIDATION
// =============================================================================

#[test]
fn test_batch_requires_inputs() {
    srkf()
        .arg("batch")
        .arg("--mask")
        .arg(MASK)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--glob or --files"));
}

#[test]
fn test_batch_no_matches() {
    srkf()
        .arg("batch")
        .arg("--glob")
        .arg("/nonexistent_dir_12345/*.csv")
        .arg("--mask")
        .arg(MASK)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn test_batch_wilcoxon_needs_output_dir() {
    srkf()
        .arg("batch")
        .arg("--files")
        .arg("a.csv")
        .arg("--mask")
        .arg(MASK)
        .arg("--wilcoxon")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--output-dir"));
}

#[test]
fn test_wilcoxon_requires_inputs() {
    srkf()
        .arg("wilcoxon")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--glob or --files"));
}

#[test]
fn test_wilcoxon_unknown_series() {
    srkf()
        .arg("wilcoxon")
        .arg("--files")
        .arg("a_welch.csv")
        .arg("b_welch.csv")
        .arg("--series")
        .arg("Delta")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown series label"));
}

#[test]
fn test_batch_dry_run_lists_sessions() {
    srkf()
        .arg("batch")
        .arg("--files")
        .arg("a.csv")
        .arg("b.csv")
        .arg("--variants")
        .arg("Potter_Givens,Carlson_Givens")
        .arg("--mask")
        .arg(MASK)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("a.csv\tPotter_Givens"))
        .stdout(predicate::str::contains("b.csv\tCarlson_Givens"));
}
