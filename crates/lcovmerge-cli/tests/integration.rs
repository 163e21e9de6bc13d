//! Integration tests for the lcovmerge CLI.
//!
//! These tests exercise the CLI as a subprocess against tracefiles and
//! sources written to a temporary directory, verifying exit codes, output
//! files, and error reporting.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the lcovmerge binary.
fn lcovmerge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lcovmerge"))
}

const SOURCE: &str = "int foo(void)\n{\n  return 0;\n}\n";

/// MD5 of `int foo(void)`, base64 encoded.
const LINE1_CHECKSUM: &str = "xz6pZgTbaFL7lN/CclTDBQ==";

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path.display().to_string()
}

/// Temp workspace with `src/a.c` and two tracefiles referencing it relatively.
fn workspace() -> (TempDir, String, String) {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/a.c", SOURCE);
    let first = write(
        temp.path(),
        "first.info",
        "TN:t1\nSF:src/a.c\nFN:1,foo\nFNDA:5,foo\nDA:1,5\nDA:2,0\nend_of_record\n",
    );
    let second = write(
        temp.path(),
        "second.info",
        "TN:t1\nSF:src/a.c\nFNDA:2,foo\nDA:1,1\nend_of_record\n",
    );
    (temp, first, second)
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    lcovmerge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("lcovmerge"))
        .stdout(predicate::str::contains("--discard-checksum"))
        .stdout(predicate::str::contains("--generate-checksum"))
        .stdout(predicate::str::contains("--output-file"))
        .stdout(predicate::str::contains("--root"));
}

#[test]
fn test_version_displays_version() {
    lcovmerge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lcovmerge"))
        .stdout(predicate::str::contains("0.2.0"));
}

#[test]
fn test_missing_inputs_is_usage_error() {
    lcovmerge()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("INPUT"));
}

// ============================================================================
// Merge Tests
// ============================================================================

#[test]
fn test_merge_to_stdout() {
    let (temp, first, second) = workspace();
    lcovmerge()
        .current_dir(temp.path())
        .args([&first, &second])
        .assert()
        .success()
        .stdout(
            "TN:t1\nSF:src/a.c\nFN:1,foo\nFNDA:7,foo\nFNF:1\nFNH:1\nDA:1,6\nDA:2,0\nLF:2\nLH:1\nBRF:0\nBRH:0\nend_of_record\n",
        );
}

#[test]
fn test_merge_to_output_file() {
    let (temp, first, second) = workspace();
    let out = temp.path().join("merged.info");
    lcovmerge()
        .current_dir(temp.path())
        .args([&first, &second])
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let merged = fs::read_to_string(&out).unwrap();
    assert!(merged.contains("FNDA:7,foo\n"));
    assert!(merged.contains("DA:1,6\n"));
}

#[test]
fn test_root_resolves_relative_sources() {
    let (temp, first, _) = workspace();
    let elsewhere = TempDir::new().unwrap();
    lcovmerge()
        .current_dir(elsewhere.path())
        .arg("--root")
        .arg(temp.path())
        .arg(&first)
        .assert()
        .success()
        .stdout(predicate::str::contains("DA:1,5"));
}

#[test]
fn test_missing_source_fails_without_discard() {
    let (_temp, first, _) = workspace();
    let elsewhere = TempDir::new().unwrap();
    lcovmerge()
        .current_dir(elsewhere.path())
        .arg(&first)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("src/a.c"));

    // Without checksum handling the sources are never read.
    lcovmerge()
        .current_dir(elsewhere.path())
        .arg("-d")
        .arg(&first)
        .assert()
        .success();
}

#[test]
fn test_generate_checksum() {
    let (temp, first, _) = workspace();
    lcovmerge()
        .current_dir(temp.path())
        .arg("--generate-checksum")
        .arg(&first)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("DA:1,5,{LINE1_CHECKSUM}\n")));
}

#[test]
fn test_mismatched_checksum_is_rejected() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/a.c", SOURCE);
    let input = write(
        temp.path(),
        "bad.info",
        "SF:src/a.c\nDA:1,1,1B2M2Y8AsgTpgAmY7PhCfg==\nend_of_record\n",
    );
    lcovmerge()
        .current_dir(temp.path())
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("bad.info:2:"))
        .stderr(predicate::str::contains("checksum mismatch"));

    lcovmerge()
        .current_dir(temp.path())
        .args(["-d", &input])
        .assert()
        .success()
        .stdout(predicate::str::contains("DA:1,1\n"));
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[test]
fn test_grammar_error_reports_location() {
    let temp = TempDir::new().unwrap();
    let input = write(temp.path(), "bad.info", "SF:/a.c\nDA:1,2,3,4\nend_of_record\n");
    lcovmerge()
        .current_dir(temp.path())
        .args(["-d", &input])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("bad.info:2:"))
        .stderr(predicate::str::contains("GrammarError"))
        .stderr(predicate::str::contains("hint: Regenerate the tracefile"));
}

#[test]
fn test_failed_merge_leaves_no_output_file() {
    let temp = TempDir::new().unwrap();
    let input = write(temp.path(), "bad.info", "DA:1,1\n");
    let out = temp.path().join("merged.info");
    lcovmerge()
        .current_dir(temp.path())
        .args(["-d", &input, "-o"])
        .arg(&out)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("a TN and/or SF record is missing"));
    assert!(!out.exists());
}

#[test]
fn test_missing_input_file() {
    let temp = TempDir::new().unwrap();
    lcovmerge()
        .current_dir(temp.path())
        .arg("absent.info")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.info"));
}

#[test]
fn test_unwritable_output_file() {
    let (temp, first, _) = workspace();
    let out = temp.path().join("no-such-dir").join("merged.info");
    lcovmerge()
        .current_dir(temp.path())
        .arg(&first)
        .arg("-o")
        .arg(&out)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to write file"));
    assert!(!out.exists());
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_discovered_config_applies() {
    let (temp, first, _) = workspace();
    write(temp.path(), "lcovmerge.toml", "[checksum]\ngenerate = true\n");
    lcovmerge()
        .current_dir(temp.path())
        .arg(&first)
        .assert()
        .success()
        .stdout(predicate::str::contains(LINE1_CHECKSUM));
}

#[test]
fn test_explicit_config_and_cli_precedence() {
    let (temp, first, _) = workspace();
    let config = write(
        temp.path(),
        "conf/custom.toml",
        "[checksum]\ndiscard = true\n\n[sources]\nroot = \"/nonexistent\"\n",
    );
    // discard from the config means the bogus root is never consulted.
    lcovmerge()
        .current_dir(temp.path())
        .args(["--config", &config, &first])
        .assert()
        .success();

    // --root on the command line wins over the config file.
    lcovmerge()
        .current_dir(temp.path())
        .args(["--config", &config, "-g", "--root"])
        .arg(temp.path())
        .arg(&first)
        .assert()
        .success()
        .stdout(predicate::str::contains(LINE1_CHECKSUM));
}

#[test]
fn test_config_root_is_relative_to_config_file() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/a.c", SOURCE);
    write(temp.path(), "lcovmerge.toml", "[sources]\nroot = \"src\"\n");
    let input = write(temp.path(), "a.info", "SF:a.c\nDA:1,3\nend_of_record\n");
    let build = temp.path().join("build");
    fs::create_dir_all(&build).unwrap();

    lcovmerge()
        .current_dir(&build)
        .args(["-g", &input])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("DA:1,3,{LINE1_CHECKSUM}\n")));
}

#[test]
fn test_invalid_config_is_error() {
    let (temp, first, _) = workspace();
    let config = write(temp.path(), "bad.toml", "[log]\nlevel = \"loud\"\n");
    lcovmerge()
        .current_dir(temp.path())
        .args(["--config", &config, &first])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load config"))
        .stderr(predicate::str::contains("hint:").not());
}
