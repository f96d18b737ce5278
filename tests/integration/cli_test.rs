use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

const MAX: &str = "|s: int, i: int| if i > s { i } else { s }";

fn foldsynth(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_foldsynth"))
        .args(args)
        .output()
        .expect("Failed to execute foldsynth")
}

fn assert_success(output: &Output) -> String {
    if !output.status.success() {
        panic!(
            "Command failed with status: {:?}\nstderr: {}\nstdout: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_run_with_inputs() {
    let output = foldsynth(&["run", MAX, "--inputs", "[3, 1, 4, 1, 5]"]);
    let stdout = assert_success(&output);
    assert!(stdout.contains("Result: 5"), "stdout: {}", stdout);
    assert!(stdout.contains("Sequential fold agrees"));
}

#[test]
fn test_run_random_partitioned_verbose() {
    let output = foldsynth(&[
        "run",
        MAX,
        "--random",
        "50",
        "--seed",
        "42",
        "--initial=-1000",
        "--partitions",
        "4",
        "--mode",
        "ahead-of-time",
        "--verbose",
    ]);
    let stdout = assert_success(&output);
    assert!(stdout.contains("Mode: ahead-of-time"), "stdout: {}", stdout);
    assert!(stdout.contains("Sequential fold agrees"));
    assert!(stdout.contains("Automaton:"));
    assert!(stdout.contains("Z0 = s"));
    assert!(stdout.contains("Statistics:"));
}

#[test]
fn test_explore_from_file() {
    let path = std::env::temp_dir().join(format!("foldsynth-sum-{}.fold", std::process::id()));
    fs::write(&path, "// running sum\n|s: int, i: int|\n    s + i\n").unwrap();
    let output = foldsynth(&["explore", "--file", path.to_str().unwrap()]);
    let _ = fs::remove_file(&path);
    let stdout = assert_success(&output);
    assert!(stdout.starts_with("Z0 = s\n"), "stdout: {}", stdout);
    assert!(stdout.contains("Z1(g0) = (s + g0)"));
    assert!(!stdout.contains("unresolved"));
}

#[test]
fn test_parse_error_reports_position() {
    let output = foldsynth(&["run", "|s: int, i: int| s +", "--inputs", "1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line 1, column 21"), "stderr: {}", stderr);
}

#[test]
fn test_missing_reducer() {
    let missing = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("no-such-reducer.fold");
    let output = foldsynth(&["explore", "--file", missing.to_str().unwrap()]);
    assert!(!output.status.success());
    let output = foldsynth(&["explore"]);
    assert!(!output.status.success());
}
