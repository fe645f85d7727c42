//! Integration tests for the instrace CLI subcommands.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use instrace::codec::push_i32;
use instrace::EventKind;
use tempfile::TempDir;

/// Run instrace with the given arguments, returning the full Output.
fn run_instrace(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_instrace"))
        .args(args)
        .output()
        .expect("Failed to run instrace")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp path is not UTF-8")
}

/// Writes a schema config and persists it with `instrace scheme`.
fn write_scheme(dir: &TempDir) -> PathBuf {
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        r#"{
            "method_entry_exit": true,
            "events": {
                "NEW": ["LOC", "OBJ"],
                "GETFIELD_PRIMITIVE": ["BASE_OBJ", "FLD_OR_IDX"]
            }
        }"#,
    )
    .unwrap();

    let scheme = dir.path().join("scheme.json");
    let output = run_instrace(&[
        "scheme",
        "--config",
        path_str(&config),
        "--output",
        path_str(&scheme),
    ]);
    assert!(
        output.status.success(),
        "scheme failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    scheme
}

fn rec(buf: &mut Vec<u8>, kind: EventKind, values: &[i32]) {
    buf.push(kind.opcode());
    for v in values {
        push_i32(buf, *v);
    }
}

#[test]
fn test_transform_print_validate() {
    let dir = TempDir::new().unwrap();
    let scheme = write_scheme(&dir);

    let crude = dir.path().join("crude.trace");
    let mut bytes = Vec::new();
    rec(&mut bytes, EventKind::AllocBegin, &[5, 1]);
    rec(&mut bytes, EventKind::GetfieldPrimitive, &[3, 7]);
    rec(&mut bytes, EventKind::AllocEnd, &[5, 1, 42]);
    fs::write(&crude, bytes).unwrap();

    let fin = dir.path().join("final.trace");
    let output = run_instrace(&[
        "transform",
        "--scheme",
        path_str(&scheme),
        "--crude",
        path_str(&crude),
        "--final",
        path_str(&fin),
    ]);
    assert!(
        output.status.success(),
        "transform failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = run_instrace(&[
        "print",
        "--scheme",
        path_str(&scheme),
        "--trace",
        path_str(&fin),
    ]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "NEW 5 -1 42\nGETFIELD_PRIMITIVE -1 -1 3 7\n"
    );

    let output = run_instrace(&[
        "print",
        "--scheme",
        path_str(&scheme),
        "--trace",
        path_str(&fin),
        "--format",
        "json",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(first["kind"], "NEW");
    assert_eq!(first["OBJ"], 42);

    let output = run_instrace(&[
        "validate",
        "--scheme",
        path_str(&scheme),
        "--trace",
        path_str(&fin),
        "--block-size",
        "1",
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("2 events, valid"));

    let output = run_instrace(&[
        "print",
        "--scheme",
        path_str(&scheme),
        "--trace",
        path_str(&fin),
        "--block-size",
        "3",
    ]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "NEW 5 -1 42\nGETFIELD_PRIMITIVE -1 -1 3 7\n"
    );

    // The crude trace still holds allocation begin/end records.
    let output = run_instrace(&[
        "validate",
        "--scheme",
        path_str(&scheme),
        "--trace",
        path_str(&crude),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_failed_transform_removes_final_trace() {
    let dir = TempDir::new().unwrap();
    let scheme = write_scheme(&dir);

    let crude = dir.path().join("crude.trace");
    let mut bytes = Vec::new();
    rec(&mut bytes, EventKind::AllocBegin, &[5, 1]);
    rec(&mut bytes, EventKind::GetfieldPrimitive, &[3, 7]);
    fs::write(&crude, bytes).unwrap();

    let fin = dir.path().join("final.trace");
    let output = run_instrace(&[
        "transform",
        "--scheme",
        path_str(&scheme),
        "--crude",
        path_str(&crude),
        "--final",
        path_str(&fin),
    ]);
    assert!(!output.status.success());
    assert!(!fin.exists());
}

#[test]
fn test_bad_scheme_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{ "events": { "NEW": ["BASE_OBJ"] } }"#).unwrap();

    let output = run_instrace(&[
        "scheme",
        "--config",
        path_str(&config),
        "--output",
        path_str(&dir.path().join("scheme.json")),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot carry field BASE_OBJ"));
}
