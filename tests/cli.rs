use std::io::Write;
use std::net::TcpListener;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::NamedTempFile;

fn jobpool() -> Command {
    Command::cargo_bin("jobpool").unwrap()
}

/// An address that is listening and one that is not.
fn targets() -> (TcpListener, String, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let open = listener.local_addr().unwrap().to_string();
    let closed = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().to_string()
    };
    (listener, open, closed)
}

#[test]
fn cli_no_args() {
    jobpool().assert().failure();
}

#[test]
fn cli_version() {
    jobpool()
        .arg("-V")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn probe_reports_only_open_ports() {
    let (_listener, open, closed) = targets();
    jobpool()
        .args(["probe", "--threads", "4", "--timeout-ms", "500"])
        .write_stdin(format!("# targets\n{open}\n\n{closed}\n"))
        .assert()
        .success()
        .stdout(contains(format!("{open} open")).and(contains(format!("{closed} open")).not()));
}

#[test]
fn probe_json_output() {
    let (_listener, open, closed) = targets();
    let output = jobpool()
        .args(["probe", "--json", "--threads", "2"])
        .write_stdin(format!("{open}\n{closed}\n"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["target"], open.as_str());
    assert_eq!(value["addr"], open.as_str());
}

#[test]
fn probe_on_rayon_executor() {
    let (_listener, open, _closed) = targets();
    jobpool()
        .args(["probe", "--executor", "rayon", "--threads", "2"])
        .write_stdin(format!("{open}\n"))
        .assert()
        .success()
        .stdout(contains(format!("{open} open")));
}

#[test]
fn resolve_ip_literal() {
    jobpool()
        .args(["resolve", "--threads", "1"])
        .write_stdin("127.0.0.1\n")
        .assert()
        .success()
        .stdout("127.0.0.1 127.0.0.1\n");
}

#[test]
fn empty_input_succeeds_without_output() {
    jobpool()
        .args(["resolve"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn zero_threads_is_rejected() {
    jobpool()
        .args(["resolve", "--threads", "0"])
        .write_stdin("127.0.0.1\n")
        .assert()
        .failure()
        .stderr(contains("Invalid thread count"));
}

#[test]
fn oversized_thread_count_is_rejected() {
    jobpool()
        .args(["resolve", "--executor", "rayon", "--threads", "4294967296"])
        .write_stdin("127.0.0.1\n")
        .assert()
        .failure()
        .stderr(contains("Invalid thread count: 4294967296"));
}

#[test]
fn config_file_sets_pool() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"threads": 2, "interval_ms": 1}}"#).unwrap();

    jobpool()
        .args(["resolve", "--config"])
        .arg(config.path())
        .env_remove("RUST_LOG")
        .write_stdin("127.0.0.1\n")
        .assert()
        .success()
        .stdout(contains("127.0.0.1"))
        .stderr(contains("2 workers"));
}

#[test]
fn bad_config_file_fails() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, "not json").unwrap();

    jobpool()
        .args(["resolve", "--config"])
        .arg(config.path())
        .write_stdin("127.0.0.1\n")
        .assert()
        .failure()
        .stderr(contains("Serde error"));
}
