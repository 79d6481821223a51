use assert_cmd::Command;
use predicates::prelude::*;

fn tcactivate() -> Command {
    Command::cargo_bin("tcactivate").expect("binary built")
}

#[test]
fn no_arguments_is_a_usage_error() {
    tcactivate()
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "[ERROR] Usage: tcactivate <solution-file.sln> <project-name>",
        ));
}

#[test]
fn one_argument_is_a_usage_error() {
    tcactivate()
        .arg("Foo.sln")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[ERROR] Usage:"));
}

#[test]
fn help_exits_zero() {
    tcactivate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("solution-file"));
}

#[test]
fn version_exits_zero() {
    tcactivate().arg("--version").assert().success();
}

// Without a COM runtime the session must fail before any automation
// work, after reporting the resolved context.
#[cfg(not(windows))]
#[test]
fn reports_context_then_fails_without_a_com_runtime() {
    let dir = tempfile::TempDir::new().unwrap();
    let call_dir = dir.path().join("runner");
    std::fs::create_dir(&call_dir).unwrap();

    tcactivate()
        .current_dir(&call_dir)
        .args(["Foo.sln", "MyPlcProj"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[INFO] Call directory:"))
        .stdout(predicate::str::contains("[INFO] Solution:"))
        .stdout(predicate::str::contains("Foo.sln"))
        .stdout(predicate::str::contains("[STEP] Initializing the XAE shell..."))
        .stdout(predicate::str::contains("requires a Windows COM apartment"));
}

#[cfg(not(windows))]
#[test]
fn custom_prog_id_from_config_file_shows_up_in_the_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let call_dir = dir.path().join("runner");
    std::fs::create_dir(&call_dir).unwrap();
    let config = dir.path().join("activate.yaml");
    std::fs::write(&config, "prog_id: \"TcXaeShell.DTE.15.0\"\n").unwrap();

    tcactivate()
        .current_dir(&call_dir)
        .args(["Foo.sln", "MyPlcProj", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("TcXaeShell.DTE.15.0"));
}
