//! Re-running a phase inside the container when the marker is absent
//!
//! A fake runtime script stands in for docker: it answers the health check and
//! records the arguments of the launch so the command line can be inspected.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn project(config: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("cirun.toml"), config).unwrap();
    tmp
}

fn cirun_on_host(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cirun").unwrap();
    cmd.current_dir(dir)
        .env_remove("CIRUN_IN_CONTAINER")
        .env_remove("CIRUN_IMAGE")
        .env_remove("CIRUN_CONFIG")
        .env_remove("CIRUN_RUNTIME")
        .env_remove("CIRUN_RUNTIME_PATH")
        .env_remove("CIRUN_ASSUME_YES")
        .env_remove("CIRUN_LOG")
        .env_remove("RUST_LOG");
    cmd
}

#[cfg(unix)]
fn fake_runtime(dir: &Path, exit_code: i32) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let args_file = dir.join("runtime-args.txt");
    let script = dir.join("fake-docker");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nif [ \"$1\" = \"version\" ]; then echo '{{}}'; exit 0; fi\nprintf '%s\\n' \"$@\" > '{}'\nexit {}\n",
            args_file.display(),
            exit_code
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, args_file)
}

#[test]
fn missing_runtime_is_gate_error() {
    let tmp = project("image = \"alpine:3.19\"\n[phases]\nscript = \"echo hi\"\n");
    cirun_on_host(tmp.path())
        .args(["--runtime-path", "/nonexistent/cirun-test/docker", "script"])
        .assert()
        .code(69)
        .stdout(predicate::str::contains("hi").not())
        .stderr(predicate::str::contains("not installed"));
}

#[test]
fn missing_image_is_gate_error() {
    let tmp = project("[phases]\nscript = \"echo hi\"\n");
    cirun_on_host(tmp.path())
        .arg("script")
        .assert()
        .code(69)
        .stdout(predicate::str::contains("hi").not());
}

#[test]
fn dry_run_on_host_plans_container_launch() {
    let tmp = project("image = \"alpine:3.19\"\n[phases]\nscript = \"echo hi\"\n");
    let output = cirun_on_host(tmp.path())
        .args(["--runtime-path", "/opt/fake/docker", "--dry-run", "script"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["decision"], "re_exec_in_container");
    assert_eq!(plan["image"], "alpine:3.19");
    assert_eq!(plan["runtime"], "docker");

    let command: Vec<String> = serde_json::from_value(plan["command"].clone()).unwrap();
    assert_eq!(command[0], "/opt/fake/docker");
    assert_eq!(command[1], "run");
    assert!(command.contains(&"CIRUN_IN_CONTAINER=1".to_string()));
    assert_eq!(command.last().map(String::as_str), Some("script"));
}

#[cfg(unix)]
#[test]
#[serial]
fn child_status_is_relayed() {
    let tmp = project("image = \"alpine:3.19\"\n[phases]\nscript = \"echo hi\"\n");
    let (runtime, args_file) = fake_runtime(tmp.path(), 7);

    cirun_on_host(tmp.path())
        .env("DEPLOY_TOKEN", "s3cret-value")
        .arg("--runtime-path")
        .arg(&runtime)
        .arg("script")
        .assert()
        .code(7)
        .stdout(predicate::str::contains("hi").not());

    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(&args[..3], &["run", "--rm", "-i"]);
    assert!(args.contains(&"alpine:3.19"));
    assert!(args.contains(&"CIRUN_IN_CONTAINER=1"));
    assert!(args.contains(&"DEPLOY_TOKEN"));
    assert!(!args.iter().any(|a| a.contains("s3cret-value")));
    let mount = format!("{}:/workspace", tmp.path().canonicalize().unwrap().display());
    assert!(args.contains(&mount.as_str()));
    assert_eq!(args.last(), Some(&"script"));
}

#[cfg(unix)]
#[test]
#[serial]
fn runtime_launch_failure_is_gate_error() {
    let tmp = project("image = \"alpine:3.19\"\n[phases]\nscript = \"echo hi\"\n");
    let (runtime, _) = fake_runtime(tmp.path(), 125);

    cirun_on_host(tmp.path())
        .arg("--runtime-path")
        .arg(&runtime)
        .arg("script")
        .assert()
        .code(69);
}

#[cfg(unix)]
#[test]
#[serial]
fn container_command_replaces_program() {
    let tmp = project(
        "image = \"alpine:3.19\"\ncontainer_command = \"cargo xtask ci\"\n[phases]\nscript = \"true\"\n",
    );
    let (runtime, args_file) = fake_runtime(tmp.path(), 0);

    cirun_on_host(tmp.path())
        .arg("--runtime-path")
        .arg(&runtime)
        .arg("script")
        .assert()
        .success();

    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(&args[args.len() - 4..], &["cargo", "xtask", "ci", "script"]);
}
