// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

use assert_cmd::Command;

#[test]
fn no_arguments_prints_help_and_exits_2() {
    Command::cargo_bin("touchfs")
        .unwrap()
        .assert()
        .code(2);
}

#[test]
fn version_prints_the_crate_version() {
    Command::cargo_bin("touchfs")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicates::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn context_renders_a_blob_for_a_real_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.py"), "print('hello')\n").unwrap();

    Command::cargo_bin("touchfs")
        .unwrap()
        .args(["context", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicates::str::contains("# Context Information"))
        .stdout(predicates::str::contains("# File: main.py"));
}

#[test]
fn umount_refuses_unknown_mountpoints() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("touchfs")
        .unwrap()
        .args(["umount", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicates::str::contains("not a mounted touchfs filesystem"));
}
