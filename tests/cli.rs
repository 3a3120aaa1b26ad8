use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

fn vidthreads() -> Command {
    let mut cmd = Command::cargo_bin("vidthreads").expect("binary builds");
    cmd.env_remove("VIDTHREADS_LOG");
    cmd
}

#[test]
fn prints_version() {
    vidthreads()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    vidthreads()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("vidthreads").and(predicate::str::contains("--version")));
}

#[test]
fn missing_video_is_a_usage_error() {
    vidthreads()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("missing video id or url"));
}

#[test]
fn rejects_unknown_sort() {
    vidthreads()
        .args(["--sort", "hottest", "dQw4w9WgXcQ"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown sort hottest"));
}

#[test]
fn remember_requires_channel() {
    vidthreads()
        .args(["--remember", "native", "dQw4w9WgXcQ"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--remember needs --channel"));
}

#[test]
fn invalid_video_reference_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    vidthreads()
        .args(["--config"])
        .arg(dir.path().join("config.yaml"))
        .arg("https://vimeo.com/12345678")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a YouTube video id or link"));
}

#[test]
fn native_channel_skips_reddit_and_is_saved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");

    vidthreads()
        .args(["--config"])
        .arg(&path)
        .args(["--channel", "UCchannel", "--remember", "native", "dQw4w9WgXcQ"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Channel UCchannel shows its own comments"));

    let saved = fs::read_to_string(&path).expect("config written");
    assert!(saved.contains("UCchannel: native"), "config was: {saved}");

    vidthreads()
        .args(["--config"])
        .arg(&path)
        .args(["--channel", "UCchannel", "https://youtu.be/dQw4w9WgXcQ"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipping Reddit"));
}
