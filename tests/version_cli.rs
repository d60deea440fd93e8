use assert_cmd::Command;

#[test]
fn version_flag_prints_crate_version() {
    let expected = format!("suggestion-bridge {}\n", env!("CARGO_PKG_VERSION"));
    let assert = Command::new(assert_cmd::cargo::cargo_bin!("suggestion-bridge"))
        .arg("--version")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())
        .expect("stdout should be valid UTF-8");
    assert_eq!(stdout, expected);
}

#[test]
fn check_reports_missing_installation() {
    let support = tempfile::tempdir().expect("create temp support dir");
    let assert = Command::new(assert_cmd::cargo::cargo_bin!("suggestion-bridge"))
        .arg("check")
        .arg("--support-dir")
        .arg(support.path())
        .arg("--executable")
        .arg("suggestd-missing-for-test")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())
        .expect("stdout should be valid UTF-8");
    assert_eq!(stdout, "not installed\n");
}

#[test]
fn check_reports_outdated_installation() {
    let support = tempfile::tempdir().expect("create temp support dir");
    let bin = support.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(bin.join("suggestd"), b"").unwrap();
    std::fs::write(bin.join("VERSION"), b"0.9.0\n").unwrap();

    let assert = Command::new(assert_cmd::cargo::cargo_bin!("suggestion-bridge"))
        .arg("check")
        .arg("--support-dir")
        .arg(support.path())
        .arg("--min-version")
        .arg("1.0.0")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())
        .expect("stdout should be valid UTF-8");
    assert_eq!(stdout, "outdated 0.9.0 (requires 1.0.0)\n");
}
