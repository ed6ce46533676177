use assert_cmd::prelude::*;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

fn write_config(dir: &Path, token: Option<&str>) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let token_line = token
        .map(|t| format!("github_token = '{}'\n", t))
        .unwrap_or_default();
    let contents = format!(
        "{token_line}default_organization = 'org'\n\
         roster_file = '{roster}'\n\
         project_file = '{projects}'\n\
         cache_file = '{cache}'\n\
         clone_directory = '{clones}'\n",
        roster = dir.join("roster.csv").display(),
        projects = dir.join("projects.csv").display(),
        cache = dir.join("cache.json").display(),
        clones = dir.join("clones").display(),
    );
    fs::write(&path, contents).unwrap();
    path
}

fn write_tables(dir: &Path) {
    fs::write(
        dir.join("roster.csv"),
        "login,name,section\nalice,Alice Chan,A\nbob,Bob Lee,B\n",
    )
    .unwrap();
    fs::write(dir.join("projects.csv"), "project_name,repo\nweb lab,lab_web\n").unwrap();
}

fn run(dir: &TempDir, config: &Path, args: &[&str]) -> Output {
    Command::cargo_bin("classroom-repos")
        .unwrap()
        .current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("CLASSROOM_REPOS_CONFIG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn check_passes_with_token_and_tables() {
    let dir = tempdir().unwrap();
    write_tables(dir.path());
    let config = write_config(dir.path(), Some("ghp_test"));

    let output = run(&dir, &config, &["check"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "ok");
}

#[test]
fn check_lists_every_problem() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("roster.csv"), "login,name\nalice,Alice\n").unwrap();
    let config = write_config(dir.path(), None);

    let output = run(&dir, &config, &["check"]);
    assert!(!output.status.success());
    let out = stdout(&output);
    assert!(out.contains("GITHUB_TOKEN"));
    assert!(out.contains("Roster file must contain a column for section"));
    assert!(out.contains("Project file"));
}

#[test]
fn roster_filters_by_section() {
    let dir = tempdir().unwrap();
    write_tables(dir.path());
    let config = write_config(dir.path(), None);

    let output = run(&dir, &config, &["roster", "--section", "A"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Alice Chan"));
    assert!(!out.contains("Bob Lee"));
    assert!(out.contains("1 students"));
}

#[test]
fn clear_cache_removes_file() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), None);
    let cache = dir.path().join("cache.json");
    fs::write(&cache, r#"{"lab_web": {"alice": ["org/lab_web_alice"]}}"#).unwrap();

    let output = run(&dir, &config, &["clear-cache"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Cache cleared"));
    assert!(!cache.exists());

    let output = run(&dir, &config, &["clear-cache"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("does not exist"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("nested").join("config.toml");

    let output = run(&dir, &config, &["init"]);
    assert!(output.status.success());
    assert!(fs::read_to_string(&config).unwrap().contains("[courses.mwc]"));

    assert!(!run(&dir, &config, &["init"]).status.success());
    assert!(run(&dir, &config, &["init", "--force"]).status.success());
}

#[test]
fn remote_command_without_token_fails_early() {
    let dir = tempdir().unwrap();
    write_tables(dir.path());
    let config = write_config(dir.path(), None);

    let output = run(&dir, &config, &["log", "--lab", "lab_web", "--course", "mwc"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("GITHUB_TOKEN"));
}

#[test]
fn pull_missing_lab_directory_fails() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), None);

    let output = run(&dir, &config, &["pull", "--lab", "lab_web", "--course", "mwc"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Directory not found"));
}
