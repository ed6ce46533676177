use crate::error::{ClassroomError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, warn};

/// Directory a student repo is cloned into:
/// `{course_dir}/{section?}/{lab}/{repo_name}`
pub fn clone_path(course_dir: &Path, section: Option<&str>, lab: &str, repo_name: &str) -> PathBuf {
    lab_path(course_dir, section, lab).join(repo_name)
}

/// Directory holding every clone of one lab
pub fn lab_path(course_dir: &Path, section: Option<&str>, lab: &str) -> PathBuf {
    match section {
        Some(section) => course_dir.join(section).join(lab),
        None => course_dir.join(lab),
    }
}

/// Outcome of a successful `git` invocation
#[derive(Debug, Clone, Default)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `git` with `args` in the current directory
fn run_git(args: &[&str]) -> Result<GitOutput> {
    let command = format!("git {}", args.join(" "));
    debug!(%command, "running");

    let Output {
        status,
        stdout,
        stderr,
    } = Command::new("git").args(args).output()?;

    let stdout = String::from_utf8_lossy(&stdout).to_string();
    let stderr = String::from_utf8_lossy(&stderr).to_string();

    if !status.success() {
        return Err(ClassroomError::LocalProcess { command, stderr });
    }

    Ok(GitOutput { stdout, stderr })
}

/// Result of `clone_repo`
#[derive(Debug, Clone)]
pub struct Cloned {
    pub output: GitOutput,
    /// The target directory was already there before cloning
    pub into_existing: bool,
}

/// Clone `remote_url` into `target_dir`, creating it first.
///
/// An existing directory is not an error here; git decides whether it can
/// clone into it and the caller is told through [`Cloned::into_existing`].
pub fn clone_repo(remote_url: &str, target_dir: &Path) -> Result<Cloned> {
    let into_existing = target_dir.exists();
    if into_existing {
        debug!(dir = %target_dir.display(), "directory already exists, cloning into it");
    } else {
        debug!(dir = %target_dir.display(), "creating directory");
        fs::create_dir_all(target_dir)?;
    }

    let target = target_dir.to_string_lossy();
    let output = run_git(&["clone", remote_url, target.as_ref()])?;
    Ok(Cloned {
        output,
        into_existing,
    })
}

/// Changes the process working directory and restores it when dropped.
///
/// The working directory is process-wide; only one guard may be live at a time.
pub struct DirGuard {
    original: PathBuf,
}

impl DirGuard {
    pub fn enter(dir: &Path) -> Result<Self> {
        let original = env::current_dir()?;
        env::set_current_dir(dir)?;
        Ok(Self { original })
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.original) {
            warn!(dir = %self.original.display(), error = %e, "could not restore working directory");
        }
    }
}

/// What happened to one clone during `pull_all`
#[derive(Debug)]
pub struct PullResult {
    pub name: String,
    pub path: PathBuf,
    pub outcome: Result<GitOutput>,
}

/// Summary of a `pull_all` run
#[derive(Debug, Default)]
pub struct PullReport {
    pub results: Vec<PullResult>,
    /// Subdirectories without a `.git` entry
    pub skipped: Vec<String>,
}

impl PullReport {
    pub fn no_repos_found(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }
}

/// A directory is a clone when it contains a `.git` entry
pub fn is_clone(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Run `git pull` in every immediate subdirectory of `base_dir` that is a clone.
///
/// Each pull runs from inside the clone; the working directory is restored
/// after every repo whether or not the pull succeeded.
pub fn pull_all(base_dir: &Path) -> Result<PullReport> {
    if !base_dir.is_dir() {
        return Err(ClassroomError::DirectoryNotFound(base_dir.to_path_buf()));
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(base_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    entries.sort();

    let mut report = PullReport::default();
    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if !is_clone(&path) {
            report.skipped.push(name);
            continue;
        }

        let outcome = DirGuard::enter(&path).and_then(|_guard| run_git(&["pull"]));
        report.results.push(PullResult {
            name,
            path,
            outcome,
        });
    }

    Ok(report)
}

/// Held by tests that change (or depend on) the working directory
#[cfg(test)]
pub(crate) static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
