//! Student repository discovery.
//!
//! GitHub Classroom creates student repositories from a template instead of
//! forking it, so there is no platform relationship linking a student repo to
//! its assignment. Discovery therefore walks every repository of the
//! organization, keeps those whose name looks like the assignment (see
//! [`is_classroom_child`]) and attributes each one to the roster students
//! listed as its collaborators.
//!
//! Walking an organization is slow, so results are memoized per base repo in a
//! JSON file ([`RepoCache`]). Cached entries are never invalidated
//! automatically: delete the file (or run `clear-cache`) after new student
//! repositories are created. The file is not locked; run one resolver at a time.

use crate::error::{ClassroomError, Result};
use crate::github::{RepoHost, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// login -> repositories, in discovery order
pub type StudentRepos = BTreeMap<String, Vec<Repository>>;

/// base repo name -> login -> full repo names
pub type CacheContents = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Decide whether `child` is a student copy of the assignment `parent`.
///
/// Only names are compared: with an `assignment_prefix` the child must start
/// with it, otherwise with the parent's own name. This is a heuristic and will
/// misfire on overlapping names such as `lab` and `lab_extra`.
pub fn is_classroom_child(parent: &str, child: &str, assignment_prefix: Option<&str>) -> bool {
    match assignment_prefix {
        Some(prefix) => child.starts_with(prefix),
        None => child.starts_with(parent),
    }
}

/// JSON file memoizing resolver results
#[derive(Debug, Clone)]
pub struct RepoCache {
    path: PathBuf,
}

impl RepoCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole cache; a missing file is an empty cache
    pub fn read(&self) -> Result<CacheContents> {
        if !self.path.exists() {
            return Ok(CacheContents::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Cached logins for one base repo, if present
    pub fn get(&self, base_repo: &str) -> Result<Option<BTreeMap<String, Vec<String>>>> {
        Ok(self.read()?.remove(base_repo))
    }

    /// Replace the entry for `base_repo`, keeping every other entry.
    pub fn store(&self, base_repo: &str, entry: BTreeMap<String, Vec<String>>) -> Result<()> {
        let mut cache = self.read()?;
        cache.insert(base_repo.to_string(), entry);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so an interrupted run never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&cache)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Delete the cache file. Returns whether there was one.
    pub fn clear(&self) -> Result<bool> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Maps roster students to their copies of an assignment
pub struct StudentRepoResolver<'a> {
    host: &'a dyn RepoHost,
    organization: String,
    cache: RepoCache,
    show_progress: bool,
}

impl<'a> StudentRepoResolver<'a> {
    pub fn new(host: &'a dyn RepoHost, organization: String, cache: RepoCache) -> Self {
        Self {
            host,
            organization,
            cache,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Find each student's repositories for `base_repo`.
    ///
    /// With `use_cache`, a cached entry for `base_repo.name` is returned as is
    /// (names looked up again through the host) without enumerating the
    /// organization. Otherwise the organization is walked and the cache entry
    /// for `base_repo.name` is rewritten.
    pub async fn resolve(
        &self,
        base_repo: &Repository,
        student_logins: &[String],
        assignment_prefix: Option<&str>,
        use_cache: bool,
    ) -> Result<StudentRepos> {
        if use_cache {
            if let Some(entry) = self.cache.get(&base_repo.name)? {
                debug!(base = %base_repo.name, "using cached student repos");
                return self.load_cached(entry).await;
            }
        }

        let student_repos = self
            .enumerate(base_repo, student_logins, assignment_prefix)
            .await?;

        let entry = student_repos
            .iter()
            .map(|(login, repos)| {
                (
                    login.clone(),
                    repos.iter().map(|r| r.full_name.clone()).collect(),
                )
            })
            .collect();
        self.cache.store(&base_repo.name, entry)?;

        Ok(student_repos)
    }

    async fn load_cached(&self, entry: BTreeMap<String, Vec<String>>) -> Result<StudentRepos> {
        let mut student_repos = StudentRepos::new();
        for (login, names) in entry {
            let mut repos = Vec::with_capacity(names.len());
            for name in &names {
                repos.push(self.host.get_repo(name).await?);
            }
            student_repos.insert(login, repos);
        }
        Ok(student_repos)
    }

    async fn enumerate(
        &self,
        base_repo: &Repository,
        student_logins: &[String],
        assignment_prefix: Option<&str>,
    ) -> Result<StudentRepos> {
        let org = self
            .host
            .find_organization(&self.organization)
            .await
            .map_err(|e| match e {
                ClassroomError::RemoteApi { status: 404, .. } => ClassroomError::config(format!(
                    "organization '{}' not found",
                    self.organization
                )),
                other => other,
            })?;

        let logins: HashSet<&str> = student_logins.iter().map(String::as_str).collect();
        let progress = self.progress_bar(org.repo_count());
        let mut student_repos = StudentRepos::new();
        let mut page = 1;

        loop {
            let repos = self.host.list_org_repos(&org.login, page).await?;
            let last_page = repos.len() < crate::github::PAGE_SIZE;

            for repo in repos {
                progress.inc(1);
                if !is_classroom_child(&base_repo.name, &repo.name, assignment_prefix) {
                    continue;
                }

                for collaborator in self.host.list_collaborators(&repo.full_name).await? {
                    if logins.contains(collaborator.login.as_str()) {
                        progress.println(format!("{} -> {}", collaborator.login, repo.name));
                        info!(login = %collaborator.login, repo = %repo.name, "matched student repo");
                        student_repos
                            .entry(collaborator.login)
                            .or_default()
                            .push(repo.clone());
                    }
                }
            }

            if last_page {
                break;
            }
            page += 1;
        }

        progress.finish_and_clear();
        Ok(student_repos)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} repos")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar
    }
}
