//! In-memory `RepoHost` used by the unit tests.

use crate::error::{ClassroomError, Result};
use crate::github::{
    Collaborator, Commit, Organization, Permission, RepoHost, Repository, PAGE_SIZE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeHost {
    pub organization: Option<Organization>,
    pub repos: Vec<Repository>,
    pub collaborators: BTreeMap<String, Vec<String>>,
    /// Newest first, keyed by full name
    pub commits: BTreeMap<String, Vec<Commit>>,
    /// Logins whose collaborator add is rejected
    pub rejected_logins: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
    pub added: Mutex<Vec<(String, String, Permission)>>,
    pub deleted: Mutex<Vec<String>>,
}

pub fn repo(owner: &str, name: &str) -> Repository {
    Repository {
        name: name.to_string(),
        full_name: format!("{}/{}", owner, name),
        default_branch: "main".to_string(),
        clone_url: format!("https://github.com/{}/{}.git", owner, name),
        html_url: format!("https://github.com/{}/{}", owner, name),
        private: true,
    }
}

pub fn commit(sha: &str, date: DateTime<Utc>, message: &str) -> Commit {
    Commit {
        sha: sha.to_string(),
        html_url: format!("https://github.com/commit/{}", sha),
        author_date: date,
        message: message.to_string(),
        stats: None,
    }
}

impl FakeHost {
    pub fn new(org: &str) -> Self {
        Self {
            organization: Some(Organization {
                login: org.to_string(),
                public_repos: 0,
                total_private_repos: 0,
            }),
            ..Default::default()
        }
    }

    pub fn with_repo(mut self, name: &str, collaborators: &[&str]) -> Self {
        let org = self
            .organization
            .as_ref()
            .map(|o| o.login.clone())
            .unwrap_or_default();
        let repo = repo(&org, name);
        self.collaborators.insert(
            repo.full_name.clone(),
            collaborators.iter().map(|c| c.to_string()).collect(),
        );
        self.repos.push(repo);
        if let Some(org) = self.organization.as_mut() {
            org.total_private_repos += 1;
        }
        self
    }

    pub fn with_commits(mut self, full_name: &str, commits: Vec<Commit>) -> Self {
        self.commits.insert(full_name.to_string(), commits);
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Number of recorded calls whose name starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn missing(what: &str) -> ClassroomError {
        ClassroomError::RemoteApi {
            status: 404,
            message: format!("{} Not Found", what),
        }
    }
}

#[async_trait]
impl RepoHost for FakeHost {
    async fn find_organization(&self, name: &str) -> Result<Organization> {
        self.record(format!("find_organization {}", name));
        self.organization
            .clone()
            .filter(|o| o.login == name)
            .ok_or_else(|| ClassroomError::config(format!("organization '{}' not found", name)))
    }

    async fn list_org_repos(&self, org: &str, page: u32) -> Result<Vec<Repository>> {
        self.record(format!("list_org_repos {} {}", org, page));
        let start = (page.max(1) as usize - 1) * PAGE_SIZE;
        Ok(self.repos.iter().skip(start).take(PAGE_SIZE).cloned().collect())
    }

    async fn get_repo(&self, full_name: &str) -> Result<Repository> {
        self.record(format!("get_repo {}", full_name));
        self.repos
            .iter()
            .find(|r| r.full_name == full_name)
            .cloned()
            .ok_or_else(|| Self::missing(full_name))
    }

    async fn list_collaborators(&self, full_name: &str) -> Result<Vec<Collaborator>> {
        self.record(format!("list_collaborators {}", full_name));
        Ok(self
            .collaborators
            .get(full_name)
            .map(|logins| {
                logins
                    .iter()
                    .map(|login| Collaborator {
                        login: login.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// `since` is compared with the author date. GitHub filters on the
    /// committer date; the fake commits never tell the two apart, so tests
    /// must not depend on the difference.
    async fn list_commits(
        &self,
        full_name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>> {
        self.record(format!("list_commits {}", full_name));
        let commits = self
            .commits
            .get(full_name)
            .ok_or_else(|| Self::missing(full_name))?;
        Ok(commits
            .iter()
            .filter(|c| since.map_or(true, |s| c.author_date >= s))
            .cloned()
            .collect())
    }

    async fn get_commit(&self, full_name: &str, reference: &str) -> Result<Commit> {
        self.record(format!("get_commit {} {}", full_name, reference));
        let commits = self
            .commits
            .get(full_name)
            .ok_or_else(|| Self::missing(full_name))?;
        // Anything that is not a known sha is treated as a branch name
        commits
            .iter()
            .find(|c| c.sha == reference)
            .or_else(|| commits.first())
            .cloned()
            .map(|mut c| {
                let stats = c.stats.unwrap_or(crate::github::CommitStats {
                    additions: c.message.len() as u64,
                    deletions: 1,
                    total: c.message.len() as u64 + 1,
                });
                c.stats = Some(stats);
                c
            })
            .ok_or_else(|| Self::missing(reference))
    }

    async fn create_from_template(
        &self,
        template_full_name: &str,
        owner: &str,
        name: &str,
        private: bool,
    ) -> Result<Repository> {
        self.record(format!("create_from_template {} {}", template_full_name, name));
        if !self.repos.iter().any(|r| r.full_name == template_full_name) {
            return Err(Self::missing(template_full_name));
        }
        let mut created = repo(owner, name);
        created.private = private;
        Ok(created)
    }

    async fn delete_repo(&self, full_name: &str) -> Result<()> {
        self.record(format!("delete_repo {}", full_name));
        if !self.repos.iter().any(|r| r.full_name == full_name) {
            return Err(Self::missing(full_name));
        }
        self.deleted.lock().unwrap().push(full_name.to_string());
        Ok(())
    }

    async fn add_collaborator(
        &self,
        full_name: &str,
        login: &str,
        permission: Permission,
    ) -> Result<()> {
        self.record(format!("add_collaborator {} {}", full_name, login));
        if self.rejected_logins.contains(login) {
            return Err(ClassroomError::RemoteApi {
                status: 422,
                message: format!("{} is not a valid user", login),
            });
        }
        self.added
            .lock()
            .unwrap()
            .push((full_name.to_string(), login.to_string(), permission));
        Ok(())
    }
}
