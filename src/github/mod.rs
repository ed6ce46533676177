pub mod client;

#[cfg(test)]
pub mod fake;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repositories requested per page when enumerating an organization
pub const PAGE_SIZE: usize = 100;

/// A GitHub organization the authenticated user belongs to
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Organization {
    pub login: String,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub total_private_repos: u64,
}

impl Organization {
    /// Number of repositories enumeration is expected to visit
    pub fn repo_count(&self) -> u64 {
        self.public_repos + self.total_private_repos
    }
}

/// Remote repository identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository name
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Line counts of a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub additions: u64,
    pub deletions: u64,
    pub total: u64,
}

/// A commit as reported by the API
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Full commit hash
    pub sha: String,
    /// Link to the commit on github.com
    pub html_url: String,
    /// Author timestamp
    pub author_date: DateTime<Utc>,
    /// Full commit message
    pub message: String,
    /// Only present when the commit was fetched individually
    pub stats: Option<CommitStats>,
}

/// A user with access to a repository
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Collaborator {
    pub login: String,
}

/// Collaborator permission level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Pull,
    Push,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Pull => "pull",
            Permission::Push => "push",
            Permission::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the rest of the tool needs from the hosting platform.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Find one of the authenticated user's organizations by login.
    async fn find_organization(&self, name: &str) -> Result<Organization>;

    /// One page (1-based) of an organization's repositories.
    async fn list_org_repos(&self, org: &str, page: u32) -> Result<Vec<Repository>>;

    async fn get_repo(&self, full_name: &str) -> Result<Repository>;

    async fn list_collaborators(&self, full_name: &str) -> Result<Vec<Collaborator>>;

    /// All commits reachable from the default branch, newest first, without stats.
    async fn list_commits(
        &self,
        full_name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>>;

    /// A single commit with stats. `reference` may be a sha or a branch name.
    async fn get_commit(&self, full_name: &str, reference: &str) -> Result<Commit>;

    async fn create_from_template(
        &self,
        template_full_name: &str,
        owner: &str,
        name: &str,
        private: bool,
    ) -> Result<Repository>;

    async fn delete_repo(&self, full_name: &str) -> Result<()>;

    async fn add_collaborator(
        &self,
        full_name: &str,
        login: &str,
        permission: Permission,
    ) -> Result<()>;
}

/// Join an owner and a repo name, leaving names that already carry an owner alone.
pub fn full_name(owner: &str, repo: &str) -> String {
    if repo.contains('/') {
        repo.to_string()
    } else {
        format!("{}/{}", owner, repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        assert_eq!(full_name("org", "lab_web"), "org/lab_web");
        assert_eq!(full_name("org", "other/lab_web"), "other/lab_web");
    }

    #[test]
    fn test_permission_serialization() {
        assert_eq!(serde_json::to_string(&Permission::Push).unwrap(), "\"push\"");
        assert_eq!(Permission::Admin.to_string(), "admin");
    }

    #[test]
    fn test_repository_defaults() {
        let repo: Repository =
            serde_json::from_str(r#"{"name": "lab", "full_name": "org/lab"}"#).unwrap();
        assert_eq!(repo.default_branch, "main");
        assert!(!repo.private);
    }

    #[test]
    fn test_organization_repo_count() {
        let org = Organization {
            login: "org".to_string(),
            public_repos: 3,
            total_private_repos: 40,
        };
        assert_eq!(org.repo_count(), 43);
    }
}
