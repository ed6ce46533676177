use crate::error::{ClassroomError, Result};
use crate::github::{
    Collaborator, Commit, CommitStats, Organization, Permission, RepoHost, Repository, PAGE_SIZE,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("classroom-repos/", env!("CARGO_PKG_VERSION"));

/// Authenticated GitHub REST client
pub struct GitHubClient {
    token: String,
    client: Client,
    base_url: String,
}

impl GitHubClient {
    /// Create a new client. An empty token is rejected before any request is made.
    pub fn new(token: String) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(ClassroomError::MissingConfig(
                "GitHub access token is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            token,
            client,
            base_url: GITHUB_API_URL.to_string(),
        })
    }

    /// Point the client at another API root (GitHub Enterprise)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", GITHUB_API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClassroomError::RemoteApi {
                status: status.as_u16(),
                message: api_error_message(&error_text),
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        debug!(path, "GET");
        let response = self.send(self.request(Method::GET, path).query(query)).await?;
        Ok(response.json().await?)
    }

    /// Fetch one page of a list endpoint
    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        page: u32,
        extra: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut query = vec![("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())];
        query.extend(extra.iter().cloned());
        self.get_json(path, &query).await
    }

    /// Fetch every page of a list endpoint
    async fn get_all<T: DeserializeOwned>(&self, path: &str, extra: &[(&str, String)]) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<T> = self.get_page(path, page, extra).await?;
            let done = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if done {
                return Ok(items);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl RepoHost for GitHubClient {
    async fn find_organization(&self, name: &str) -> Result<Organization> {
        let memberships: Vec<OrgMembership> = self.get_all("/user/orgs", &[]).await?;

        match memberships.into_iter().find(|org| org.login == name) {
            Some(org) => self.get_json(&format!("/orgs/{}", org.login), &[]).await,
            None => Err(ClassroomError::config(format!(
                "organization '{}' not found among the authenticated user's organizations",
                name
            ))),
        }
    }

    async fn list_org_repos(&self, org: &str, page: u32) -> Result<Vec<Repository>> {
        self.get_page(
            &format!("/orgs/{}/repos", org),
            page,
            &[("type", "all".to_string())],
        )
        .await
    }

    async fn get_repo(&self, full_name: &str) -> Result<Repository> {
        self.get_json(&format!("/repos/{}", full_name), &[]).await
    }

    async fn list_collaborators(&self, full_name: &str) -> Result<Vec<Collaborator>> {
        self.get_all(&format!("/repos/{}/collaborators", full_name), &[])
            .await
    }

    async fn list_commits(
        &self,
        full_name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>> {
        let mut extra = Vec::new();
        if let Some(since) = since {
            extra.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        match self
            .get_all::<ApiCommit>(&format!("/repos/{}/commits", full_name), &extra)
            .await
        {
            Ok(commits) => Ok(commits.into_iter().map(Commit::from).collect()),
            // Empty repositories answer 409 Conflict
            Err(e) if e.status() == Some(StatusCode::CONFLICT.as_u16()) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn get_commit(&self, full_name: &str, reference: &str) -> Result<Commit> {
        let commit: ApiCommit = self
            .get_json(&format!("/repos/{}/commits/{}", full_name, reference), &[])
            .await?;
        Ok(commit.into())
    }

    async fn create_from_template(
        &self,
        template_full_name: &str,
        owner: &str,
        name: &str,
        private: bool,
    ) -> Result<Repository> {
        let body = GenerateRequest {
            owner: owner.to_string(),
            name: name.to_string(),
            private,
        };
        let request = self
            .request(Method::POST, &format!("/repos/{}/generate", template_full_name))
            .json(&body);
        Ok(self.send(request).await?.json().await?)
    }

    async fn delete_repo(&self, full_name: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &format!("/repos/{}", full_name)))
            .await?;
        Ok(())
    }

    async fn add_collaborator(
        &self,
        full_name: &str,
        login: &str,
        permission: Permission,
    ) -> Result<()> {
        let request = self
            .request(
                Method::PUT,
                &format!("/repos/{}/collaborators/{}", full_name, login),
            )
            .json(&CollaboratorRequest { permission });
        self.send(request).await?;
        Ok(())
    }
}

/// Pull the `message` field out of a GitHub error body, if there is one
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}

#[derive(Debug, Deserialize)]
struct OrgMembership {
    login: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    owner: String,
    name: String,
    private: bool,
}

#[derive(Debug, Serialize)]
struct CollaboratorRequest {
    permission: Permission,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    #[serde(default)]
    html_url: String,
    commit: ApiCommitDetail,
    stats: Option<CommitStats>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: Option<ApiSignature>,
    committer: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
    date: DateTime<Utc>,
}

impl From<ApiCommit> for Commit {
    fn from(api: ApiCommit) -> Self {
        let author_date = api
            .commit
            .author
            .or(api.commit.committer)
            .map(|sig| sig.date)
            .unwrap_or_default();

        Commit {
            sha: api.sha,
            html_url: api.html_url,
            author_date,
            message: api.commit.message,
            stats: api.stats,
        }
    }
}
