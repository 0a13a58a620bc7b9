//! GitHub REST client.

use landit_core::gateway::{CheckRun, Credential, PullRequest, PullRequestDraft};
use landit_core::Result;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::GitHubError;

const USER_AGENT: &str = "landit-worker";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub API client.
///
/// The token is read from the credential file on every request, so a
/// rotated secret is picked up without a restart.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    credential: Credential,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, credential: Credential) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GitHubError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let token = self.credential.read_token()?;
        let mut request = self
            .client
            .request(method.clone(), url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, url, "GitHub request");
        let response = request
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;
        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api {
                status: status.as_u16(),
                message: format!("{what}: {}", error_message(&text)),
            }
            .into());
        }
        let value = response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(format!("{what}: {e}")))?;
        Ok(value)
    }

    /// Fetch a repository; `None` when it does not exist.
    pub async fn get_repo(&self, owner: &str, repo: &str) -> Result<Option<GitHubRepo>> {
        let response = self
            .send(Method::GET, &self.repo_url(owner, repo), None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(response, "get repository").await.map(Some)
    }

    /// Create a repository under an organization, falling back to the
    /// authenticated user's account when `owner` is not an organization.
    pub async fn create_repo(&self, owner: &str, repo: &str, private: bool) -> Result<GitHubRepo> {
        let payload = serde_json::json!({
            "name": repo,
            "private": private,
            "auto_init": true,
        });

        let org_url = format!("{}/orgs/{}/repos", self.api_url, urlencoding::encode(owner));
        let response = self.send(Method::POST, &org_url, Some(&payload)).await?;
        if response.status() != StatusCode::NOT_FOUND {
            let created: GitHubRepo = Self::parse(response, "create organization repository").await?;
            info!(repo = %created.full_name, "Repository created");
            return Ok(created);
        }

        let user_url = format!("{}/user/repos", self.api_url);
        let response = self.send(Method::POST, &user_url, Some(&payload)).await?;
        let created: GitHubRepo = Self::parse(response, "create user repository").await?;
        if created.owner.login != owner {
            return Err(GitHubError::Api {
                status: StatusCode::FORBIDDEN.as_u16(),
                message: format!(
                    "created {} but the job targets owner {owner}",
                    created.full_name
                ),
            }
            .into());
        }
        info!(repo = %created.full_name, "Repository created");
        Ok(created)
    }

    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        draft: &PullRequestDraft,
    ) -> Result<PullRequest> {
        let url = format!("{}/pulls", self.repo_url(owner, repo));
        let payload = serde_json::to_value(draft)?;
        let response = self.send(Method::POST, &url, Some(&payload)).await?;
        let created: GitHubPullRequest = Self::parse(response, "create pull request").await?;
        info!(url = %created.html_url, "Pull request opened");
        Ok(PullRequest {
            url: created.html_url,
            head_sha: created.head.sha,
        })
    }

    pub async fn get_branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        let encoded: Vec<String> = branch
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        let url = format!(
            "{}/git/ref/heads/{}",
            self.repo_url(owner, repo),
            encoded.join("/")
        );
        let response = self.send(Method::GET, &url, None).await?;
        let reference: GitReference = Self::parse(response, "get branch ref").await?;
        Ok(reference.object.sha)
    }

    pub async fn list_check_runs(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<CheckRun>> {
        let url = format!(
            "{}/commits/{}/check-runs?per_page=100",
            self.repo_url(owner, repo),
            urlencoding::encode(sha)
        );
        let response = self.send(Method::GET, &url, None).await?;
        let runs: CheckRunsResponse = Self::parse(response, "list check runs").await?;
        Ok(runs
            .check_runs
            .into_iter()
            .map(|run| CheckRun {
                name: run.name,
                status: run.status,
                conclusion: run.conclusion,
            })
            .collect())
    }
}

/// Pull the `message` field out of a GitHub error body when there is one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}

/// GitHub repository information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
    pub owner: RepoOwner,
    pub private: bool,
    pub default_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubPullRequest {
    html_url: String,
    head: PullRequestHead,
}

#[derive(Debug, Deserialize)]
struct PullRequestHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitReference {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunsResponse {
    check_runs: Vec<GitHubCheckRun>,
}

#[derive(Debug, Deserialize)]
struct GitHubCheckRun {
    name: String,
    status: String,
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
