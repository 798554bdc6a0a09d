//! Authenticated GitHub API access: pull-request metadata and diffs in,
//! comments, statuses, and reviewer requests out.

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::CredentialBroker;
use crate::error::{Error, Result};
use crate::review::{RepoId, ReviewComment};

const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const ACCEPT_DIFF: &str = "application/vnd.github.v3.diff";

/// Status context under which commit statuses are published.
const STATUS_CONTEXT: &str = "reviewbotics/review";

/// Retry budget for idempotent reads; writes are attempted once.
const READ_ATTEMPTS: u32 = 3;
const READ_BACKOFF_MS: u64 = 500;

const MAX_SUGGESTED_REVIEWERS: usize = 3;

#[derive(Debug, Clone)]
pub struct PullRequestMetadata {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    /// Provider-reported PR state, informational only.
    pub state: String,
    pub head_sha: String,
    pub head_ref: String,
    pub base_ref: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    title: Option<String>,
    body: Option<String>,
    state: String,
    user: UserResponse,
    head: GitRefResponse,
    base: GitRefResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitRefResponse {
    sha: String,
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct ContributorResponse {
    login: String,
}

pub struct GitHubClient {
    client: Client,
    api_base: String,
    broker: Arc<CredentialBroker>,
}

impl GitHubClient {
    pub fn new(broker: Arc<CredentialBroker>, api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            broker,
        })
    }

    pub async fn get_pull_request(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<PullRequestMetadata> {
        let url = format!("{}/repos/{repo}/pulls/{number}", self.api_base);
        let resource = format!("pull request {repo}#{number}");

        let response = self
            .send(repo, Method::GET, &url, ACCEPT_JSON, None, &resource, true)
            .await?;

        let pr: PullRequestResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("malformed pull request response: {e}")))?;

        info!(
            repo = %repo,
            number = pr.number,
            head = %pr.head.sha,
            "fetched pull request metadata"
        );

        Ok(PullRequestMetadata {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            body: pr.body,
            author: pr.user.login,
            state: pr.state,
            head_sha: pr.head.sha,
            head_ref: pr.head.ref_name,
            base_ref: pr.base.ref_name,
        })
    }

    /// Fetch the raw unified diff for a pull request.
    pub async fn get_diff(&self, repo: &RepoId, number: u64) -> Result<String> {
        let url = format!("{}/repos/{repo}/pulls/{number}", self.api_base);
        let resource = format!("pull request {repo}#{number}");

        let response = self
            .send(repo, Method::GET, &url, ACCEPT_DIFF, None, &resource, true)
            .await?;

        let diff = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read diff body: {e}")))?;
        info!(repo = %repo, number, bytes = diff.len(), "fetched pull request diff");
        Ok(diff)
    }

    /// Publish a single review comment. Line-level observations go to the
    /// pull-request review comment API; diff-level ones become issue
    /// comments.
    pub async fn post_review_comment(
        &self,
        repo: &RepoId,
        number: u64,
        head_sha: &str,
        comment: &ReviewComment,
    ) -> Result<()> {
        let resource = format!("pull request {repo}#{number}");
        let rendered = format_comment(comment);

        match comment.line_number {
            Some(line) => {
                let url = format!("{}/repos/{repo}/pulls/{number}/comments", self.api_base);
                let body = serde_json::json!({
                    "body": rendered,
                    "commit_id": head_sha,
                    "path": comment.file_path,
                    "line": line,
                    "side": "RIGHT",
                });
                self.send(repo, Method::POST, &url, ACCEPT_JSON, Some(&body), &resource, false)
                    .await?;
            }
            None => {
                let url = format!("{}/repos/{repo}/issues/{number}/comments", self.api_base);
                let body = serde_json::json!({ "body": rendered });
                self.send(repo, Method::POST, &url, ACCEPT_JSON, Some(&body), &resource, false)
                    .await?;
            }
        }
        Ok(())
    }

    /// Publish one summary comment covering all review comments.
    pub async fn post_summary(
        &self,
        repo: &RepoId,
        number: u64,
        comments: &[ReviewComment],
    ) -> Result<()> {
        let url = format!("{}/repos/{repo}/issues/{number}/comments", self.api_base);
        let resource = format!("pull request {repo}#{number}");
        let body = serde_json::json!({ "body": format_summary(comments) });

        self.send(repo, Method::POST, &url, ACCEPT_JSON, Some(&body), &resource, false)
            .await?;
        info!(repo = %repo, number, comments = comments.len(), "posted review summary");
        Ok(())
    }

    /// Publish a commit status on the PR head. `state` is one of the
    /// provider's status states (pending, success, failure, error).
    pub async fn update_commit_status(
        &self,
        repo: &RepoId,
        sha: &str,
        state: &str,
        description: &str,
    ) -> Result<()> {
        let url = format!("{}/repos/{repo}/statuses/{sha}", self.api_base);
        let resource = format!("commit {repo}@{sha}");
        let body = serde_json::json!({
            "state": state,
            "description": description,
            "context": STATUS_CONTEXT,
        });

        self.send(repo, Method::POST, &url, ACCEPT_JSON, Some(&body), &resource, false)
            .await?;
        Ok(())
    }

    /// Suggest reviewers from the repository's contributors, excluding
    /// the PR author.
    pub async fn suggest_reviewers(
        &self,
        repo: &RepoId,
        exclude_author: Option<&str>,
    ) -> Result<Vec<String>> {
        let url = format!("{}/repos/{repo}/contributors?per_page=10", self.api_base);
        let resource = format!("contributors of {repo}");

        let response = self
            .send(repo, Method::GET, &url, ACCEPT_JSON, None, &resource, true)
            .await?;

        let contributors: Vec<ContributorResponse> = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("malformed contributors response: {e}")))?;

        Ok(contributors
            .into_iter()
            .map(|c| c.login)
            .filter(|login| Some(login.as_str()) != exclude_author)
            .take(MAX_SUGGESTED_REVIEWERS)
            .collect())
    }

    pub async fn request_reviewers(
        &self,
        repo: &RepoId,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        if reviewers.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/repos/{repo}/pulls/{number}/requested_reviewers",
            self.api_base
        );
        let resource = format!("pull request {repo}#{number}");
        let body = serde_json::json!({ "reviewers": reviewers });

        self.send(repo, Method::POST, &url, ACCEPT_JSON, Some(&body), &resource, false)
            .await?;
        info!(repo = %repo, number, count = reviewers.len(), "requested reviewers");
        Ok(())
    }

    /// Issue one authenticated request, with a forced token refresh and
    /// single retry on auth rejection, bounded backoff on transient
    /// failures for idempotent reads, and typed mapping of the rest.
    async fn send(
        &self,
        repo: &RepoId,
        method: Method,
        url: &str,
        accept: &str,
        body: Option<&serde_json::Value>,
        resource: &str,
        idempotent: bool,
    ) -> Result<reqwest::Response> {
        let mut refreshed = false;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = self.broker.get_token(repo).await?;

            let mut request = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bearer {}", token.secret()))
                .header("Accept", accept);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if idempotent && attempt < READ_ATTEMPTS => {
                    warn!(error = %err, attempt, "transient network failure, retrying");
                    tokio::time::sleep(Duration::from_millis(READ_BACKOFF_MS * attempt as u64))
                        .await;
                    continue;
                }
                Err(err) => return Err(Error::Network(err.to_string())),
            };

            match response.status() {
                StatusCode::NOT_FOUND => return Err(Error::NotFound(resource.to_string())),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if !refreshed => {
                    warn!(resource, "auth rejected, refreshing token and retrying once");
                    refreshed = true;
                    self.broker.invalidate(&repo.owner).await;
                    continue;
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(Error::Auth(format!(
                        "provider rejected credentials for {resource}"
                    )))
                }
                status if status.is_server_error() && idempotent && attempt < READ_ATTEMPTS => {
                    warn!(status = %status, attempt, "transient provider failure, retrying");
                    tokio::time::sleep(Duration::from_millis(READ_BACKOFF_MS * attempt as u64))
                        .await;
                    continue;
                }
                status if !status.is_success() => {
                    return Err(Error::Provider {
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    });
                }
                _ => return Ok(response),
            }
        }
    }
}

fn format_comment(comment: &ReviewComment) -> String {
    let mut rendered = format!(
        "**{}** [{}] {}",
        comment.severity,
        comment.category.as_str(),
        comment.body
    );
    if let Some(fix) = &comment.suggested_fix {
        rendered.push_str(&format!("\n\nSuggested fix: {fix}"));
    }
    rendered
}

/// Render the review summary comment body.
pub fn format_summary(comments: &[ReviewComment]) -> String {
    if comments.is_empty() {
        return "## Automated review\n\nNo issues found.".to_string();
    }

    let mut summary = format!(
        "## Automated review\n\n{} issue(s) found:\n\n",
        comments.len()
    );
    for comment in comments {
        let location = match comment.line_number {
            Some(line) => format!("`{}` line {line}", comment.file_path),
            None => format!("`{}`", comment.file_path),
        };
        summary.push_str(&format!(
            "- {location} — **{}** [{}] {}\n",
            comment.severity,
            comment.category.as_str(),
            comment.body
        ));
    }
    summary
}
