//! GitHub REST client implementing the issue, pull-request, and preview contracts.
//!
//! Files are committed through the git data API (one tree, one commit, one ref
//! update) so a push is a single atomic change on the branch. Branch and pull
//! request creation tolerate "already exists" so a resumed stage is safe.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use shipwright_config::GithubConfig;
use shipwright_utils::error::AdapterError;
use shipwright_utils::redaction::redact_secrets;

use crate::contracts::{
    ArtifactFile, CheckStatus, IssueSource, PreviewAdapter, PreviewStatus, PullRequest,
    PullRequestAdapter, PullRequestRequest,
};

const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    repo: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Issue {
    title: String,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    tree: GitObject,
}

#[derive(Debug, Deserialize)]
struct PullPayload {
    number: u64,
    html_url: String,
    #[serde(default)]
    head: Option<PullHead>,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CheckRuns {
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CheckRun {
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeploymentStatus {
    pub state: String,
    #[serde(default)]
    pub environment_url: Option<String>,
}

impl GitHubClient {
    /// # Errors
    ///
    /// `AdapterError::Transport` if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    /// # Errors
    ///
    /// `AdapterError::Unconfigured` when no repository is set or the token
    /// variable is missing.
    pub fn from_config(config: &GithubConfig) -> Result<Self, AdapterError> {
        let repo = config
            .repo
            .clone()
            .ok_or_else(|| AdapterError::Unconfigured("github.repo".to_string()))?;
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                AdapterError::Unconfigured(format!("GitHub token (${})", config.token_env))
            })?;
        Self::new(&config.api_base, repo, token)
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.repo, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", concat!("shipwright/", env!("CARGO_PKG_VERSION")))
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<(StatusCode, String), AdapterError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(redact_secrets(&e.to_string())))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::Transport(redact_secrets(&e.to_string())))?;
        debug!(what = what, status = status.as_u16(), "GitHub response");
        Ok((status, body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, AdapterError> {
        let (status, body) = self.send(builder, what).await?;
        if !status.is_success() {
            return Err(map_status(status, what, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| AdapterError::Transport(format!("Unexpected {what} payload: {e}")))
    }

    async fn head_sha(&self, pr_number: u64) -> Result<String, AdapterError> {
        let pull: PullPayload = self
            .send_json(
                self.client.get(self.url(&format!("pulls/{pr_number}"))),
                "pull request",
            )
            .await?;
        pull.head
            .map(|h| h.sha)
            .ok_or_else(|| AdapterError::Transport("pull request has no head".to_string()))
    }

    async fn find_open_pull(&self, head: &str) -> Result<Option<PullRequest>, AdapterError> {
        let owner = self.repo.split('/').next().unwrap_or_default();
        let pulls: Vec<PullPayload> = self
            .send_json(
                self.client
                    .get(self.url(&format!("pulls?state=open&head={owner}:{head}"))),
                "pull request list",
            )
            .await?;
        Ok(pulls.into_iter().next().map(|p| PullRequest {
            number: p.number,
            url: p.html_url,
        }))
    }
}

/// Map a non-success status to the adapter taxonomy.
pub(crate) fn map_status(status: StatusCode, what: &str, body: &str) -> AdapterError {
    match status.as_u16() {
        404 => AdapterError::NotFound(what.to_string()),
        401 | 403 => AdapterError::Unauthorized(what.to_string()),
        code => AdapterError::Rejected {
            status: code,
            message: redact_secrets(&github_message(body)),
        },
    }
}

fn github_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Accepts `42`, `#42`, or an issue URL ending in the number.
pub(crate) fn parse_issue_number(issue_id: &str) -> Option<u64> {
    let trimmed = issue_id.trim().trim_end_matches('/');
    let tail = trimmed.rsplit('/').next().unwrap_or(trimmed);
    tail.trim_start_matches('#').parse().ok().filter(|n| *n > 0)
}

pub(crate) fn aggregate_checks(runs: &[CheckRun]) -> CheckStatus {
    if runs.is_empty() {
        return CheckStatus::Pending;
    }
    let failed = runs.iter().any(|run| {
        matches!(
            run.conclusion.as_deref(),
            Some("failure" | "cancelled" | "timed_out" | "action_required" | "startup_failure")
        )
    });
    if failed {
        return CheckStatus::Failure;
    }
    if runs.iter().all(|run| run.status == "completed") {
        CheckStatus::Success
    } else {
        CheckStatus::Pending
    }
}

pub(crate) fn first_preview_url(statuses: &[DeploymentStatus]) -> Option<String> {
    statuses
        .iter()
        .filter(|s| s.state == "success")
        .find_map(|s| s.environment_url.clone().filter(|u| !u.is_empty()))
}

/// The issue as requirements text; empty when the body is, since a title alone
/// does not describe an application.
fn issue_requirements(issue: &Issue) -> String {
    let body = issue.body.as_deref().unwrap_or_default().trim();
    if body.is_empty() {
        return String::new();
    }
    format!("# {}\n\n{body}", issue.title)
}

#[async_trait]
impl IssueSource for GitHubClient {
    async fn fetch(&self, issue_id: &str) -> Result<String, AdapterError> {
        let number = parse_issue_number(issue_id)
            .ok_or_else(|| AdapterError::NotFound(format!("issue '{issue_id}'")))?;
        let issue: Issue = self
            .send_json(
                self.client.get(self.url(&format!("issues/{number}"))),
                &format!("issue #{number}"),
            )
            .await?;
        Ok(issue_requirements(&issue))
    }
}

#[async_trait]
impl PullRequestAdapter for GitHubClient {
    async fn create_branch(&self, name: &str, base: &str) -> Result<(), AdapterError> {
        let base_ref: GitRef = self
            .send_json(
                self.client.get(self.url(&format!("git/ref/heads/{base}"))),
                &format!("branch {base}"),
            )
            .await?;

        let (status, body) = self
            .send(
                self.client.post(self.url("git/refs")).json(&json!({
                    "ref": format!("refs/heads/{name}"),
                    "sha": base_ref.object.sha,
                })),
                "create branch",
            )
            .await?;

        if status.is_success() {
            info!(branch = name, base = base, "Created branch");
            return Ok(());
        }
        if status == StatusCode::UNPROCESSABLE_ENTITY
            && github_message(&body).contains("already exists")
        {
            info!(branch = name, "Branch already exists, reusing it");
            return Ok(());
        }
        Err(map_status(status, "create branch", &body))
    }

    async fn push_files(
        &self,
        branch: &str,
        files: &[ArtifactFile],
        message: &str,
    ) -> Result<(), AdapterError> {
        let head: GitRef = self
            .send_json(
                self.client.get(self.url(&format!("git/ref/heads/{branch}"))),
                &format!("branch {branch}"),
            )
            .await?;
        let parent = head.object.sha;
        let commit: Commit = self
            .send_json(
                self.client.get(self.url(&format!("git/commits/{parent}"))),
                "head commit",
            )
            .await?;

        let entries: Vec<Value> = files
            .iter()
            .map(|f| {
                json!({
                    "path": f.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": f.content,
                })
            })
            .collect();
        let tree: GitObject = self
            .send_json(
                self.client.post(self.url("git/trees")).json(&json!({
                    "base_tree": commit.tree.sha,
                    "tree": entries,
                })),
                "tree",
            )
            .await?;
        let new_commit: GitObject = self
            .send_json(
                self.client.post(self.url("git/commits")).json(&json!({
                    "message": message,
                    "tree": tree.sha,
                    "parents": [parent],
                })),
                "commit",
            )
            .await?;
        let _: Value = self
            .send_json(
                self.client
                    .patch(self.url(&format!("git/refs/heads/{branch}")))
                    .json(&json!({ "sha": new_commit.sha })),
                "ref update",
            )
            .await?;

        info!(branch = branch, files = files.len(), "Pushed files");
        Ok(())
    }

    async fn open_pull_request(
        &self,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, AdapterError> {
        let (status, body) = self
            .send(
                self.client.post(self.url("pulls")).json(&json!({
                    "title": request.title,
                    "body": request.body,
                    "head": request.head,
                    "base": request.base,
                    "draft": request.draft,
                })),
                "open pull request",
            )
            .await?;

        if status.is_success() {
            let pull: PullPayload = serde_json::from_str(&body).map_err(|e| {
                AdapterError::Transport(format!("Unexpected pull request payload: {e}"))
            })?;
            info!(number = pull.number, url = %pull.html_url, "Opened pull request");
            return Ok(PullRequest {
                number: pull.number,
                url: pull.html_url,
            });
        }

        if status == StatusCode::UNPROCESSABLE_ENTITY
            && let Some(existing) = self.find_open_pull(&request.head).await?
        {
            info!(number = existing.number, "Pull request already open, reusing it");
            return Ok(existing);
        }
        Err(map_status(status, "open pull request", &body))
    }

    async fn poll_checks(&self, pr_number: u64) -> Result<CheckStatus, AdapterError> {
        let sha = self.head_sha(pr_number).await?;
        let runs: CheckRuns = self
            .send_json(
                self.client.get(self.url(&format!("commits/{sha}/check-runs"))),
                "check runs",
            )
            .await?;
        Ok(aggregate_checks(&runs.check_runs))
    }
}

#[async_trait]
impl PreviewAdapter for GitHubClient {
    async fn resolve_preview_url(&self, pr_number: u64) -> Result<PreviewStatus, AdapterError> {
        let sha = self.head_sha(pr_number).await?;
        let deployments: Vec<Deployment> = self
            .send_json(
                self.client.get(self.url(&format!("deployments?sha={sha}"))),
                "deployments",
            )
            .await?;

        for deployment in deployments {
            let statuses: Vec<DeploymentStatus> = self
                .send_json(
                    self.client
                        .get(self.url(&format!("deployments/{}/statuses", deployment.id))),
                    "deployment statuses",
                )
                .await?;
            if let Some(url) = first_preview_url(&statuses) {
                return Ok(PreviewStatus::Url(url));
            }
        }
        Ok(PreviewStatus::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn run(status: &str, conclusion: Option<&str>) -> CheckRun {
        CheckRun {
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
        }
    }

    /// Serve one canned HTTP response and hand back the request line.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&buf[..read]).to_string();
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request.lines().next().unwrap_or_default().to_string()
        });
        (base, handle)
    }

    #[test]
    fn test_parse_issue_number() {
        assert_eq!(parse_issue_number("42"), Some(42));
        assert_eq!(parse_issue_number("#7"), Some(7));
        assert_eq!(
            parse_issue_number("https://github.com/acme/app/issues/913/"),
            Some(913)
        );
        assert_eq!(parse_issue_number("0"), None);
        assert_eq!(parse_issue_number("abc"), None);
    }

    #[test]
    fn test_aggregate_checks() {
        assert_eq!(aggregate_checks(&[]), CheckStatus::Pending);
        assert_eq!(
            aggregate_checks(&[run("completed", Some("success")), run("in_progress", None)]),
            CheckStatus::Pending
        );
        assert_eq!(
            aggregate_checks(&[run("completed", Some("success")), run("completed", Some("skipped"))]),
            CheckStatus::Success
        );
        assert_eq!(
            aggregate_checks(&[run("in_progress", None), run("completed", Some("failure"))]),
            CheckStatus::Failure
        );
    }

    #[test]
    fn test_first_preview_url_skips_pending_and_empty() {
        let statuses = vec![
            DeploymentStatus {
                state: "pending".to_string(),
                environment_url: Some("https://pending.example".to_string()),
            },
            DeploymentStatus {
                state: "success".to_string(),
                environment_url: Some(String::new()),
            },
            DeploymentStatus {
                state: "success".to_string(),
                environment_url: Some("https://preview.example".to_string()),
            },
        ];
        assert_eq!(
            first_preview_url(&statuses),
            Some("https://preview.example".to_string())
        );
        assert_eq!(first_preview_url(&[]), None);
    }

    #[test]
    fn test_map_status() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "issue #1", ""),
            AdapterError::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "issue #1", ""),
            AdapterError::Unauthorized(_)
        ));
        assert_eq!(
            map_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                "open pull request",
                r#"{"message": "Validation Failed"}"#
            ),
            AdapterError::Rejected {
                status: 422,
                message: "Validation Failed".to_string()
            }
        );
    }

    #[test]
    fn test_from_config_requires_repo() {
        let err = GitHubClient::from_config(&GithubConfig::default()).unwrap_err();
        assert!(matches!(err, AdapterError::Unconfigured(_)));
    }

    #[test]
    fn test_from_config_requires_token() {
        let config = GithubConfig {
            repo: Some("acme/app".to_string()),
            token_env: "SHIPWRIGHT_TEST_TOKEN_THAT_IS_NEVER_SET".to_string(),
            ..GithubConfig::default()
        };
        let err = GitHubClient::from_config(&config).unwrap_err();
        assert!(matches!(err, AdapterError::Unconfigured(_)));
    }

    #[tokio::test]
    async fn test_fetch_issue_formats_title_and_body() {
        let (base, server) =
            serve_once("200 OK", r#"{"title": "Add login", "body": "Users sign in.\n"}"#).await;
        let client = GitHubClient::new(base, "acme/app", "t0k").unwrap();

        let text = client.fetch("#12").await.unwrap();

        assert_eq!(text, "# Add login\n\nUsers sign in.");
        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /repos/acme/app/issues/12 "));
    }

    #[tokio::test]
    async fn test_fetch_missing_issue_is_not_found() {
        let (base, _server) = serve_once("404 Not Found", r#"{"message": "Not Found"}"#).await;
        let client = GitHubClient::new(base, "acme/app", "t0k").unwrap();

        let err = client.fetch("99").await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_issue_without_body_is_empty() {
        for body in [
            r#"{"title": "Add login", "body": null}"#,
            r#"{"title": "Add login", "body": "  \n"}"#,
        ] {
            let (base, _server) = serve_once("200 OK", body).await;
            let client = GitHubClient::new(base, "acme/app", "t0k").unwrap();

            assert_eq!(client.fetch("12").await.unwrap(), "");
        }
    }
}
