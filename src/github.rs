use crate::config::{AppConfig, RepoId};
use crate::types::{ApiError, ApiResponse, Issue, IssueFilter, IssueState, Label, Timeline};
use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// The issue operations the sweep needs from a code-hosting platform.
///
/// Every method issues its requests sequentially and never retries. Mutations report
/// the HTTP status instead of failing on it; reads fail on any non-2xx status.
#[async_trait]
pub trait IssueApi: Send + Sync {
    /// Lists one page of issues and pull requests matching `filter`.
    async fn get_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    /// Applies all `labels` to the issue in a single request.
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<ApiResponse<Vec<Label>>>;

    async fn remove_label(&self, number: u64, label: &str) -> Result<ApiResponse<Vec<Label>>>;

    async fn set_state(&self, number: u64, state: IssueState) -> Result<ApiResponse<Issue>>;

    /// Fetches the first page of the issue's event timeline.
    async fn get_issue_timeline(&self, number: u64) -> Result<Timeline>;

    /// Removes each label with its own request, one after another.
    async fn remove_labels(
        &self,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<ApiResponse<Vec<Label>>>> {
        let mut responses = Vec::with_capacity(labels.len());
        for label in labels {
            responses.push(self.remove_label(number, label).await?);
        }
        Ok(responses)
    }

    async fn close_issue(&self, number: u64) -> Result<ApiResponse<Issue>> {
        self.set_state(number, IssueState::Closed).await
    }

    async fn reopen_issue(&self, number: u64) -> Result<ApiResponse<Issue>> {
        self.set_state(number, IssueState::Open).await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// `IssueApi` backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    repo: RepoId,
}

impl GitHubClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(config.github_token.clone());
        if let Some(base_url) = &config.github_api_url {
            builder = builder.base_uri(base_url.as_str())?;
        }

        Ok(Self {
            octocrab: builder.build()?,
            repo: config.github_repository.clone(),
        })
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    fn issue_path(&self, number: u64) -> String {
        format!(
            "/repos/{}/{}/issues/{}",
            self.repo.owner, self.repo.repo, number
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, uri: String) -> Result<T> {
        let response = self
            .octocrab
            ._get(uri.as_str())
            .await
            .with_context(|| format!("GET {uri} failed"))?;
        let status = response.status().as_u16();
        let body = self.octocrab.body_to_string(response).await?;

        if !(200..300).contains(&status) {
            return Err(ApiError {
                status,
                message: error_message(&body),
            }
            .into());
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to decode response from {uri}"))
    }
}

#[async_trait]
impl IssueApi for GitHubClient {
    async fn get_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut uri = format!("/repos/{}/{}/issues", self.repo.owner, self.repo.repo);
        let query = filter
            .query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect::<Vec<_>>();
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query.join("&"));
        }

        let issues: Vec<Issue> = self.get_json(uri).await?;
        tracing::debug!(repo = %self.repo, count = issues.len(), "Fetched issues");
        Ok(issues)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<ApiResponse<Vec<Label>>> {
        let uri = format!("{}/labels", self.issue_path(number));
        let body = json!({ "labels": labels });
        let response = self
            .octocrab
            ._post(uri.as_str(), Some(&body))
            .await
            .with_context(|| format!("POST {uri} failed"))?;
        let status = response.status().as_u16();
        let body = self.octocrab.body_to_string(response).await?;

        tracing::debug!(repo = %self.repo, issue = number, ?labels, status, "Added labels");
        into_api_response(status, &body)
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<ApiResponse<Vec<Label>>> {
        let uri = format!(
            "{}/labels/{}",
            self.issue_path(number),
            urlencoding::encode(label)
        );
        let response = self
            .octocrab
            ._delete(uri.as_str(), None::<&()>)
            .await
            .with_context(|| format!("DELETE {uri} failed"))?;
        let status = response.status().as_u16();
        let body = self.octocrab.body_to_string(response).await?;

        tracing::debug!(repo = %self.repo, issue = number, label, status, "Removed label");
        into_api_response(status, &body)
    }

    async fn set_state(&self, number: u64, state: IssueState) -> Result<ApiResponse<Issue>> {
        let uri = self.issue_path(number);
        let body = json!({ "state": state });
        let response = self
            .octocrab
            ._patch(uri.as_str(), Some(&body))
            .await
            .with_context(|| format!("PATCH {uri} failed"))?;
        let status = response.status().as_u16();
        let body = self.octocrab.body_to_string(response).await?;

        tracing::debug!(repo = %self.repo, issue = number, ?state, status, "Updated issue state");
        into_api_response(status, &body)
    }

    async fn get_issue_timeline(&self, number: u64) -> Result<Timeline> {
        let uri = format!("{}/timeline", self.issue_path(number));
        let timeline: Timeline = self.get_json(uri).await?;
        tracing::debug!(
            repo = %self.repo,
            issue = number,
            events = timeline.len(),
            "Fetched timeline"
        );
        Ok(timeline)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|error| error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn into_api_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<ApiResponse<T>> {
    if !(200..300).contains(&status) {
        return Ok(ApiResponse {
            status,
            data: None,
            message: Some(error_message(body)),
        });
    }

    let data = if body.trim().is_empty() {
        None
    } else {
        Some(serde_json::from_str(body).context("Failed to decode response body")?)
    };

    Ok(ApiResponse {
        status,
        data,
        message: None,
    })
}
