use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// An issue or pull request as returned by the issues API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub state: IssueState,
    /// Only set for pull requests; its contents are never inspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|label| label.name.as_str())
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.label_names().any(|label| label == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Labeled,
    Unlabeled,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

/// One entry of an issue timeline. Entries such as commits carry no timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event: EventKind,
    #[serde(default)]
    pub label: Option<Label>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actor: Option<Actor>,
}

pub type Timeline = Vec<TimelineEvent>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStateFilter {
    Open,
    Closed,
    All,
}

impl IssueStateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStateFilter::Open => "open",
            IssueStateFilter::Closed => "closed",
            IssueStateFilter::All => "all",
        }
    }
}

/// Criteria for listing issues. The default filter sends no parameters at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssueFilter {
    pub state: Option<IssueStateFilter>,
    pub labels: Vec<String>,
}

impl IssueFilter {
    pub fn open_with_label(label: &str) -> Self {
        Self {
            state: Some(IssueStateFilter::Open),
            labels: vec![label.to_string()],
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(state) = self.state {
            pairs.push(("state", state.as_str().to_string()));
        }
        if !self.labels.is_empty() {
            pairs.push(("labels", self.labels.join(",")));
        }
        pairs
    }
}

/// Result of a mutating call: the HTTP status is passed through untouched.
#[derive(Clone, Debug)]
pub struct ApiResponse<T> {
    pub status: u16,
    /// Decoded body, present only for 2xx responses.
    pub data: Option<T>,
    /// GitHub's error message for non-2xx responses.
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A non-2xx answer to a read operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitHub API returned {}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}
