//! Application configuration and environment variable parsing.
//!
//! Settings come from the environment (optionally seeded from a .env file). `AppConfig`
//! carries the target repository, the credential used for every API call, and the
//! thresholds that drive the stale sweep.

use crate::sweep::SweepConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "rust-lang").
    pub owner: String,
    /// The name of the repository (e.g., "rust").
    pub repo: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, repo))
                if !owner.trim().is_empty() && !repo.trim().is_empty() && !repo.contains('/') =>
            {
                Ok(RepoId {
                    owner: owner.trim().to_string(),
                    repo: repo.trim().to_string(),
                })
            }
            _ => Err(format!("invalid repository '{s}', expected owner/repo")),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Repository to operate on, in `owner/repo` form.
    #[serde(deserialize_with = "deserialize_repo_id")]
    pub github_repository: RepoId,

    /// Pre-issued bearer token sent with every request.
    pub github_token: String,

    /// Overrides the API base URL (GitHub Enterprise, mock servers).
    pub github_api_url: Option<String>,

    /// Label a maintainer applies when waiting on the author.
    #[serde(default = "default_response_requested_label")]
    pub response_requested_label: String,

    /// Label applied once an issue has waited too long and is about to be closed.
    #[serde(default = "default_closing_soon_label")]
    pub closing_soon_label: String,

    /// Days after `response_requested_label` is applied before the issue is marked.
    #[serde(default = "default_days_before_stale")]
    pub days_before_stale: i64,

    /// Days after `closing_soon_label` is applied before the issue is closed.
    #[serde(default = "default_days_before_close")]
    pub days_before_close: i64,

    #[serde(default)]
    pub exempt_pull_requests: bool,

    /// Log the actions a sweep would take without applying them.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_response_requested_label() -> String {
    "response-requested".to_string()
}

fn default_closing_soon_label() -> String {
    "closing-soon".to_string()
}

fn default_days_before_stale() -> i64 {
    7
}

fn default_days_before_close() -> i64 {
    4
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            response_requested_label: self.response_requested_label.clone(),
            closing_soon_label: self.closing_soon_label.clone(),
            days_before_stale: self.days_before_stale,
            days_before_close: self.days_before_close,
            exempt_pull_requests: self.exempt_pull_requests,
            dry_run: self.dry_run,
        }
    }
}

fn deserialize_repo_id<'de, D>(deserializer: D) -> Result<RepoId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
