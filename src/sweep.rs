//! The stale-issue sweep.
//!
//! A sweep walks the open issues waiting on their authors and moves each one along:
//! 1. Issues whose `response_requested_label` has sat longer than `days_before_stale`
//!    get the `closing_soon_label`.
//! 2. Issues whose `closing_soon_label` has sat longer than `days_before_close` are closed.
//! 3. Issues that still carry `closing_soon_label` after a maintainer removed
//!    `response_requested_label` are unmarked.
//!
//! Label ages come from each issue's timeline, never from the issue's update time.

use crate::github::IssueApi;
use crate::predicates::{is_older_than, is_pr, issue_label_date};
use crate::types::{Issue, IssueFilter};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepConfig {
    pub response_requested_label: String,
    pub closing_soon_label: String,
    pub days_before_stale: i64,
    pub days_before_close: i64,
    pub exempt_pull_requests: bool,
    pub dry_run: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            response_requested_label: "response-requested".to_string(),
            closing_soon_label: "closing-soon".to_string(),
            days_before_stale: 7,
            days_before_close: 4,
            exempt_pull_requests: false,
            dry_run: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAction {
    MarkClosingSoon,
    Close,
    Unmark,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweepEntry {
    pub issue: u64,
    pub action: SweepAction,
    /// HTTP status of each request made for the action; empty on a dry run.
    pub statuses: Vec<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub entries: Vec<SweepEntry>,
    /// Issues inspected but left alone.
    pub skipped: Vec<u64>,
}

impl SweepReport {
    pub fn count(&self, action: SweepAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }
}

/// Runs one sweep over the repository behind `api`.
///
/// # Arguments
/// * `api` - The issue operations to use.
/// * `config` - Labels and thresholds that drive the sweep.
/// * `now` - The reference time for label ages.
///
/// Requests are made one at a time. The first transport or read error aborts the sweep;
/// a rejected mutation is recorded in the report and the sweep moves on.
pub async fn sweep(
    api: &dyn IssueApi,
    config: &SweepConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<SweepReport> {
    let mut report = SweepReport::default();

    let waiting_filter = IssueFilter::open_with_label(&config.response_requested_label);
    let waiting = api.get_issues(&waiting_filter).await?;

    for issue in &waiting {
        if config.exempt_pull_requests && is_pr(issue) {
            report.skipped.push(issue.number);
            continue;
        }

        match plan(api, config, issue, now).await? {
            Some(action) => {
                let statuses = apply(api, config, issue.number, action).await?;
                report.entries.push(SweepEntry {
                    issue: issue.number,
                    action,
                    statuses,
                });
            }
            None => report.skipped.push(issue.number),
        }
    }

    let marked_filter = IssueFilter::open_with_label(&config.closing_soon_label);
    let marked = api.get_issues(&marked_filter).await?;

    for issue in marked
        .iter()
        .filter(|issue| !issue.has_label(&config.response_requested_label))
    {
        if config.exempt_pull_requests && is_pr(issue) {
            report.skipped.push(issue.number);
            continue;
        }
        let statuses = apply(api, config, issue.number, SweepAction::Unmark).await?;
        report.entries.push(SweepEntry {
            issue: issue.number,
            action: SweepAction::Unmark,
            statuses,
        });
    }

    tracing::info!(
        marked = report.count(SweepAction::MarkClosingSoon),
        closed = report.count(SweepAction::Close),
        unmarked = report.count(SweepAction::Unmark),
        skipped = report.skipped.len(),
        dry_run = config.dry_run,
        "Sweep finished"
    );

    Ok(report)
}

/// Decides what should happen to an issue carrying the response-requested label.
async fn plan(
    api: &dyn IssueApi,
    config: &SweepConfig,
    issue: &Issue,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<SweepAction>> {
    let timeline = api.get_issue_timeline(issue.number).await?;

    let (label, threshold, action) = if issue.has_label(&config.closing_soon_label) {
        (
            &config.closing_soon_label,
            config.days_before_close,
            SweepAction::Close,
        )
    } else {
        (
            &config.response_requested_label,
            config.days_before_stale,
            SweepAction::MarkClosingSoon,
        )
    };

    let Some(applied_at) = issue_label_date(&timeline, label) else {
        tracing::warn!(
            issue = issue.number,
            label = %label,
            "Label not found in timeline, skipping"
        );
        return Ok(None);
    };

    if is_older_than(applied_at, threshold, now) {
        Ok(Some(action))
    } else {
        tracing::debug!(
            issue = issue.number,
            label = %label,
            %applied_at,
            "Label is still fresh"
        );
        Ok(None)
    }
}

async fn apply(
    api: &dyn IssueApi,
    config: &SweepConfig,
    number: u64,
    action: SweepAction,
) -> anyhow::Result<Vec<u16>> {
    if config.dry_run {
        tracing::info!(issue = number, ?action, "Dry run, not applying");
        return Ok(Vec::new());
    }

    let closing_soon = [config.closing_soon_label.clone()];
    let statuses = match action {
        SweepAction::MarkClosingSoon => {
            let response = api.add_labels(number, &closing_soon).await?;
            vec![response.status]
        }
        SweepAction::Close => vec![api.close_issue(number).await?.status],
        SweepAction::Unmark => api
            .remove_labels(number, &closing_soon)
            .await?
            .into_iter()
            .map(|response| response.status)
            .collect(),
    };

    for status in &statuses {
        if (200..300).contains(status) {
            tracing::info!(issue = number, ?action, status, "Applied action");
        } else {
            tracing::warn!(issue = number, ?action, status, "GitHub rejected action");
        }
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiResponse, EventKind, IssueState, Label, Timeline, TimelineEvent};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for GitHub that records every mutation.
    #[derive(Default)]
    struct FakeApi {
        issues: Vec<Issue>,
        timelines: HashMap<u64, Timeline>,
        /// Status returned by label removals; 200 when unset.
        remove_status: Option<u16>,
        /// Issue whose timeline fetch fails as if the transport broke.
        broken_timeline: Option<u64>,
        broken_queries: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn ok<T>(status: u16, data: Option<T>) -> ApiResponse<T> {
        ApiResponse {
            status,
            data,
            message: None,
        }
    }

    #[async_trait]
    impl IssueApi for FakeApi {
        async fn get_issues(&self, filter: &IssueFilter) -> anyhow::Result<Vec<Issue>> {
            if self.broken_queries {
                anyhow::bail!("connection reset");
            }
            Ok(self
                .issues
                .iter()
                .filter(|issue| issue.state == IssueState::Open)
                .filter(|issue| filter.labels.iter().all(|label| issue.has_label(label)))
                .cloned()
                .collect())
        }

        async fn add_labels(
            &self,
            number: u64,
            labels: &[String],
        ) -> anyhow::Result<ApiResponse<Vec<Label>>> {
            self.record(format!("add {number} {}", labels.join(",")));
            Ok(ok(200, Some(vec![])))
        }

        async fn remove_label(
            &self,
            number: u64,
            label: &str,
        ) -> anyhow::Result<ApiResponse<Vec<Label>>> {
            self.record(format!("remove {number} {label}"));
            match self.remove_status {
                Some(status) => Ok(ApiResponse {
                    status,
                    data: None,
                    message: Some("Label does not exist".to_string()),
                }),
                None => Ok(ok(200, Some(vec![]))),
            }
        }

        async fn set_state(
            &self,
            number: u64,
            state: IssueState,
        ) -> anyhow::Result<ApiResponse<Issue>> {
            self.record(format!("state {number} {state:?}"));
            Ok(ok(200, None))
        }

        async fn get_issue_timeline(&self, number: u64) -> anyhow::Result<Timeline> {
            if self.broken_timeline == Some(number) {
                anyhow::bail!("timeline for #{number} timed out");
            }
            Ok(self.timelines.get(&number).cloned().unwrap_or_default())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn issue(number: u64, labels: &[&str]) -> Issue {
        Issue {
            number,
            title: format!("Issue {number}"),
            labels: labels
                .iter()
                .map(|name| Label {
                    name: name.to_string(),
                })
                .collect(),
            state: IssueState::Open,
            pull_request: None,
            created_at: now() - Duration::days(60),
            updated_at: now() - Duration::days(1),
        }
    }

    fn labeled(label: &str, days_ago: i64) -> TimelineEvent {
        TimelineEvent {
            event: EventKind::Labeled,
            label: Some(Label {
                name: label.to_string(),
            }),
            created_at: Some(now() - Duration::days(days_ago)),
            actor: None,
        }
    }

    fn calls(api: &FakeApi) -> Vec<String> {
        api.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_marks_issue_waiting_too_long() {
        let api = FakeApi {
            issues: vec![issue(1, &["response-requested"])],
            timelines: HashMap::from([(1, vec![labeled("response-requested", 8)])]),
            ..Default::default()
        };

        let report = sweep(&api, &SweepConfig::default(), now()).await.unwrap();

        assert_eq!(
            report.entries,
            vec![SweepEntry {
                issue: 1,
                action: SweepAction::MarkClosingSoon,
                statuses: vec![200],
            }]
        );
        assert_eq!(calls(&api), vec!["add 1 closing-soon"]);
    }

    #[tokio::test]
    async fn test_fresh_label_is_left_alone() {
        let api = FakeApi {
            issues: vec![issue(1, &["response-requested"])],
            timelines: HashMap::from([(1, vec![labeled("response-requested", 7)])]),
            ..Default::default()
        };

        let report = sweep(&api, &SweepConfig::default(), now()).await.unwrap();

        assert!(report.entries.is_empty());
        assert_eq!(report.skipped, vec![1]);
        assert!(calls(&api).is_empty());
    }

    #[tokio::test]
    async fn test_closes_issue_after_closing_soon_expires() {
        let expired = vec![
            labeled("response-requested", 20),
            labeled("closing-soon", 5),
        ];
        let fresh = vec![
            labeled("response-requested", 20),
            labeled("closing-soon", 2),
        ];
        let api = FakeApi {
            issues: vec![
                issue(1, &["response-requested", "closing-soon"]),
                issue(2, &["response-requested", "closing-soon"]),
            ],
            timelines: HashMap::from([(1, expired), (2, fresh)]),
            ..Default::default()
        };

        let report = sweep(&api, &SweepConfig::default(), now()).await.unwrap();

        assert_eq!(report.count(SweepAction::Close), 1);
        assert_eq!(report.skipped, vec![2]);
        assert_eq!(calls(&api), vec!["state 1 Closed"]);
    }

    #[tokio::test]
    async fn test_unmarks_issue_after_response() {
        let api = FakeApi {
            issues: vec![issue(3, &["closing-soon"])],
            ..Default::default()
        };

        let report = sweep(&api, &SweepConfig::default(), now()).await.unwrap();

        assert_eq!(report.count(SweepAction::Unmark), 1);
        assert_eq!(calls(&api), vec!["remove 3 closing-soon"]);
    }

    #[tokio::test]
    async fn test_skips_pull_requests_when_exempt() {
        let mut pr = issue(4, &["response-requested"]);
        pr.pull_request = Some(serde_json::json!({}));
        let api = FakeApi {
            issues: vec![pr],
            timelines: HashMap::from([(4, vec![labeled("response-requested", 30)])]),
            ..Default::default()
        };
        let config = SweepConfig {
            exempt_pull_requests: true,
            ..Default::default()
        };

        let report = sweep(&api, &config, now()).await.unwrap();

        assert!(report.entries.is_empty());
        assert_eq!(report.skipped, vec![4]);
    }

    #[tokio::test]
    async fn test_dry_run_records_without_mutating() {
        let api = FakeApi {
            issues: vec![
                issue(1, &["response-requested"]),
                issue(3, &["closing-soon"]),
            ],
            timelines: HashMap::from([(1, vec![labeled("response-requested", 30)])]),
            ..Default::default()
        };
        let config = SweepConfig {
            dry_run: true,
            ..Default::default()
        };

        let report = sweep(&api, &config, now()).await.unwrap();

        assert_eq!(report.count(SweepAction::MarkClosingSoon), 1);
        assert_eq!(report.count(SweepAction::Unmark), 1);
        assert!(report.entries.iter().all(|e| e.statuses.is_empty()));
        assert!(calls(&api).is_empty());
    }

    #[tokio::test]
    async fn test_skips_issue_without_label_history() {
        let api = FakeApi {
            issues: vec![issue(5, &["response-requested"])],
            ..Default::default()
        };

        let report = sweep(&api, &SweepConfig::default(), now()).await.unwrap();

        assert!(report.entries.is_empty());
        assert_eq!(report.skipped, vec![5]);
    }

    #[tokio::test]
    async fn test_exempt_pull_request_is_not_unmarked() {
        let mut pr = issue(6, &["closing-soon"]);
        pr.pull_request = Some(serde_json::json!({}));
        let api = FakeApi {
            issues: vec![pr],
            ..Default::default()
        };
        let config = SweepConfig {
            exempt_pull_requests: true,
            ..Default::default()
        };

        let report = sweep(&api, &config, now()).await.unwrap();

        assert!(report.entries.is_empty());
        assert_eq!(report.skipped, vec![6]);
        assert!(calls(&api).is_empty());
    }

    #[tokio::test]
    async fn test_api_error_aborts_sweep() {
        let api = FakeApi {
            issues: vec![
                issue(1, &["response-requested"]),
                issue(2, &["response-requested"]),
                issue(3, &["response-requested"]),
                issue(4, &["closing-soon"]),
            ],
            timelines: HashMap::from([
                (1, vec![labeled("response-requested", 30)]),
                (3, vec![labeled("response-requested", 30)]),
            ]),
            broken_timeline: Some(2),
            ..Default::default()
        };

        let err = sweep(&api, &SweepConfig::default(), now())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("#2"));
        assert_eq!(calls(&api), vec!["add 1 closing-soon"]);
    }

    #[tokio::test]
    async fn test_failed_query_aborts_before_any_mutation() {
        let api = FakeApi {
            issues: vec![issue(3, &["closing-soon"])],
            broken_queries: true,
            ..Default::default()
        };

        let result = sweep(&api, &SweepConfig::default(), now()).await;

        assert!(result.is_err());
        assert!(calls(&api).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_action_status_is_reported() {
        let api = FakeApi {
            issues: vec![issue(3, &["closing-soon"]), issue(4, &["closing-soon"])],
            remove_status: Some(404),
            ..Default::default()
        };

        let report = sweep(&api, &SweepConfig::default(), now()).await.unwrap();

        assert_eq!(
            report.entries,
            vec![
                SweepEntry {
                    issue: 3,
                    action: SweepAction::Unmark,
                    statuses: vec![404],
                },
                SweepEntry {
                    issue: 4,
                    action: SweepAction::Unmark,
                    statuses: vec![404],
                },
            ]
        );
        assert_eq!(
            calls(&api),
            vec!["remove 3 closing-soon", "remove 4 closing-soon"]
        );
    }
}
