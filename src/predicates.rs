//! Pure helpers for deciding whether an issue has gone stale.

use crate::types::{EventKind, Issue, TimelineEvent};
use chrono::{DateTime, Duration, Utc};

/// Returns true if `timestamp` lies more than `threshold_days` days before now.
pub fn issue_date_compare(timestamp: DateTime<Utc>, threshold_days: i64) -> bool {
    is_older_than(timestamp, threshold_days, Utc::now())
}

/// Age check against an explicit reference time.
///
/// # Arguments
/// * `timestamp` - The moment being aged, usually a label application.
/// * `threshold_days` - How many whole days must have passed.
/// * `now` - The reference point for the comparison.
///
/// The comparison is strict: a timestamp exactly `threshold_days` old is not older.
/// Timestamps in the future are never older.
pub fn is_older_than(timestamp: DateTime<Utc>, threshold_days: i64, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(timestamp) > Duration::days(threshold_days)
}

/// Parses an ISO-8601 timestamp as GitHub emits it.
pub fn parse_timestamp(iso: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(iso).map(|ts| ts.with_timezone(&Utc))
}

pub fn is_pr(issue: &Issue) -> bool {
    issue.pull_request.is_some()
}

/// Finds when `label` was last applied and is still in effect.
///
/// Timelines arrive in ascending order, so position decides which event is latest. An
/// application only counts if no removal of the same label comes after it in the
/// timeline; a label that was applied and later removed yields `None`. Removals and
/// re-applications sharing a timestamp are ordered by position as well.
pub fn issue_label_date(timeline: &[TimelineEvent], label: &str) -> Option<DateTime<Utc>> {
    let mut last_labeled: Option<(usize, DateTime<Utc>)> = None;
    let mut last_unlabeled: Option<usize> = None;

    for (index, event) in timeline.iter().enumerate() {
        if event.label.as_ref().map(|l| l.name.as_str()) != Some(label) {
            continue;
        }
        match (&event.event, event.created_at) {
            (EventKind::Labeled, Some(created_at)) => last_labeled = Some((index, created_at)),
            (EventKind::Unlabeled, _) => last_unlabeled = Some(index),
            _ => {}
        }
    }

    match (last_labeled, last_unlabeled) {
        (Some((labeled, _)), Some(unlabeled)) if unlabeled > labeled => None,
        (labeled, _) => labeled.map(|(_, created_at)| created_at),
    }
}
