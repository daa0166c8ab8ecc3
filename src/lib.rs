pub mod config;
pub mod github;
pub mod predicates;
pub mod sweep;
pub mod types;

pub use github::{GitHubClient, IssueApi};
pub use predicates::{is_older_than, is_pr, issue_date_compare, issue_label_date, parse_timestamp};
pub use types::{
    ApiError, ApiResponse, Issue, IssueFilter, IssueState, Label, Timeline, TimelineEvent,
};
