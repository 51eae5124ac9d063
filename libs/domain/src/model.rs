//! Teams, users and pull requests.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Teams and users
// =============================================================================

/// A member entry as carried by a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

/// A named team and its members.
///
/// `team_name` is the natural key and never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

impl Team {
    /// Ids of all members, in the order they were supplied.
    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.user_id.as_str()).collect()
    }
}

/// A user record.
///
/// `team_name` is the team the user was first created under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub team_name: String,
    pub is_active: bool,
}

// =============================================================================
// Pull requests
// =============================================================================

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
        }
    }

    /// Whether no further transitions are possible from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged)
    }
}

impl fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored status string that is neither `OPEN` nor `MERGED`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pull request status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PullRequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "MERGED" => Ok(Self::Merged),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A pull request with its single assigned reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub reviewer_id: String,
    pub status: PullRequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// A freshly created, open pull request.
    pub fn open(request: CreatePullRequest, reviewer_id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            pull_request_id: request.pull_request_id,
            pull_request_name: request.pull_request_name,
            author_id: request.author_id,
            reviewer_id,
            status: PullRequestStatus::Open,
            created_at,
            merged_at: None,
        }
    }

    pub fn is_merged(&self) -> bool {
        self.status == PullRequestStatus::Merged
    }

    pub fn short(&self) -> PullRequestShort {
        PullRequestShort {
            pull_request_id: self.pull_request_id.clone(),
            pull_request_name: self.pull_request_name.clone(),
            author_id: self.author_id.clone(),
            status: self.status,
        }
    }
}

/// Listing form of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestShort {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: PullRequestStatus,
}

// =============================================================================
// Requests
// =============================================================================

/// Input for creating a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
}

impl CreatePullRequest {
    /// Names of required fields that are empty or whitespace.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.pull_request_id.trim().is_empty() {
            missing.push("pull_request_id");
        }
        if self.pull_request_name.trim().is_empty() {
            missing.push("pull_request_name");
        }
        if self.author_id.trim().is_empty() {
            missing.push("author_id");
        }
        missing
    }
}

/// Input for handing a review over from the current reviewer.
///
/// `old_user_id` must name the reviewer the caller believes is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: String,
    #[serde(alias = "old_reviewer_id")]
    pub old_user_id: String,
}
