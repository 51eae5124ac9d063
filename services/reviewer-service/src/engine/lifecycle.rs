//! Pull request lifecycle: creation, merge, reviewer hand-off and listing.
//!
//! State machine:
//!
//! ```text
//!   create ──► OPEN ──merge──► MERGED
//!               │ ▲
//!               └─┘ reassign (reviewer only)
//! ```
//!
//! Merging an already merged pull request returns the stored record unchanged.

use reviewer_domain::{
    select_reviewer, CreatePullRequest, PullRequest, PullRequestShort, ReassignRequest,
    ReviewCandidate,
};
use tracing::{debug, info, instrument};

use super::{EngineError, EngineResult, ResourceKind, ReviewEngine};
use crate::store::StoreTx;

/// Outcome of a successful reviewer hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub pull_request: PullRequest,
    /// The newly assigned reviewer.
    pub replaced_by: String,
}

impl ReviewEngine {
    /// Create an open pull request and assign a reviewer from the author's team.
    #[instrument(skip(self, request), fields(pull_request_id = %request.pull_request_id, author_id = %request.author_id))]
    pub async fn create_pull_request(&self, request: CreatePullRequest) -> EngineResult<PullRequest> {
        self.run("create_pull_request", self.create_in_tx(request))
            .await
    }

    /// Merge a pull request.
    #[instrument(skip(self))]
    pub async fn merge_pull_request(&self, pull_request_id: &str) -> EngineResult<PullRequest> {
        self.run("merge_pull_request", self.merge_in_tx(pull_request_id))
            .await
    }

    /// Hand an open pull request over from `old_user_id` to another team member.
    #[instrument(skip(self, request), fields(pull_request_id = %request.pull_request_id, old_user_id = %request.old_user_id))]
    pub async fn reassign_reviewer(&self, request: ReassignRequest) -> EngineResult<Reassignment> {
        self.run("reassign_reviewer", self.reassign_in_tx(request))
            .await
    }

    /// Pull requests assigned to `user_id` for review, newest first.
    #[instrument(skip(self))]
    pub async fn get_user_reviews(&self, user_id: &str) -> EngineResult<Vec<PullRequestShort>> {
        self.run("get_user_reviews", self.reviews_in_tx(user_id))
            .await
    }

    async fn create_in_tx(&self, request: CreatePullRequest) -> EngineResult<PullRequest> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(EngineError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let mut tx = self.store.begin().await?;

        if tx.pull_request_exists(&request.pull_request_id).await? {
            return Err(EngineError::PrExists(request.pull_request_id));
        }

        let author = tx
            .get_user(&request.author_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::User, &request.author_id))?;

        let reviewer_id =
            pick_reviewer(tx.as_mut(), &author.team_name, &[author.user_id.as_str()]).await?;

        // A concurrent create with the same id may have committed since the
        // existence check; the insert itself is the arbiter.
        let pr = tx
            .insert_pull_request(&request, &reviewer_id)
            .await?
            .ok_or_else(|| EngineError::PrExists(request.pull_request_id.clone()))?;

        tx.commit().await?;

        info!(
            pull_request_id = %pr.pull_request_id,
            reviewer_id = %pr.reviewer_id,
            "Pull request created"
        );
        Ok(pr)
    }

    async fn merge_in_tx(&self, pull_request_id: &str) -> EngineResult<PullRequest> {
        let mut tx = self.store.begin().await?;

        let pr = tx
            .lock_pull_request(pull_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::PullRequest, pull_request_id))?;

        if pr.is_merged() {
            tx.commit().await?;
            debug!(pull_request_id, "Pull request already merged");
            return Ok(pr);
        }

        let merged = tx.mark_merged(pull_request_id).await?;
        tx.commit().await?;

        info!(pull_request_id, "Pull request merged");
        Ok(merged)
    }

    async fn reassign_in_tx(&self, request: ReassignRequest) -> EngineResult<Reassignment> {
        let ReassignRequest {
            pull_request_id,
            old_user_id,
        } = request;

        let mut tx = self.store.begin().await?;

        let pr = tx
            .lock_pull_request(&pull_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::PullRequest, &pull_request_id))?;

        if pr.is_merged() {
            return Err(EngineError::PrMerged(pull_request_id));
        }

        if pr.reviewer_id != old_user_id {
            return Err(EngineError::NotAssigned {
                pull_request_id,
                user_id: old_user_id,
            });
        }

        let author = tx
            .get_user(&pr.author_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::User, &pr.author_id))?;

        let replaced_by = pick_reviewer(
            tx.as_mut(),
            &author.team_name,
            &[author.user_id.as_str(), old_user_id.as_str()],
        )
        .await?;

        let updated = tx.set_reviewer(&pull_request_id, &replaced_by).await?;
        tx.commit().await?;

        info!(
            pull_request_id = %pull_request_id,
            old_reviewer_id = %old_user_id,
            new_reviewer_id = %replaced_by,
            "Reviewer reassigned"
        );
        Ok(Reassignment {
            pull_request: updated,
            replaced_by,
        })
    }

    async fn reviews_in_tx(&self, user_id: &str) -> EngineResult<Vec<PullRequestShort>> {
        let mut tx = self.store.begin().await?;

        if tx.get_user(user_id).await?.is_none() {
            return Err(EngineError::not_found(ResourceKind::User, user_id));
        }

        let reviews = tx.reviews_for(user_id).await?;
        tx.commit().await?;

        Ok(reviews)
    }
}

/// Choose a reviewer from `team_name` using the current activity flags and
/// open-review load.
async fn pick_reviewer(
    tx: &mut dyn StoreTx,
    team_name: &str,
    exclude: &[&str],
) -> EngineResult<String> {
    let members = tx
        .team_members(team_name)
        .await?
        .ok_or_else(|| EngineError::not_found(ResourceKind::Team, team_name))?;

    let member_ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
    let loads = tx.open_review_counts(&member_ids).await?;

    let candidates: Vec<ReviewCandidate> = members
        .into_iter()
        .map(|m| ReviewCandidate {
            open_reviews: loads.get(&m.user_id).copied().unwrap_or(0),
            user_id: m.user_id,
            is_active: m.is_active,
        })
        .collect();

    select_reviewer(&candidates, exclude).map_err(|_| {
        debug!(team_name, ?exclude, "No eligible reviewer");
        EngineError::NoCandidate {
            team_name: team_name.to_string(),
        }
    })
}
