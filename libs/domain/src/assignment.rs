//! Reviewer assignment policy.
//!
//! Given a snapshot of one team's members and a set of excluded user ids,
//! picks the reviewer for a pull request:
//!
//! 1. Only active members that are not excluded are eligible.
//! 2. The eligible member with the fewest open reviews wins.
//! 3. Ties go to the lexicographically smallest `user_id`.
//!
//! The exclusion set always holds the author; on reassignment it also holds
//! the outgoing reviewer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One team member as seen by the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCandidate {
    pub user_id: String,
    pub is_active: bool,
    /// Open pull requests currently assigned to this user.
    pub open_reviews: u64,
}

/// No active, non-excluded member is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no active replacement candidate in team")]
pub struct NoCandidate;

/// Select a reviewer from `candidates`, never returning an id in `exclude`.
pub fn select_reviewer(
    candidates: &[ReviewCandidate],
    exclude: &[&str],
) -> Result<String, NoCandidate> {
    candidates
        .iter()
        .filter(|c| c.is_active && !exclude.contains(&c.user_id.as_str()))
        .min_by(|a, b| {
            a.open_reviews
                .cmp(&b.open_reviews)
                .then_with(|| a.user_id.cmp(&b.user_id))
        })
        .map(|c| c.user_id.clone())
        .ok_or(NoCandidate)
}
