//! Transactional storage for teams, users and pull requests.
//!
//! Every engine operation runs inside one [`StoreTx`] obtained from
//! [`Store::begin`]. A transaction is published only by [`StoreTx::commit`];
//! dropping it on any other path (error, panic, cancelled future) rolls it
//! back.
//!
//! Implementations:
//! - [`PgStore`]: Postgres via SQLx, row locks with `SELECT ... FOR UPDATE`
//! - [`MemoryStore`]: in-process store with fully serialized transactions,
//!   used by tests

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::HashMap;

use async_trait::async_trait;
use reviewer_domain::{CreatePullRequest, PullRequest, PullRequestShort, TeamMember, User};
use thiserror::Error;

/// Failures of the underlying store, unrelated to domain rules.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open a transaction.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),

    /// A statement inside the transaction failed.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// The transaction could not be committed.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),

    /// A row that the transaction holds locked has disappeared.
    #[error("{table} row missing: {key}")]
    RowMissing { table: &'static str, key: String },

    /// The backend is not reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Team and user records, as seen from inside a transaction.
#[async_trait]
pub trait TeamRegistry: Send {
    /// Insert an empty team. Returns `false` if the name is already taken.
    async fn insert_team(&mut self, team_name: &str) -> Result<bool, StoreError>;

    /// Upsert `member` and record it as the `position`-th member of the team.
    ///
    /// A new user is created under `team_name`. For an existing user only
    /// `is_active` is overwritten.
    async fn add_member(
        &mut self,
        team_name: &str,
        position: i32,
        member: &TeamMember,
    ) -> Result<(), StoreError>;

    /// Members of a team with their current activity, in membership order.
    ///
    /// `None` if the team does not exist.
    async fn team_members(&mut self, team_name: &str)
        -> Result<Option<Vec<TeamMember>>, StoreError>;

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Returns `false` if the user does not exist.
    async fn set_user_active(&mut self, user_id: &str, is_active: bool)
        -> Result<bool, StoreError>;
}

/// Pull request records, as seen from inside a transaction.
#[async_trait]
pub trait PullRequestStore: Send {
    async fn pull_request_exists(&mut self, pull_request_id: &str) -> Result<bool, StoreError>;

    /// Insert an open pull request stamped with the store's clock.
    ///
    /// Returns `None` if the id is already taken.
    async fn insert_pull_request(
        &mut self,
        request: &CreatePullRequest,
        reviewer_id: &str,
    ) -> Result<Option<PullRequest>, StoreError>;

    /// Read a pull request and hold its row until the transaction ends.
    async fn lock_pull_request(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Option<PullRequest>, StoreError>;

    /// Mark a locked pull request merged now.
    async fn mark_merged(&mut self, pull_request_id: &str) -> Result<PullRequest, StoreError>;

    /// Replace the reviewer of a locked pull request.
    async fn set_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
    ) -> Result<PullRequest, StoreError>;

    /// Number of open pull requests assigned to each of `user_ids`.
    ///
    /// Users without open reviews may be absent from the map.
    async fn open_review_counts(
        &mut self,
        user_ids: &[String],
    ) -> Result<HashMap<String, u64>, StoreError>;

    /// Pull requests reviewed by `user_id`, newest first.
    async fn reviews_for(&mut self, user_id: &str) -> Result<Vec<PullRequestShort>, StoreError>;
}

/// An open transaction.
#[async_trait]
pub trait StoreTx: TeamRegistry + PullRequestStore {
    /// Publish every write made through this transaction.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Entry point to a backing store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}
