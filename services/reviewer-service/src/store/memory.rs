//! In-memory implementation of the store.
//!
//! Transactions are fully serialized: `begin` takes an owned lock on the whole
//! state and works on a private copy, which `commit` publishes. Dropping a
//! transaction discards the copy and releases the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reviewer_domain::{
    CreatePullRequest, PullRequest, PullRequestShort, PullRequestStatus, TeamMember, User,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{PullRequestStore, Store, StoreError, StoreTx, TeamRegistry};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Team name to `(member_index, user_id)`, kept sorted by index.
    teams: BTreeMap<String, Vec<(i32, String)>>,
    users: HashMap<String, User>,
    pull_requests: HashMap<String, PullRequest>,
}

/// In-memory store.
///
/// Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail, leaving the state untouched.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryTx {
    fn pull_request_mut(&mut self, pull_request_id: &str) -> Result<&mut PullRequest, StoreError> {
        self.working
            .pull_requests
            .get_mut(pull_request_id)
            .ok_or_else(|| StoreError::RowMissing {
                table: "pull_requests",
                key: pull_request_id.to_string(),
            })
    }
}

#[async_trait]
impl TeamRegistry for MemoryTx {
    async fn insert_team(&mut self, team_name: &str) -> Result<bool, StoreError> {
        if self.working.teams.contains_key(team_name) {
            return Ok(false);
        }
        self.working.teams.insert(team_name.to_string(), Vec::new());
        Ok(true)
    }

    async fn add_member(
        &mut self,
        team_name: &str,
        position: i32,
        member: &TeamMember,
    ) -> Result<(), StoreError> {
        self.working
            .users
            .entry(member.user_id.clone())
            .and_modify(|user| user.is_active = member.is_active)
            .or_insert_with(|| User {
                user_id: member.user_id.clone(),
                username: member.username.clone(),
                team_name: team_name.to_string(),
                is_active: member.is_active,
            });

        let members = self
            .working
            .teams
            .get_mut(team_name)
            .ok_or_else(|| StoreError::RowMissing {
                table: "teams",
                key: team_name.to_string(),
            })?;
        if !members.iter().any(|(_, id)| *id == member.user_id) {
            members.push((position, member.user_id.clone()));
            members.sort_by_key(|(index, _)| *index);
        }
        Ok(())
    }

    async fn team_members(
        &mut self,
        team_name: &str,
    ) -> Result<Option<Vec<TeamMember>>, StoreError> {
        let Some(member_ids) = self.working.teams.get(team_name) else {
            return Ok(None);
        };

        let members = member_ids
            .iter()
            .filter_map(|(_, id)| self.working.users.get(id))
            .map(|user| TeamMember {
                user_id: user.user_id.clone(),
                username: user.username.clone(),
                is_active: user.is_active,
            })
            .collect();
        Ok(Some(members))
    }

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(user_id).cloned())
    }

    async fn set_user_active(
        &mut self,
        user_id: &str,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        match self.working.users.get_mut(user_id) {
            Some(user) => {
                user.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PullRequestStore for MemoryTx {
    async fn pull_request_exists(&mut self, pull_request_id: &str) -> Result<bool, StoreError> {
        Ok(self.working.pull_requests.contains_key(pull_request_id))
    }

    async fn insert_pull_request(
        &mut self,
        request: &CreatePullRequest,
        reviewer_id: &str,
    ) -> Result<Option<PullRequest>, StoreError> {
        if self
            .working
            .pull_requests
            .contains_key(&request.pull_request_id)
        {
            return Ok(None);
        }

        let pr = PullRequest::open(request.clone(), reviewer_id.to_string(), Utc::now());
        self.working
            .pull_requests
            .insert(pr.pull_request_id.clone(), pr.clone());
        Ok(Some(pr))
    }

    async fn lock_pull_request(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Option<PullRequest>, StoreError> {
        // The whole state is already held by this transaction.
        Ok(self.working.pull_requests.get(pull_request_id).cloned())
    }

    async fn mark_merged(&mut self, pull_request_id: &str) -> Result<PullRequest, StoreError> {
        let pr = self.pull_request_mut(pull_request_id)?;
        pr.status = PullRequestStatus::Merged;
        pr.merged_at = Some(Utc::now());
        Ok(pr.clone())
    }

    async fn set_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
    ) -> Result<PullRequest, StoreError> {
        let pr = self.pull_request_mut(pull_request_id)?;
        pr.reviewer_id = reviewer_id.to_string();
        Ok(pr.clone())
    }

    async fn open_review_counts(
        &mut self,
        user_ids: &[String],
    ) -> Result<HashMap<String, u64>, StoreError> {
        let mut counts = HashMap::new();
        for pr in self.working.pull_requests.values() {
            if pr.status == PullRequestStatus::Open && user_ids.contains(&pr.reviewer_id) {
                *counts.entry(pr.reviewer_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn reviews_for(&mut self, user_id: &str) -> Result<Vec<PullRequestShort>, StoreError> {
        let mut reviews: Vec<&PullRequest> = self
            .working
            .pull_requests
            .values()
            .filter(|pr| pr.reviewer_id == user_id)
            .collect();
        reviews.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.pull_request_id.cmp(&b.pull_request_id))
        });
        Ok(reviews.into_iter().map(PullRequest::short).collect())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard,
            working,
            fail_commit,
        } = *self;

        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }

        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user_id: &str, is_active: bool) -> TeamMember {
        TeamMember {
            user_id: user_id.to_string(),
            username: format!("name-{user_id}"),
            is_active,
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_team("backend").await.unwrap());
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.team_members("backend").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_team("backend").await.unwrap());
        tx.add_member("backend", 0, &member("u1", true)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.insert_team("backend").await.unwrap());
        let members = tx.team_members("backend").await.unwrap().unwrap();
        assert_eq!(members, vec![member("u1", true)]);
    }

    #[tokio::test]
    async fn test_failed_commit_publishes_nothing() {
        let store = MemoryStore::new();
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.insert_team("backend").await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::Unavailable(_))
        ));

        let mut tx = store.begin().await.unwrap();
        assert!(tx.team_members("backend").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_members_listed_by_position_not_insertion() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_team("backend").await.unwrap();
        tx.add_member("backend", 2, &member("a", true)).await.unwrap();
        tx.add_member("backend", 0, &member("c", true)).await.unwrap();
        tx.add_member("backend", 1, &member("b", true)).await.unwrap();

        let members = tx.team_members("backend").await.unwrap().unwrap();
        assert_eq!(
            members,
            vec![member("c", true), member("b", true), member("a", true)]
        );
    }

    #[tokio::test]
    async fn test_existing_user_keeps_team_and_name() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_team("backend").await.unwrap();
        tx.add_member("backend", 0, &member("u1", true)).await.unwrap();
        tx.insert_team("payments").await.unwrap();
        let renamed = TeamMember {
            user_id: "u1".to_string(),
            username: "someone-else".to_string(),
            is_active: false,
        };
        tx.add_member("payments", 0, &renamed).await.unwrap();

        let user = tx.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.team_name, "backend");
        assert_eq!(user.username, "name-u1");
        assert!(!user.is_active);
    }
}
