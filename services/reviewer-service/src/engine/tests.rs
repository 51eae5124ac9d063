use std::sync::Arc;
use std::time::Duration;

use reviewer_domain::{
    CreatePullRequest, PullRequestStatus, ReassignRequest, Team, TeamMember,
};

use super::*;
use crate::store::MemoryStore;

fn member(user_id: &str, is_active: bool) -> TeamMember {
    TeamMember {
        user_id: user_id.to_string(),
        username: format!("name-{user_id}"),
        is_active,
    }
}

fn team(team_name: &str, members: &[(&str, bool)]) -> Team {
    Team {
        team_name: team_name.to_string(),
        members: members
            .iter()
            .map(|(id, active)| member(id, *active))
            .collect(),
    }
}

fn create_request(pull_request_id: &str, author_id: &str) -> CreatePullRequest {
    CreatePullRequest {
        pull_request_id: pull_request_id.to_string(),
        pull_request_name: format!("Change {pull_request_id}"),
        author_id: author_id.to_string(),
    }
}

fn reassign_request(pull_request_id: &str, old_user_id: &str) -> ReassignRequest {
    ReassignRequest {
        pull_request_id: pull_request_id.to_string(),
        old_user_id: old_user_id.to_string(),
    }
}

fn engine() -> (ReviewEngine, MemoryStore) {
    let store = MemoryStore::new();
    (ReviewEngine::new(Arc::new(store.clone())), store)
}

async fn engine_with_team(members: &[(&str, bool)]) -> (ReviewEngine, MemoryStore) {
    let (engine, store) = engine();
    engine.create_team(team("backend", members)).await.unwrap();
    (engine, store)
}

// =============================================================================
// Teams and activity
// =============================================================================

#[tokio::test]
async fn test_create_team_returns_stored_team() {
    let (engine, _) = engine();

    let created = engine
        .create_team(team("backend", &[("u1", true), ("u2", false)]))
        .await
        .unwrap();

    assert_eq!(created, team("backend", &[("u1", true), ("u2", false)]));
}

#[tokio::test]
async fn test_create_team_twice_fails_with_team_exists() {
    let (engine, _) = engine_with_team(&[("u1", true)]).await;

    let err = engine
        .create_team(team("backend", &[("u9", true)]))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::TeamExists(name) if name == "backend"));
    // The losing request must not have created its members.
    assert!(matches!(
        engine.set_user_active("u9", false).await,
        Err(EngineError::NotFound { kind: ResourceKind::User, .. })
    ));
}

#[tokio::test]
async fn test_create_team_overwrites_existing_activity() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;

    engine
        .create_team(team("payments", &[("u2", false), ("u3", true)]))
        .await
        .unwrap();

    let backend = engine.get_team("backend").await.unwrap();
    assert_eq!(backend, team("backend", &[("u1", true), ("u2", false)]));
}

#[tokio::test]
async fn test_create_team_keeps_request_member_order() {
    let (engine, _) = engine();
    let members = [("u3", true), ("u1", false), ("u2", true)];

    let created = engine.create_team(team("backend", &members)).await.unwrap();
    assert_eq!(created, team("backend", &members));

    let fetched = engine.get_team("backend").await.unwrap();
    assert_eq!(fetched, team("backend", &members));
}

#[tokio::test]
async fn test_overlapping_team_creations_both_succeed() {
    let (engine, _) = engine();
    let ids: Vec<String> = (0..50).map(|n| format!("u{n:02}")).collect();
    let forward: Vec<(&str, bool)> = ids.iter().map(|id| (id.as_str(), true)).collect();
    let reversed: Vec<(&str, bool)> = forward.iter().rev().copied().collect();

    let (a, b) = tokio::join!(
        engine.create_team(team("backend", &forward)),
        engine.create_team(team("payments", &reversed)),
    );

    assert_eq!(a.unwrap(), team("backend", &forward));
    assert_eq!(b.unwrap(), team("payments", &reversed));
}

#[tokio::test]
async fn test_create_team_rejects_blank_name() {
    let (engine, _) = engine();

    let err = engine.create_team(team("  ", &[("u1", true)])).await.unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_get_team_reflects_latest_activity() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;

    engine.set_user_active("u2", false).await.unwrap();
    engine.set_user_active("u1", false).await.unwrap();
    engine.set_user_active("u1", true).await.unwrap();

    let fetched = engine.get_team("backend").await.unwrap();
    assert_eq!(fetched, team("backend", &[("u1", true), ("u2", false)]));
}

#[tokio::test]
async fn test_get_team_unknown_or_empty_is_not_found() {
    let (engine, _) = engine();
    engine.create_team(team("empty", &[])).await.unwrap();

    for name in ["missing", "empty"] {
        let err = engine.get_team(name).await.unwrap_err();
        assert!(
            matches!(err, EngineError::NotFound { kind: ResourceKind::Team, ref id } if id == name),
            "{name}: {err:?}"
        );
    }
}

#[tokio::test]
async fn test_set_user_active_returns_refreshed_user() {
    let (engine, _) = engine_with_team(&[("u1", true)]).await;

    let user = engine.set_user_active("u1", false).await.unwrap();

    assert_eq!(user.user_id, "u1");
    assert_eq!(user.team_name, "backend");
    assert!(!user.is_active);
}

#[tokio::test]
async fn test_set_user_active_unknown_user() {
    let (engine, _) = engine();

    let err = engine.set_user_active("ghost", true).await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound { kind: ResourceKind::User, .. }));
}

// =============================================================================
// Pull request creation
// =============================================================================

#[tokio::test]
async fn test_create_assigns_only_eligible_member() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;

    let pr = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    assert_eq!(pr.reviewer_id, "u2");
    assert_eq!(pr.author_id, "u1");
    assert_eq!(pr.status, PullRequestStatus::Open);
    assert!(pr.merged_at.is_none());
}

#[tokio::test]
async fn test_create_balances_open_reviews() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true), ("u3", true)]).await;

    let mut reviewers = Vec::new();
    for id in ["pr1", "pr2", "pr3", "pr4"] {
        let pr = engine.create_pull_request(create_request(id, "u1")).await.unwrap();
        reviewers.push(pr.reviewer_id);
    }

    assert_eq!(reviewers, ["u2", "u3", "u2", "u3"]);
}

#[tokio::test]
async fn test_merged_reviews_do_not_count_towards_load() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true), ("u3", true)]).await;

    engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();
    engine.merge_pull_request("pr1").await.unwrap();

    let pr = engine.create_pull_request(create_request("pr2", "u1")).await.unwrap();
    assert_eq!(pr.reviewer_id, "u2");
}

#[tokio::test]
async fn test_create_skips_inactive_members() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", false), ("u3", true)]).await;

    let pr = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    assert_eq!(pr.reviewer_id, "u3");
}

#[tokio::test]
async fn test_create_duplicate_id_leaves_original_untouched() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true), ("u3", true)]).await;
    let original = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    let mut duplicate = create_request("pr1", "u3");
    duplicate.pull_request_name = "Something else".to_string();
    let err = engine.create_pull_request(duplicate).await.unwrap_err();
    assert!(matches!(err, EngineError::PrExists(id) if id == "pr1"));

    let reviews = engine.get_user_reviews(&original.reviewer_id).await.unwrap();
    assert_eq!(reviews, vec![original.short()]);
}

#[tokio::test]
async fn test_create_with_unknown_author() {
    let (engine, _) = engine_with_team(&[("u1", true)]).await;

    let err = engine
        .create_pull_request(create_request("pr1", "ghost"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotFound { kind: ResourceKind::User, .. }));
}

#[tokio::test]
async fn test_create_without_candidate() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", false)]).await;

    let err = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap_err();
    assert!(matches!(err, EngineError::NoCandidate { team_name } if team_name == "backend"));

    let err = engine.merge_pull_request("pr1").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: ResourceKind::PullRequest, .. }));
}

#[tokio::test]
async fn test_create_rejects_missing_fields() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;

    let request = CreatePullRequest {
        pull_request_id: "pr1".to_string(),
        pull_request_name: " ".to_string(),
        author_id: String::new(),
    };
    let err = engine.create_pull_request(request).await.unwrap_err();

    match err {
        EngineError::Validation(message) => {
            assert!(message.contains("pull_request_name"));
            assert!(message.contains("author_id"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

// =============================================================================
// Merge
// =============================================================================

#[tokio::test]
async fn test_merge_sets_status_and_timestamp() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;
    let created = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    let merged = engine.merge_pull_request("pr1").await.unwrap();

    assert_eq!(merged.status, PullRequestStatus::Merged);
    assert_eq!(merged.reviewer_id, created.reviewer_id);
    assert_eq!(merged.created_at, created.created_at);
    let merged_at = merged.merged_at.expect("merged_at is set");
    assert!(merged_at >= created.created_at);
}

#[tokio::test]
async fn test_merge_twice_returns_same_record() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;
    engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    let first = engine.merge_pull_request("pr1").await.unwrap();
    let second = engine.merge_pull_request("pr1").await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_merge_unknown_pull_request() {
    let (engine, _) = engine();

    let err = engine.merge_pull_request("nope").await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound { kind: ResourceKind::PullRequest, ref id } if id == "nope"));
}

// =============================================================================
// Reassignment
// =============================================================================

#[tokio::test]
async fn test_reassign_picks_other_member() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true), ("u3", true)]).await;
    engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    let result = engine.reassign_reviewer(reassign_request("pr1", "u2")).await.unwrap();

    assert_eq!(result.replaced_by, "u3");
    assert_eq!(result.pull_request.reviewer_id, "u3");
    assert_eq!(result.pull_request.status, PullRequestStatus::Open);
    assert!(engine.get_user_reviews("u2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reassign_with_two_members_has_no_candidate() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;
    let created = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();
    assert_eq!(created.reviewer_id, "u2");

    let err = engine.reassign_reviewer(reassign_request("pr1", "u2")).await.unwrap_err();

    assert!(matches!(err, EngineError::NoCandidate { .. }));
    assert_eq!(engine.get_user_reviews("u2").await.unwrap(), vec![created.short()]);
}

#[tokio::test]
async fn test_reassign_after_deactivation_has_no_candidate() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true), ("u3", true)]).await;
    let created = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();
    assert_eq!(created.reviewer_id, "u2");

    engine.set_user_active("u3", false).await.unwrap();
    let err = engine.reassign_reviewer(reassign_request("pr1", "u2")).await.unwrap_err();

    assert!(matches!(err, EngineError::NoCandidate { .. }));
    assert_eq!(engine.get_user_reviews("u2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reassign_merged_pull_request() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true), ("u3", true)]).await;
    engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();
    let merged = engine.merge_pull_request("pr1").await.unwrap();

    let err = engine.reassign_reviewer(reassign_request("pr1", "u2")).await.unwrap_err();
    assert!(matches!(err, EngineError::PrMerged(id) if id == "pr1"));

    // A merged pull request reports PrMerged even for a stale reviewer.
    let err = engine.reassign_reviewer(reassign_request("pr1", "u3")).await.unwrap_err();
    assert!(matches!(err, EngineError::PrMerged(_)));

    assert_eq!(engine.merge_pull_request("pr1").await.unwrap(), merged);
}

#[tokio::test]
async fn test_reassign_wrong_reviewer() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true), ("u3", true)]).await;
    engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    let err = engine.reassign_reviewer(reassign_request("pr1", "u3")).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::NotAssigned { ref pull_request_id, ref user_id }
            if pull_request_id == "pr1" && user_id == "u3"
    ));
}

#[tokio::test]
async fn test_reassign_unknown_pull_request() {
    let (engine, _) = engine_with_team(&[("u1", true)]).await;

    let err = engine.reassign_reviewer(reassign_request("nope", "u1")).await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound { kind: ResourceKind::PullRequest, .. }));
}

#[tokio::test]
async fn test_concurrent_reassign_only_one_wins() {
    let (engine, _) =
        engine_with_team(&[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
    engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();

    let (a, b) = tokio::join!(
        engine.reassign_reviewer(reassign_request("pr1", "u2")),
        engine.reassign_reviewer(reassign_request("pr1", "u2")),
    );

    let (winner, loser) = match (a, b) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert_ne!(winner.replaced_by, "u1");
    assert_ne!(winner.replaced_by, "u2");
    assert!(matches!(loser, EngineError::NotAssigned { .. }));
}

// =============================================================================
// Review listing
// =============================================================================

#[tokio::test]
async fn test_reviews_newest_first() {
    let (engine, _) = engine_with_team(&[("u1", true), ("u2", true)]).await;

    let first = engine.create_pull_request(create_request("pr-a", "u1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.create_pull_request(create_request("pr-b", "u1")).await.unwrap();
    let second = engine.merge_pull_request("pr-b").await.unwrap();

    let reviews = engine.get_user_reviews("u2").await.unwrap();

    assert_eq!(reviews, vec![second.short(), first.short()]);
}

#[tokio::test]
async fn test_reviews_empty_vs_unknown_user() {
    let (engine, _) = engine_with_team(&[("u1", true)]).await;

    assert!(engine.get_user_reviews("u1").await.unwrap().is_empty());

    let err = engine.get_user_reviews("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: ResourceKind::User, .. }));
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_failed_commit_leaves_no_effects() {
    let (engine, store) = engine_with_team(&[("u1", true), ("u2", true)]).await;

    store.fail_next_commit();
    let err = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));

    assert!(engine.get_user_reviews("u2").await.unwrap().is_empty());
    let pr = engine.create_pull_request(create_request("pr1", "u1")).await.unwrap();
    assert_eq!(pr.reviewer_id, "u2");
}

#[tokio::test]
async fn test_failed_activity_commit_is_rolled_back() {
    let (engine, store) = engine_with_team(&[("u1", true)]).await;

    store.fail_next_commit();
    assert!(engine.set_user_active("u1", false).await.is_err());

    let team = engine.get_team("backend").await.unwrap();
    assert!(team.members[0].is_active);
}

#[tokio::test]
async fn test_operation_deadline() {
    let store = MemoryStore::new();
    let engine = ReviewEngine::new(Arc::new(store.clone()))
        .with_operation_timeout(Duration::from_millis(50));
    engine.create_team(team("backend", &[("u1", true)])).await.unwrap();

    // An open transaction holds the memory store exclusively.
    let held = store.begin().await.unwrap();
    let err = engine.set_user_active("u1", false).await.unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded));
    drop(held);

    let team = engine.get_team("backend").await.unwrap();
    assert!(team.members[0].is_active);
}
