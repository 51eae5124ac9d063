//! Postgres implementation of the store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reviewer_domain::{
    CreatePullRequest, PullRequest, PullRequestShort, PullRequestStatus, TeamMember, User,
};
use sqlx::{
    postgres::PgRow,
    Postgres, Row, Transaction,
};

use super::{PullRequestStore, Store, StoreError, StoreTx, TeamRegistry};
use crate::db::Database;

/// Store backed by the service's Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.db.pool().begin().await.map_err(StoreError::Begin)?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.db
            .health_check()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// An open Postgres transaction.
///
/// `sqlx::Transaction` issues `ROLLBACK` when dropped uncommitted.
struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Row Types
// =============================================================================

struct PullRequestRow(PullRequest);

impl<'r> sqlx::FromRow<'r, PgRow> for PullRequestRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<PullRequestStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: Box::new(e),
            })?;
        let merged_at: Option<DateTime<Utc>> = row.try_get("merged_at")?;

        Ok(Self(PullRequest {
            pull_request_id: row.try_get("pull_request_id")?,
            pull_request_name: row.try_get("pull_request_name")?,
            author_id: row.try_get("author_id")?,
            reviewer_id: row.try_get("reviewer_id")?,
            status,
            created_at: row.try_get("created_at")?,
            merged_at,
        }))
    }
}

struct PullRequestShortRow(PullRequestShort);

impl<'r> sqlx::FromRow<'r, PgRow> for PullRequestShortRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<PullRequestStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self(PullRequestShort {
            pull_request_id: row.try_get("pull_request_id")?,
            pull_request_name: row.try_get("pull_request_name")?,
            author_id: row.try_get("author_id")?,
            status,
        }))
    }
}

struct MemberRow(TeamMember);

impl<'r> sqlx::FromRow<'r, PgRow> for MemberRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(TeamMember {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

struct UserRow(User);

impl<'r> sqlx::FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(User {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            team_name: row.try_get("team_name")?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

const PULL_REQUEST_COLUMNS: &str = "pull_request_id, pull_request_name, author_id, reviewer_id, \
     status, created_at, merged_at";

// =============================================================================
// Teams and users
// =============================================================================

#[async_trait]
impl TeamRegistry for PgStoreTx {
    async fn insert_team(&mut self, team_name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO teams (team_name)
            VALUES ($1)
            ON CONFLICT (team_name) DO NOTHING
            "#,
        )
        .bind(team_name)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::Query)?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_member(
        &mut self,
        team_name: &str,
        position: i32,
        member: &TeamMember,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, team_name, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(&member.user_id)
        .bind(&member.username)
        .bind(team_name)
        .bind(member.is_active)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::Query)?;

        sqlx::query(
            r#"
            INSERT INTO team_members (team_name, user_id, member_index)
            VALUES ($1, $2, $3)
            ON CONFLICT (team_name, user_id) DO NOTHING
            "#,
        )
        .bind(team_name)
        .bind(&member.user_id)
        .bind(position)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::Query)?;

        Ok(())
    }

    async fn team_members(
        &mut self,
        team_name: &str,
    ) -> Result<Option<Vec<TeamMember>>, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM teams WHERE team_name = $1)")
                .bind(team_name)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(StoreError::Query)?;

        if !exists {
            return Ok(None);
        }

        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT u.user_id, u.username, u.is_active
            FROM team_members m
            JOIN users u ON u.user_id = m.user_id
            WHERE m.team_name = $1
            ORDER BY m.member_index ASC
            "#,
        )
        .bind(team_name)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::Query)?;

        Ok(Some(rows.into_iter().map(|r| r.0).collect()))
    }

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, team_name, is_active
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::Query)?;

        Ok(row.map(|r| r.0))
    }

    async fn set_user_active(
        &mut self,
        user_id: &str,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(is_active)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::Query)?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Pull requests
// =============================================================================

#[async_trait]
impl PullRequestStore for PgStoreTx {
    async fn pull_request_exists(&mut self, pull_request_id: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pull_requests WHERE pull_request_id = $1)",
        )
        .bind(pull_request_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(StoreError::Query)
    }

    async fn insert_pull_request(
        &mut self,
        request: &CreatePullRequest,
        reviewer_id: &str,
    ) -> Result<Option<PullRequest>, StoreError> {
        let query = format!(
            r#"
            INSERT INTO pull_requests (pull_request_id, pull_request_name, author_id, reviewer_id, status)
            VALUES ($1, $2, $3, $4, 'OPEN')
            ON CONFLICT (pull_request_id) DO NOTHING
            RETURNING {PULL_REQUEST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PullRequestRow>(&query)
            .bind(&request.pull_request_id)
            .bind(&request.pull_request_name)
            .bind(&request.author_id)
            .bind(reviewer_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::Query)?;

        Ok(row.map(|r| r.0))
    }

    async fn lock_pull_request(
        &mut self,
        pull_request_id: &str,
    ) -> Result<Option<PullRequest>, StoreError> {
        let query = format!(
            r#"
            SELECT {PULL_REQUEST_COLUMNS}
            FROM pull_requests
            WHERE pull_request_id = $1
            FOR UPDATE
            "#
        );
        let row = sqlx::query_as::<_, PullRequestRow>(&query)
            .bind(pull_request_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::Query)?;

        Ok(row.map(|r| r.0))
    }

    async fn mark_merged(&mut self, pull_request_id: &str) -> Result<PullRequest, StoreError> {
        let query = format!(
            r#"
            UPDATE pull_requests
            SET status = 'MERGED', merged_at = now()
            WHERE pull_request_id = $1
            RETURNING {PULL_REQUEST_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PullRequestRow>(&query)
            .bind(pull_request_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::Query)?
            .map(|r| r.0)
            .ok_or_else(|| StoreError::RowMissing {
                table: "pull_requests",
                key: pull_request_id.to_string(),
            })
    }

    async fn set_reviewer(
        &mut self,
        pull_request_id: &str,
        reviewer_id: &str,
    ) -> Result<PullRequest, StoreError> {
        let query = format!(
            r#"
            UPDATE pull_requests
            SET reviewer_id = $2
            WHERE pull_request_id = $1
            RETURNING {PULL_REQUEST_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PullRequestRow>(&query)
            .bind(pull_request_id)
            .bind(reviewer_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::Query)?
            .map(|r| r.0)
            .ok_or_else(|| StoreError::RowMissing {
                table: "pull_requests",
                key: pull_request_id.to_string(),
            })
    }

    async fn open_review_counts(
        &mut self,
        user_ids: &[String],
    ) -> Result<HashMap<String, u64>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT reviewer_id, COUNT(*)::BIGINT AS open_reviews
            FROM pull_requests
            WHERE status = 'OPEN' AND reviewer_id = ANY($1)
            GROUP BY reviewer_id
            "#,
        )
        .bind(user_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::Query)?;

        Ok(rows
            .into_iter()
            .map(|(user_id, count)| (user_id, u64::try_from(count).unwrap_or(0)))
            .collect())
    }

    async fn reviews_for(&mut self, user_id: &str) -> Result<Vec<PullRequestShort>, StoreError> {
        let rows = sqlx::query_as::<_, PullRequestShortRow>(
            r#"
            SELECT pull_request_id, pull_request_name, author_id, status
            FROM pull_requests
            WHERE reviewer_id = $1
            ORDER BY created_at DESC, pull_request_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::Query)?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::Commit)
    }
}
