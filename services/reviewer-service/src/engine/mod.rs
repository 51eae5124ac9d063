//! Team registry, user activity and pull request lifecycle operations.
//!
//! [`ReviewEngine`] is stateless apart from its store handle. Each public
//! operation:
//!
//! - opens exactly one store transaction,
//! - reads the minimum state it needs (pull request rows are locked),
//! - applies the reviewer assignment policy where relevant,
//! - commits, or returns an error with the transaction dropped (rolled back).
//!
//! Every operation is bounded by the engine's operation timeout. When it
//! expires the in-flight future is dropped, which rolls the transaction back,
//! and the caller receives [`EngineError::DeadlineExceeded`]. Nothing is
//! retried here.

mod activity;
mod lifecycle;
mod teams;

pub use lifecycle::Reassignment;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::store::{Store, StoreError};

/// Default per-operation deadline.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Kind of record an operation could not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Team,
    User,
    PullRequest,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Team => "team",
            Self::User => "user",
            Self::PullRequest => "pull request",
        })
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("team already exists: {0}")]
    TeamExists(String),

    #[error("pull request already exists: {0}")]
    PrExists(String),

    #[error("pull request is merged: {0}")]
    PrMerged(String),

    #[error("{user_id} is not the assigned reviewer of {pull_request_id}")]
    NotAssigned {
        pull_request_id: String,
        user_id: String,
    },

    #[error("no active replacement candidate in team {team_name}")]
    NoCandidate { team_name: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn not_found(kind: ResourceKind, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// The pull request review engine.
#[derive(Clone)]
pub struct ReviewEngine {
    store: Arc<dyn Store>,
    operation_timeout: Duration,
}

impl ReviewEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Override the per-operation deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Run one operation under the deadline.
    async fn run<T, F>(&self, operation: &'static str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Operation deadline exceeded, transaction rolled back"
                );
                Err(EngineError::DeadlineExceeded)
            }
        }
    }
}

#[cfg(test)]
mod tests;
