//! User activity toggling.

use reviewer_domain::User;
use tracing::{info, instrument};

use super::{EngineError, EngineResult, ResourceKind, ReviewEngine};

impl ReviewEngine {
    /// Set a user's activity flag and return the refreshed record.
    ///
    /// The update and the read-back share one transaction, so the returned
    /// record is exactly what was written.
    #[instrument(skip(self))]
    pub async fn set_user_active(&self, user_id: &str, is_active: bool) -> EngineResult<User> {
        self.run(
            "set_user_active",
            self.set_user_active_in_tx(user_id, is_active),
        )
        .await
    }

    async fn set_user_active_in_tx(&self, user_id: &str, is_active: bool) -> EngineResult<User> {
        let mut tx = self.store.begin().await?;

        if !tx.set_user_active(user_id, is_active).await? {
            return Err(EngineError::not_found(ResourceKind::User, user_id));
        }

        let user = tx
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::User, user_id))?;

        tx.commit().await?;

        info!(user_id = %user.user_id, is_active = user.is_active, "User activity updated");
        Ok(user)
    }
}
