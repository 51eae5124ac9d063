//! Team registry operations.

use reviewer_domain::Team;
use tracing::{info, instrument};

use super::{EngineError, EngineResult, ResourceKind, ReviewEngine};

impl ReviewEngine {
    /// Create a team and upsert its members.
    ///
    /// The name check and the insert are one statement, so two concurrent
    /// creations of the same team cannot both succeed.
    #[instrument(skip(self, team), fields(team_name = %team.team_name, members = team.members.len()))]
    pub async fn create_team(&self, team: Team) -> EngineResult<Team> {
        self.run("create_team", self.create_team_in_tx(team)).await
    }

    /// Fetch a team with each member's current activity flag.
    #[instrument(skip(self))]
    pub async fn get_team(&self, team_name: &str) -> EngineResult<Team> {
        self.run("get_team", self.get_team_in_tx(team_name)).await
    }

    async fn create_team_in_tx(&self, team: Team) -> EngineResult<Team> {
        if team.team_name.trim().is_empty() {
            return Err(EngineError::Validation("team_name is required".to_string()));
        }
        if team.members.iter().any(|m| m.user_id.trim().is_empty()) {
            return Err(EngineError::Validation(
                "every member needs a user_id".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        if !tx.insert_team(&team.team_name).await? {
            return Err(EngineError::TeamExists(team.team_name));
        }

        let mut ordered = team
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                i32::try_from(index)
                    .map(|index| (index, member))
                    .map_err(|_| EngineError::Validation("too many team members".to_string()))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        // User rows are locked in user_id order so overlapping creations
        // cannot deadlock. Membership order comes from the index.
        ordered.sort_by(|(_, a), (_, b)| a.user_id.cmp(&b.user_id));

        for (index, member) in ordered {
            tx.add_member(&team.team_name, index, member).await?;
        }

        let members = tx
            .team_members(&team.team_name)
            .await?
            .unwrap_or_default();

        tx.commit().await?;

        info!(team_name = %team.team_name, "Team created");
        Ok(Team {
            team_name: team.team_name,
            members,
        })
    }

    async fn get_team_in_tx(&self, team_name: &str) -> EngineResult<Team> {
        let mut tx = self.store.begin().await?;

        let members = tx
            .team_members(team_name)
            .await?
            .filter(|members| !members.is_empty())
            .ok_or_else(|| EngineError::not_found(ResourceKind::Team, team_name))?;

        tx.commit().await?;

        Ok(Team {
            team_name: team_name.to_string(),
            members,
        })
    }
}
