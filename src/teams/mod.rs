//! Team registry: named groupings of agents with a lead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::agents::AgentRegistry;
use crate::clock::Clock;
use crate::error::{CoordinationError, Result};
use crate::ids::{AgentId, TeamId};
use crate::store::{Collection, Store};

/// Persisted team record (`teams/<id>.json`). The lead is always a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub lead: AgentId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: BTreeSet<AgentId>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn is_member(&self, agent: AgentId) -> bool {
        self.members.contains(&agent)
    }
}

#[derive(Clone)]
pub struct TeamRegistry {
    store: Store,
    clock: Arc<dyn Clock>,
    agents: AgentRegistry,
}

impl TeamRegistry {
    pub fn new(store: Store, clock: Arc<dyn Clock>, agents: AgentRegistry) -> Self {
        Self { store, clock, agents }
    }

    fn path(&self, id: TeamId) -> PathBuf {
        self.store.record_path(Collection::Teams, id)
    }

    fn load(&self, id: TeamId) -> Result<Team> {
        self.store
            .read(&self.path(id))?
            .ok_or(CoordinationError::TeamNotFound(id))
    }

    /// Create a team; the lead becomes its first member.
    pub fn create(&self, name: &str, lead: AgentId, description: &str) -> Result<TeamId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoordinationError::InvalidInput("team name must not be empty".into()));
        }
        self.agents.require_registered(lead)?;

        let team = Team {
            id: TeamId::new(),
            name: name.to_string(),
            lead,
            description: description.to_string(),
            members: BTreeSet::from([lead]),
            created_at: self.clock.now(),
        };
        self.store.write(&self.path(team.id), &team)?;
        info!(team.id = %team.id, team.name = %team.name, lead = %lead, "Created team");
        Ok(team.id)
    }

    pub fn get(&self, id: TeamId) -> Result<Team> {
        self.load(id)
    }

    /// Add `agent` to the team. Returns `false` if it was already a member.
    pub fn join(&self, id: TeamId, agent: AgentId) -> Result<bool> {
        let path = self.path(id);
        self.store.with_lock(&path, || {
            let mut team = self.load(id)?;
            self.agents.require_registered(agent)?;
            if !team.members.insert(agent) {
                debug!(team.id = %id, agent.id = %agent, "Agent already in team");
                return Ok(false);
            }
            self.store.write(&path, &team)?;
            info!(team.id = %id, agent.id = %agent, members = team.members.len(), "Agent joined team");
            Ok(true)
        })
    }

    /// Remove `agent` from the team. Returns `false` if it was not a member.
    /// The lead cannot leave.
    pub fn leave(&self, id: TeamId, agent: AgentId) -> Result<bool> {
        let path = self.path(id);
        self.store.with_lock(&path, || {
            let mut team = self.load(id)?;
            if team.lead == agent {
                return Err(CoordinationError::LeadCannotLeave { team: id, agent });
            }
            if !team.members.remove(&agent) {
                return Ok(false);
            }
            self.store.write(&path, &team)?;
            info!(team.id = %id, agent.id = %agent, "Agent left team");
            Ok(true)
        })
    }

    /// All teams, oldest first, or only those `member` belongs to.
    pub fn list(&self, member: Option<AgentId>) -> Result<Vec<Team>> {
        let mut teams: Vec<Team> = self
            .store
            .scan::<Team>(&self.store.collection_dir(Collection::Teams))?
            .into_iter()
            .filter(|team| member.map_or(true, |agent| team.is_member(agent)))
            .collect();
        teams.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(teams)
    }
}
