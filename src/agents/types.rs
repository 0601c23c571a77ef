use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::tokens::{token_enum, TagSet};

token_enum! {
    /// What an agent is registered to do.
    pub enum AgentRole ("role") {
        Worker => "worker",
        Lead => "lead",
        /// Coordination only, never claims work
        Delegate => "delegate",
    }
}

impl Default for AgentRole {
    fn default() -> Self {
        AgentRole::Worker
    }
}

token_enum! {
    /// The registration flag persisted in the agent record.
    ///
    /// Only deregistration changes it. Whether a registered agent is active
    /// or idle is never stored, see [`AgentState`].
    pub enum Registration ("registration") {
        Active => "active",
        Completed => "completed",
    }
}

token_enum! {
    /// Reported agent state, derived from the registration flag and the age
    /// of the last heartbeat.
    pub enum AgentState ("agent state") {
        Active => "active",
        Idle => "idle",
        Completed => "completed",
    }
}

/// Persisted agent record (`agents/<id>/metadata.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub model: String,
    /// Description of what the agent is currently doing
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub capabilities: TagSet,
    #[serde(default)]
    pub role: AgentRole,
    pub state: Registration,
    pub last_heartbeat: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Agent {
    pub fn is_completed(&self) -> bool {
        self.state == Registration::Completed
    }

    /// Liveness as of `now`. Completed is sticky regardless of heartbeats.
    pub fn state_at(&self, now: DateTime<Utc>, liveness_window: Duration) -> AgentState {
        if self.is_completed() {
            AgentState::Completed
        } else if now.signed_duration_since(self.last_heartbeat) < liveness_window {
            AgentState::Active
        } else {
            AgentState::Idle
        }
    }
}

/// Input to [`AgentRegistry::register`](super::AgentRegistry::register).
#[derive(Debug, Clone, Default)]
pub struct NewAgent {
    pub name: String,
    pub command: String,
    pub model: String,
    pub tags: TagSet,
    pub capabilities: TagSet,
    pub role: AgentRole,
}

impl NewAgent {
    pub fn new(name: impl Into<String>, command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_capabilities(mut self, capabilities: TagSet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }
}

/// An agent record together with its derived state.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentView {
    pub agent: Agent,
    pub state: AgentState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(last_heartbeat: DateTime<Utc>) -> Agent {
        Agent {
            id: AgentId::new(),
            name: "cursor-frontend".into(),
            model: "cursor".into(),
            command: "building the login page".into(),
            tags: TagSet::parse("frontend"),
            capabilities: TagSet::parse("typescript,react"),
            role: AgentRole::Worker,
            state: Registration::Active,
            last_heartbeat,
            created_at: last_heartbeat,
            completed_at: None,
            host: None,
        }
    }

    #[test]
    fn test_state_follows_heartbeat_age() {
        let now = Utc::now();
        let window = Duration::minutes(15);
        assert_eq!(agent(now - Duration::minutes(1)).state_at(now, window), AgentState::Active);
        assert_eq!(agent(now - Duration::minutes(15)).state_at(now, window), AgentState::Idle);
        assert_eq!(agent(now - Duration::hours(3)).state_at(now, window), AgentState::Idle);
    }

    #[test]
    fn test_completed_is_sticky() {
        let now = Utc::now();
        let mut a = agent(now);
        a.state = Registration::Completed;
        assert_eq!(a.state_at(now, Duration::minutes(15)), AgentState::Completed);
    }

    #[test]
    fn test_record_layout_matches_directory_scanners() {
        let a = agent(Utc::now());
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["capabilities"], "react,typescript");
        assert_eq!(json["tags"], "frontend");
        assert_eq!(json["state"], "active");
        assert_eq!(json["command"], "building the login page");
        assert!(json.get("lastHeartbeat").is_some());
        assert!(json.get("host").is_none());
    }
}
