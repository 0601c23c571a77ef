use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::TeamAiConfig;
use crate::coordinator::Coordinator;
use crate::ids::{AgentId, PlanId, TaskId, TeamId};
use crate::store::Collection;
use crate::tasks::FieldChange;

pub mod agent;
pub mod config;
pub mod message;
pub mod plan;
pub mod task;
pub mod team;

/// What every command runs against.
pub struct Context {
    pub coordinator: Coordinator,
    pub config: TeamAiConfig,
}

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, ctx: &Context) -> Result<()>;
}

impl Context {
    /// Agent by id, unique id prefix or name.
    pub fn agent(&self, reference: &str) -> Result<AgentId> {
        Ok(self.coordinator.agents().resolve(reference)?.id)
    }

    pub fn task(&self, reference: &str) -> Result<TaskId> {
        Ok(self.resolve(Collection::Tasks, reference)?.into())
    }

    pub fn team(&self, reference: &str) -> Result<TeamId> {
        Ok(self.resolve(Collection::Teams, reference)?.into())
    }

    pub fn plan(&self, reference: &str) -> Result<PlanId> {
        Ok(self.resolve(Collection::Plans, reference)?.into())
    }

    fn resolve(&self, collection: Collection, reference: &str) -> Result<uuid::Uuid> {
        Ok(self.coordinator.store().resolve_prefix(collection, reference)?)
    }

    pub fn optional_agent(&self, reference: Option<&str>) -> Result<Option<AgentId>> {
        reference.map(|r| self.agent(r)).transpose()
    }

    pub fn optional_team(&self, reference: Option<&str>) -> Result<Option<TeamId>> {
        reference.map(|r| self.team(r)).transpose()
    }

    /// `none` clears a nullable field, anything else is resolved with `resolve`.
    pub fn field_change<T>(
        &self,
        raw: Option<&str>,
        resolve: impl FnOnce(&str) -> Result<T>,
    ) -> Result<Option<FieldChange<T>>> {
        match raw {
            None => Ok(None),
            Some(value) if value.trim().eq_ignore_ascii_case("none") => Ok(Some(FieldChange::Clear)),
            Some(value) => Ok(Some(FieldChange::Set(resolve(value)?))),
        }
    }
}

/// `3m ago` style age for listings.
pub fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

/// First line of `text`, cut to `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        format!("{}...", line.chars().take(max).collect::<String>())
    } else {
        line.to_string()
    }
}

pub async fn show_how_to_get_work() -> Result<()> {
    println!("🤝 team-ai - coordination for independent agent sessions");
    println!();
    println!("To get started:");
    println!("  🆔 team-ai register <name>          # Get an agent id");
    println!("  📋 team-ai task list --available    # See claimable work");
    println!("  ✋ team-ai task claim <task> --agent <id>");
    println!("  📬 team-ai check <id>               # Read your inbox");
    println!();
    println!("Coordination:");
    println!("  📣 team-ai broadcast <subject> <body> --from <id>");
    println!("  👥 team-ai team create <name> --lead <id>");
    println!("  📝 team-ai plan submit <title> --reviewer <id>");
    println!();
    println!("💡 Keep your session visible with 'team-ai heartbeat <id> --loop'");
    Ok(())
}
