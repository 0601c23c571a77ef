//! Read-side filters over agents, tasks and plans.
//!
//! Everything here is a pure predicate over records that were already loaded;
//! the components decide what to load and how to order the result.

use std::collections::HashMap;

use crate::agents::{AgentState, AgentView};
use crate::ids::{AgentId, TaskId, TeamId};
use crate::plans::{Plan, PlanStatus};
use crate::tasks::{Task, TaskStatus};

/// Agent selection used by listing, capability search and broadcast.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub include_completed: bool,
    /// Agent must carry this tag (case-insensitive)
    pub tag: Option<String>,
    /// Agent must offer this capability (case-insensitive)
    pub capability: Option<String>,
    /// Agent to leave out, usually the caller itself
    pub exclude: Option<AgentId>,
}

impl AgentFilter {
    /// Broadcast targets: every agent that has not deregistered, narrowed by
    /// tag and capability, minus `self_id` when `exclude_self` is set.
    pub fn broadcast(
        tag: Option<&str>,
        capability: Option<&str>,
        exclude_self: bool,
        self_id: Option<AgentId>,
    ) -> Self {
        Self {
            include_completed: false,
            tag: tag.map(str::to_string),
            capability: capability.map(str::to_string),
            exclude: if exclude_self { self_id } else { None },
        }
    }

    pub fn matches(&self, view: &AgentView) -> bool {
        if !self.include_completed && view.state == AgentState::Completed {
            return false;
        }
        if self.exclude == Some(view.agent.id) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !view.agent.tags.contains(tag) {
                return false;
            }
        }
        if let Some(capability) = &self.capability {
            if !view.agent.capabilities.contains(capability) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee: Option<AgentId>,
    pub team: Option<TeamId>,
    pub tag: Option<String>,
    /// Only pending tasks whose dependencies are all completed
    pub available_only: bool,
}

impl TaskFilter {
    pub fn available() -> Self {
        Self {
            available_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task, statuses: &HashMap<TaskId, TaskStatus>) -> bool {
        if self.status.is_some_and(|status| task.status != status) {
            return false;
        }
        if self.assignee.is_some() && task.assignee != self.assignee {
            return false;
        }
        if self.team.is_some() && task.team != self.team {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !task.tags.contains(tag) {
                return false;
            }
        }
        !self.available_only || task.is_available(statuses)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub status: Option<PlanStatus>,
    pub reviewer: Option<AgentId>,
    pub submitter: Option<AgentId>,
    pub team: Option<TeamId>,
}

impl PlanFilter {
    pub fn matches(&self, plan: &Plan) -> bool {
        self.status.map_or(true, |status| plan.status == status)
            && self.reviewer.map_or(true, |reviewer| plan.reviewer == reviewer)
            && self.submitter.map_or(true, |submitter| plan.submitter == Some(submitter))
            && self.team.map_or(true, |team| plan.team == Some(team))
    }
}
