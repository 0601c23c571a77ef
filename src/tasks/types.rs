use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::ids::{AgentId, TaskId, TeamId};
use crate::priority::Priority;
use crate::tokens::{token_enum, TagSet};

token_enum! {
    /// Lifecycle of a task.
    ///
    /// `pending -> in_progress -> completed`, with `blocked` entered and left
    /// only through explicit status updates.
    pub enum TaskStatus ("task status") {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Blocked => "blocked",
    }
}

/// Persisted task record (`tasks/<id>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub depends_on: BTreeSet<TaskId>,
    #[serde(default)]
    pub assignee: Option<AgentId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub team: Option<TeamId>,
    #[serde(default)]
    pub created_by: Option<AgentId>,
    #[serde(default)]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Dependencies that are not completed according to `statuses`.
    /// A dependency missing from the map counts as unmet.
    pub fn unmet_dependencies(&self, statuses: &HashMap<TaskId, TaskStatus>) -> Vec<TaskId> {
        self.depends_on
            .iter()
            .filter(|dep| statuses.get(dep) != Some(&TaskStatus::Completed))
            .copied()
            .collect()
    }

    /// Claimable right now: pending with every dependency completed.
    pub fn is_available(&self, statuses: &HashMap<TaskId, TaskStatus>) -> bool {
        self.status == TaskStatus::Pending && self.unmet_dependencies(statuses).is_empty()
    }
}

/// Input to [`TaskGraph::create`](super::TaskGraph::create).
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub depends_on: Vec<TaskId>,
    pub created_by: Option<AgentId>,
    pub tags: TagSet,
    pub priority: Priority,
    pub team: Option<TeamId>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    pub fn created_by(mut self, agent: AgentId) -> Self {
        self.created_by = Some(agent);
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }
}

/// Set a nullable field or clear it (`none` on the command line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange<T> {
    Set(T),
    Clear,
}

/// Field patch applied by [`TaskGraph::update`](super::TaskGraph::update).
/// `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<FieldChange<AgentId>>,
    pub priority: Option<Priority>,
    pub tags: Option<TagSet>,
    pub team: Option<FieldChange<TeamId>>,
    pub add_dep: Option<TaskId>,
    pub remove_dep: Option<TaskId>,
}

impl TaskPatch {
    pub fn touches_dependencies(&self) -> bool {
        self.add_dep.is_some() || self.remove_dep.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
            && self.team.is_none()
            && !self.touches_dependencies()
    }
}
