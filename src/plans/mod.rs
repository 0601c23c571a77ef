//! Plan workflow: a submitter proposes, a reviewer approves or rejects once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::agents::AgentRegistry;
use crate::clock::Clock;
use crate::error::{CoordinationError, Result};
use crate::ids::{AgentId, PlanId, TeamId};
use crate::query::PlanFilter;
use crate::store::{Collection, Store};
use crate::tokens::token_enum;

token_enum! {
    /// `pending` moves exactly once to `approved` or `rejected`.
    pub enum PlanStatus ("plan status") {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

token_enum! {
    pub enum ReviewAction ("review action") {
        Approve => "approve",
        Reject => "reject",
    }
}

impl ReviewAction {
    pub fn outcome(self) -> PlanStatus {
        match self {
            ReviewAction::Approve => PlanStatus::Approved,
            ReviewAction::Reject => PlanStatus::Rejected,
        }
    }
}

/// Persisted plan record (`plans/<id>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub submitter: Option<AgentId>,
    pub reviewer: AgentId,
    #[serde(default)]
    pub team: Option<TeamId>,
    pub status: PlanStatus,
    #[serde(default)]
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Input to [`PlanWorkflow::submit`].
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub title: String,
    pub body: String,
    pub reviewer: AgentId,
    pub submitter: Option<AgentId>,
    pub team: Option<TeamId>,
}

#[derive(Clone)]
pub struct PlanWorkflow {
    store: Store,
    clock: Arc<dyn Clock>,
    agents: AgentRegistry,
}

impl PlanWorkflow {
    pub fn new(store: Store, clock: Arc<dyn Clock>, agents: AgentRegistry) -> Self {
        Self { store, clock, agents }
    }

    fn path(&self, id: PlanId) -> PathBuf {
        self.store.record_path(Collection::Plans, id)
    }

    fn load(&self, id: PlanId) -> Result<Plan> {
        self.store
            .read(&self.path(id))?
            .ok_or(CoordinationError::PlanNotFound(id))
    }

    pub fn submit(&self, new: NewPlan) -> Result<PlanId> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(CoordinationError::InvalidInput("plan title must not be empty".into()));
        }
        self.agents.get(new.reviewer)?;
        if let Some(submitter) = new.submitter {
            self.agents.get(submitter)?;
        }
        if let Some(team) = new.team {
            if !self.store.record_path(Collection::Teams, team).exists() {
                return Err(CoordinationError::TeamNotFound(team));
            }
        }

        let plan = Plan {
            id: PlanId::new(),
            title: title.to_string(),
            body: new.body,
            submitter: new.submitter,
            reviewer: new.reviewer,
            team: new.team,
            status: PlanStatus::Pending,
            feedback: None,
            created_at: self.clock.now(),
            reviewed_at: None,
        };
        self.store.write(&self.path(plan.id), &plan)?;
        info!(plan.id = %plan.id, reviewer = %plan.reviewer, submitter = ?plan.submitter, "Plan submitted");
        Ok(plan.id)
    }

    /// Approve or reject a pending plan. A plan is reviewed at most once.
    pub fn review(&self, id: PlanId, action: ReviewAction, feedback: Option<String>) -> Result<Plan> {
        let path = self.path(id);
        self.store.with_lock(&path, || {
            let mut plan = self.load(id)?;
            if plan.status != PlanStatus::Pending {
                return Err(CoordinationError::AlreadyReviewed {
                    plan: id,
                    status: plan.status.to_string(),
                });
            }
            plan.status = action.outcome();
            plan.feedback = feedback;
            plan.reviewed_at = Some(self.clock.now());
            self.store.write(&path, &plan)?;
            info!(plan.id = %id, status = %plan.status, "Plan reviewed");
            Ok(plan)
        })
    }

    pub fn get(&self, id: PlanId) -> Result<Plan> {
        self.load(id)
    }

    /// Plans matching `filter`, oldest first.
    pub fn list(&self, filter: &PlanFilter) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .store
            .scan::<Plan>(&self.store.collection_dir(Collection::Plans))?
            .into_iter()
            .filter(|plan| filter.matches(plan))
            .collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(plans)
    }
}
