use crate::ids::{AgentId, InvalidId, MessageId, PlanId, TaskId, TeamId};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Machine-checkable failure class carried by every [`CoordinationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown agent, task, team, plan or message
    NotFound,
    /// Operation not allowed from the entity's current state
    InvalidState,
    /// Lost a race against another caller
    Conflict,
    /// Malformed input, unknown or cyclic dependency
    ValidationError,
    /// Transient store failure; retry
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::Unavailable)
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::NotFound => 2,
            ErrorKind::InvalidState => 3,
            ErrorKind::Conflict => 4,
            ErrorKind::ValidationError => 5,
            // EX_TEMPFAIL
            ErrorKind::Unavailable => 75,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the coordination engine can report.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("unknown agent: {0}")]
    AgentNotFound(AgentId),

    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("unknown task: {0}")]
    TaskNotFound(TaskId),

    #[error("unknown team: {0}")]
    TeamNotFound(TeamId),

    #[error("unknown plan: {0}")]
    PlanNotFound(PlanId),

    #[error("unknown message {message} in inbox of {agent}")]
    MessageNotFound { agent: AgentId, message: MessageId },

    #[error("no {kind} matches {reference:?}")]
    NoMatch { kind: &'static str, reference: String },

    #[error("task {task} is already claimed{}", .assignee.map(|a| format!(" by {a}")).unwrap_or_default())]
    AlreadyClaimed { task: TaskId, assignee: Option<AgentId> },

    #[error("task {task} has unmet dependencies: {}", join_ids(.unmet))]
    DependenciesUnmet { task: TaskId, unmet: Vec<TaskId> },

    #[error("task {task} is {status}, only pending tasks can be claimed")]
    NotClaimable { task: TaskId, status: String },

    #[error("task {task} is {status}, only in-progress tasks can be completed")]
    NotInProgress { task: TaskId, status: String },

    #[error("task {task} cannot move from {from} to {to}")]
    InvalidTransition { task: TaskId, from: String, to: String },

    #[error("cannot change the assignee of task {task} while it is {status}")]
    AssigneeLocked { task: TaskId, status: String },

    #[error("agent {0} has deregistered")]
    AgentCompleted(AgentId),

    #[error("plan {plan} was already reviewed ({status})")]
    AlreadyReviewed { plan: PlanId, status: String },

    #[error("agent {agent} leads team {team} and cannot leave it")]
    LeadCannotLeave { team: TeamId, agent: AgentId },

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("adding dependency {dependency} to task {task} would create a cycle")]
    CyclicDependency { task: TaskId, dependency: TaskId },

    #[error("{kind} reference {reference:?} is ambiguous ({matches} matches)")]
    AmbiguousReference {
        kind: &'static str,
        reference: String,
        matches: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    #[error("timed out after {waited_ms}ms waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("corrupt record {}: {source}", .path.display())]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinationError {
    pub fn kind(&self) -> ErrorKind {
        use CoordinationError::*;
        match self {
            AgentNotFound(_)
            | UnknownRecipient(_)
            | TaskNotFound(_)
            | TeamNotFound(_)
            | PlanNotFound(_)
            | MessageNotFound { .. }
            | NoMatch { .. } => ErrorKind::NotFound,
            DependenciesUnmet { .. }
            | NotClaimable { .. }
            | NotInProgress { .. }
            | InvalidTransition { .. }
            | AssigneeLocked { .. }
            | AgentCompleted(_)
            | AlreadyReviewed { .. }
            | LeadCannotLeave { .. } => ErrorKind::InvalidState,
            AlreadyClaimed { .. } => ErrorKind::Conflict,
            UnknownDependency { .. }
            | CyclicDependency { .. }
            | AmbiguousReference { .. }
            | InvalidInput(_)
            | InvalidId(_) => ErrorKind::ValidationError,
            LockTimeout { .. } | CorruptRecord { .. } | Io(_) => ErrorKind::Unavailable,
        }
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

pub type Result<T, E = CoordinationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_the_taxonomy() {
        let task = TaskId::new();
        assert_eq!(
            CoordinationError::AlreadyClaimed { task, assignee: None }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoordinationError::DependenciesUnmet { task, unmet: vec![TaskId::new()] }.kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            CoordinationError::CyclicDependency { task, dependency: TaskId::new() }.kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(CoordinationError::TaskNotFound(task).kind(), ErrorKind::NotFound);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert_eq!(CoordinationError::from(io).kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_only_conflict_and_unavailable_are_retryable() {
        assert!(ErrorKind::Conflict.is_retryable());
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::ValidationError.is_retryable());
    }

    #[test]
    fn test_already_claimed_message_names_assignee() {
        let task = TaskId::new();
        let agent = AgentId::new();
        let err = CoordinationError::AlreadyClaimed { task, assignee: Some(agent) };
        assert!(err.to_string().contains(&agent.to_string()));
    }
}
