use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{FieldChange, NewTask, Task, TaskPatch, TaskStatus};
use crate::agents::AgentRegistry;
use crate::clock::Clock;
use crate::error::{CoordinationError, Result};
use crate::ids::{AgentId, TaskId, TeamId};
use crate::query::TaskFilter;
use crate::store::{Collection, Store};

/// Shared task list with dependency tracking and exclusive claims.
///
/// Every read-modify-write of a task runs under that task's lock, which is
/// what makes two concurrent claims resolve to exactly one winner.
/// Dependency edits additionally hold the graph lock (always taken first) so
/// that two edits cannot close a cycle between them.
#[derive(Clone)]
pub struct TaskGraph {
    store: Store,
    clock: Arc<dyn Clock>,
    agents: AgentRegistry,
}

impl TaskGraph {
    pub fn new(store: Store, clock: Arc<dyn Clock>, agents: AgentRegistry) -> Self {
        Self { store, clock, agents }
    }

    fn path(&self, id: TaskId) -> PathBuf {
        self.store.record_path(Collection::Tasks, id)
    }

    fn load(&self, id: TaskId) -> Result<Task> {
        self.store
            .read(&self.path(id))?
            .ok_or(CoordinationError::TaskNotFound(id))
    }

    fn exists(&self, id: TaskId) -> bool {
        self.path(id).exists()
    }

    fn team_exists(&self, team: TeamId) -> bool {
        self.store.record_path(Collection::Teams, team).exists()
    }

    pub fn create(&self, new: NewTask) -> Result<TaskId> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(CoordinationError::InvalidInput("task title must not be empty".into()));
        }

        let id = TaskId::new();
        for dep in &new.depends_on {
            if !self.exists(*dep) {
                return Err(CoordinationError::UnknownDependency { task: id, dependency: *dep });
            }
        }
        if let Some(agent) = new.created_by {
            self.agents.get(agent)?;
        }
        if let Some(team) = new.team {
            if !self.team_exists(team) {
                return Err(CoordinationError::TeamNotFound(team));
            }
        }

        // Dependencies can only point at tasks that already exist, so a new
        // task can never close a cycle.
        let now = self.clock.now();
        let task = Task {
            id,
            title: title.to_string(),
            description: new.description,
            status: TaskStatus::Pending,
            depends_on: new.depends_on.into_iter().collect(),
            assignee: None,
            priority: new.priority,
            tags: new.tags,
            team: new.team,
            created_by: new.created_by,
            result: None,
            created_at: now,
            updated_at: now,
            claimed_at: None,
            completed_at: None,
        };
        self.store.write(&self.path(id), &task)?;
        info!(
            task.id = %id,
            task.title = %task.title,
            dependencies = task.depends_on.len(),
            "Created task"
        );
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Result<Task> {
        self.load(id)
    }

    /// Tasks matching `filter`, highest priority first, then oldest first.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.snapshot()?;
        let statuses = status_map(&tasks);
        let mut selected: Vec<Task> = tasks
            .into_iter()
            .filter(|task| filter.matches(task, &statuses))
            .collect();
        selected.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(selected)
    }

    /// Take exclusive ownership of a pending task whose dependencies are done.
    pub fn claim(&self, id: TaskId, agent: AgentId) -> Result<Task> {
        let path = self.path(id);
        self.store.with_lock(&path, || {
            let mut task = self.load(id)?;

            let unmet = self.unmet_dependencies(&task)?;
            if !unmet.is_empty() {
                return Err(CoordinationError::DependenciesUnmet { task: id, unmet });
            }
            match task.status {
                TaskStatus::Pending => {}
                TaskStatus::InProgress => {
                    return Err(CoordinationError::AlreadyClaimed {
                        task: id,
                        assignee: task.assignee,
                    })
                }
                TaskStatus::Completed | TaskStatus::Blocked => {
                    return Err(CoordinationError::NotClaimable {
                        task: id,
                        status: task.status.to_string(),
                    })
                }
            }
            self.agents.require_registered(agent)?;

            let now = self.clock.now();
            task.status = TaskStatus::InProgress;
            task.assignee = Some(agent);
            task.claimed_at = Some(now);
            task.updated_at = now;
            self.store.write(&path, &task)?;

            info!(task.id = %id, agent.id = %agent, "Task claimed");
            Ok(task)
        })
    }

    /// Finish an in-progress task, recording its result.
    pub fn complete(&self, id: TaskId, result: Option<String>) -> Result<Task> {
        let path = self.path(id);
        self.store.with_lock(&path, || {
            let mut task = self.load(id)?;
            if task.status != TaskStatus::InProgress {
                return Err(CoordinationError::NotInProgress {
                    task: id,
                    status: task.status.to_string(),
                });
            }

            let now = self.clock.now();
            task.status = TaskStatus::Completed;
            task.result = result;
            task.completed_at = Some(now);
            task.updated_at = now;
            self.store.write(&path, &task)?;

            info!(task.id = %id, assignee = ?task.assignee, "Task completed");
            Ok(task)
        })
    }

    /// Apply a field patch. Nothing is written unless the whole patch is valid.
    pub fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        if patch.touches_dependencies() {
            self.store.with_graph_lock(|| self.apply_patch(id, patch))
        } else {
            self.apply_patch(id, patch)
        }
    }

    fn apply_patch(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let path = self.path(id);
        self.store.with_lock(&path, || {
            let mut task = self.load(id)?;

            if let Some(dep) = patch.add_dep {
                self.add_dependency(&mut task, dep)?;
            }
            if let Some(dep) = patch.remove_dep {
                if task.depends_on.remove(&dep) {
                    debug!(task.id = %id, dependency = %dep, "Removed dependency");
                }
            }

            if let Some(title) = patch.title {
                let title = title.trim();
                if title.is_empty() {
                    return Err(CoordinationError::InvalidInput("task title must not be empty".into()));
                }
                task.title = title.to_string();
            }
            if let Some(description) = patch.description {
                task.description = description;
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(tags) = patch.tags {
                task.tags = tags;
            }
            match patch.team {
                Some(FieldChange::Set(team)) => {
                    if !self.team_exists(team) {
                        return Err(CoordinationError::TeamNotFound(team));
                    }
                    task.team = Some(team);
                }
                Some(FieldChange::Clear) => task.team = None,
                None => {}
            }

            if let Some(status) = patch.status {
                apply_status(&mut task, status)?;
            }
            if let Some(change) = patch.assignee {
                self.apply_assignee(&mut task, change)?;
            }

            task.updated_at = self.clock.now();
            self.store.write(&path, &task)?;
            info!(task.id = %id, status = %task.status, "Task updated");
            Ok(task)
        })
    }

    fn add_dependency(&self, task: &mut Task, dep: TaskId) -> Result<()> {
        if dep == task.id {
            return Err(CoordinationError::CyclicDependency { task: task.id, dependency: dep });
        }
        if task.depends_on.contains(&dep) {
            return Ok(());
        }
        if !self.exists(dep) {
            return Err(CoordinationError::UnknownDependency { task: task.id, dependency: dep });
        }
        if self.depends_transitively(dep, task.id)? {
            return Err(CoordinationError::CyclicDependency { task: task.id, dependency: dep });
        }
        task.depends_on.insert(dep);
        debug!(task.id = %task.id, dependency = %dep, "Added dependency");
        Ok(())
    }

    /// Whether `from` reaches `target` by following dependency edges.
    /// Only called with the graph lock held.
    ///
    /// Records are read strictly: an unreadable task could hide an edge, so
    /// it fails the check instead of being skipped.
    fn depends_transitively(&self, from: TaskId, target: TaskId) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == target {
                return Ok(true);
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(task) = self.store.read::<Task>(&self.path(current))? {
                stack.extend(task.depends_on);
            }
        }
        Ok(false)
    }

    fn apply_assignee(&self, task: &mut Task, change: FieldChange<AgentId>) -> Result<()> {
        match (change, task.status) {
            (_, TaskStatus::Completed) => Err(CoordinationError::AssigneeLocked {
                task: task.id,
                status: task.status.to_string(),
            }),
            (FieldChange::Clear, TaskStatus::InProgress) => {
                info!(task.id = %task.id, previous = ?task.assignee, "Task released back to pending");
                task.assignee = None;
                task.claimed_at = None;
                task.status = TaskStatus::Pending;
                Ok(())
            }
            (FieldChange::Clear, TaskStatus::Pending | TaskStatus::Blocked) => {
                task.assignee = None;
                Ok(())
            }
            (FieldChange::Set(agent), TaskStatus::InProgress | TaskStatus::Blocked) => {
                self.agents.require_registered(agent)?;
                task.assignee = Some(agent);
                Ok(())
            }
            // Pending work is taken with claim, which checks dependencies
            (FieldChange::Set(_), TaskStatus::Pending) => Err(CoordinationError::AssigneeLocked {
                task: task.id,
                status: task.status.to_string(),
            }),
        }
    }

    fn unmet_dependencies(&self, task: &Task) -> Result<Vec<TaskId>> {
        let mut unmet = Vec::new();
        for dep in &task.depends_on {
            let done = self
                .store
                .read::<Task>(&self.path(*dep))?
                .is_some_and(|d| d.status == TaskStatus::Completed);
            if !done {
                unmet.push(*dep);
            }
        }
        Ok(unmet)
    }

    fn snapshot(&self) -> Result<Vec<Task>> {
        self.store.scan(&self.store.collection_dir(Collection::Tasks))
    }
}

/// Explicit status changes. `in_progress` and `completed` are only reachable
/// through claim and complete.
fn apply_status(task: &mut Task, to: TaskStatus) -> Result<()> {
    use TaskStatus::*;
    match (task.status, to) {
        (from, to) if from == to => Ok(()),
        (Pending | InProgress, Blocked) => {
            task.status = Blocked;
            Ok(())
        }
        (Blocked, Pending) => {
            task.status = Pending;
            task.assignee = None;
            task.claimed_at = None;
            Ok(())
        }
        (from, to) => Err(CoordinationError::InvalidTransition {
            task: task.id,
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

fn status_map(tasks: &[Task]) -> HashMap<TaskId, TaskStatus> {
    tasks.iter().map(|task| (task.id, task.status)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::NewAgent;
    use crate::clock::SystemClock;
    use crate::error::ErrorKind;
    use crate::priority::Priority;
    use crate::store::LockSettings;
    use crate::tokens::TagSet;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        agents: AgentRegistry,
        tasks: TaskGraph,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), LockSettings::default()).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let agents = AgentRegistry::new(store.clone(), clock.clone(), std::time::Duration::from_secs(900));
        let tasks = TaskGraph::new(store, clock, agents.clone());
        Fixture { _dir: dir, agents, tasks }
    }

    impl Fixture {
        fn agent(&self, name: &str) -> AgentId {
            self.agents.register(NewAgent::new(name, "", "test")).unwrap()
        }
    }

    #[test]
    fn test_create_rejects_unknown_dependency() {
        let f = fixture();
        let err = f
            .tasks
            .create(NewTask::new("b").depends_on([TaskId::new()]))
            .unwrap_err();
        assert!(matches!(err, CoordinationError::UnknownDependency { .. }));
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(f.tasks.list(&TaskFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_create_validates_creator_and_team() {
        let f = fixture();
        let err = f.tasks.create(NewTask::new("a").created_by(AgentId::new())).unwrap_err();
        assert!(matches!(err, CoordinationError::AgentNotFound(_)));
        let err = f.tasks.create(NewTask::new("a").in_team(TeamId::new())).unwrap_err();
        assert!(matches!(err, CoordinationError::TeamNotFound(_)));
    }

    #[test]
    fn test_claim_then_complete() {
        let f = fixture();
        let worker = f.agent("worker");
        let id = f.tasks.create(NewTask::new("write docs")).unwrap();

        let claimed = f.tasks.claim(id, worker).unwrap();
        assert_eq!(claimed.status, TaskStatus::InProgress);
        assert_eq!(claimed.assignee, Some(worker));

        let done = f.tasks.complete(id, Some("merged".into())).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("merged"));
    }

    #[test]
    fn test_second_claim_conflicts() {
        let f = fixture();
        let (a, b) = (f.agent("a"), f.agent("b"));
        let id = f.tasks.create(NewTask::new("t")).unwrap();
        f.tasks.claim(id, a).unwrap();

        let err = f.tasks.claim(id, b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(f.tasks.get(id).unwrap().assignee, Some(a));
    }

    #[test]
    fn test_claim_checks_agent() {
        let f = fixture();
        let id = f.tasks.create(NewTask::new("t")).unwrap();
        let err = f.tasks.claim(id, AgentId::new()).unwrap_err();
        assert!(matches!(err, CoordinationError::AgentNotFound(_)));

        let gone = f.agent("gone");
        f.agents.deregister(gone);
        let err = f.tasks.claim(id, gone).unwrap_err();
        assert!(matches!(err, CoordinationError::AgentCompleted(_)));
        assert_eq!(f.tasks.get(id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_claim_unknown_task() {
        let f = fixture();
        let agent = f.agent("a");
        let err = f.tasks.claim(TaskId::new(), agent).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let f = fixture();
        let id = f.tasks.create(NewTask::new("t")).unwrap();
        let err = f.tasks.complete(id, None).unwrap_err();
        assert!(matches!(err, CoordinationError::NotInProgress { .. }));

        let agent = f.agent("a");
        f.tasks.claim(id, agent).unwrap();
        f.tasks.complete(id, None).unwrap();
        let err = f.tasks.complete(id, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_dependency_gating_applies_to_any_status() {
        let f = fixture();
        let agent = f.agent("a");
        let a = f.tasks.create(NewTask::new("a")).unwrap();
        let b = f.tasks.create(NewTask::new("b").depends_on([a])).unwrap();

        let err = f.tasks.claim(b, agent).unwrap_err();
        assert!(matches!(err, CoordinationError::DependenciesUnmet { ref unmet, .. } if unmet == &vec![a]));

        f.tasks
            .update(b, TaskPatch { status: Some(TaskStatus::Blocked), ..Default::default() })
            .unwrap();
        let err = f.tasks.claim(b, agent).unwrap_err();
        assert!(matches!(err, CoordinationError::DependenciesUnmet { .. }));
    }

    #[test]
    fn test_add_dep_rejects_cycles() {
        let f = fixture();
        let a = f.tasks.create(NewTask::new("a")).unwrap();
        let b = f.tasks.create(NewTask::new("b").depends_on([a])).unwrap();
        let c = f.tasks.create(NewTask::new("c").depends_on([b])).unwrap();

        let err = f
            .tasks
            .update(a, TaskPatch { add_dep: Some(c), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, CoordinationError::CyclicDependency { .. }));
        assert!(f.tasks.get(a).unwrap().depends_on.is_empty());

        let err = f
            .tasks
            .update(a, TaskPatch { add_dep: Some(a), ..Default::default() })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        // Removing the closing edge makes the same addition legal
        f.tasks
            .update(c, TaskPatch { remove_dep: Some(b), ..Default::default() })
            .unwrap();
        f.tasks
            .update(a, TaskPatch { add_dep: Some(c), ..Default::default() })
            .unwrap();
        assert!(f.tasks.get(a).unwrap().depends_on.contains(&c));
    }

    #[test]
    fn test_cycle_check_fails_on_unreadable_task() {
        let f = fixture();
        let a = f.tasks.create(NewTask::new("a")).unwrap();
        let c = f.tasks.create(NewTask::new("c").depends_on([a])).unwrap();
        let b = f.tasks.create(NewTask::new("b").depends_on([c])).unwrap();

        // c carries the b -> c -> a edge that would close the cycle
        std::fs::write(f.tasks.path(c), b"{ torn").unwrap();

        let err = f
            .tasks
            .update(a, TaskPatch { add_dep: Some(b), ..Default::default() })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(f.tasks.get(a).unwrap().depends_on.is_empty());
    }

    #[test]
    fn test_add_dep_rejects_unknown_task() {
        let f = fixture();
        let a = f.tasks.create(NewTask::new("a")).unwrap();
        let err = f
            .tasks
            .update(a, TaskPatch { add_dep: Some(TaskId::new()), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, CoordinationError::UnknownDependency { .. }));
    }

    #[test]
    fn test_unassign_returns_task_to_pending() {
        let f = fixture();
        let agent = f.agent("a");
        let id = f.tasks.create(NewTask::new("t")).unwrap();
        f.tasks.claim(id, agent).unwrap();

        let task = f
            .tasks
            .update(id, TaskPatch { assignee: Some(FieldChange::Clear), ..Default::default() })
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assignee, None);

        let other = f.agent("b");
        f.tasks.claim(id, other).unwrap();
    }

    #[test]
    fn test_reassign_in_progress_task() {
        let f = fixture();
        let (a, b) = (f.agent("a"), f.agent("b"));
        let id = f.tasks.create(NewTask::new("t")).unwrap();

        let err = f
            .tasks
            .update(id, TaskPatch { assignee: Some(FieldChange::Set(a)), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, CoordinationError::AssigneeLocked { .. }));

        f.tasks.claim(id, a).unwrap();
        let task = f
            .tasks
            .update(id, TaskPatch { assignee: Some(FieldChange::Set(b)), ..Default::default() })
            .unwrap();
        assert_eq!(task.assignee, Some(b));
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_status_transitions() {
        let f = fixture();
        let agent = f.agent("a");
        let id = f.tasks.create(NewTask::new("t")).unwrap();
        let set = |status| TaskPatch { status: Some(status), ..Default::default() };

        assert_eq!(f.tasks.update(id, set(TaskStatus::Blocked)).unwrap().status, TaskStatus::Blocked);
        let err = f.tasks.claim(id, agent).unwrap_err();
        assert!(matches!(err, CoordinationError::NotClaimable { .. }));
        assert_eq!(f.tasks.update(id, set(TaskStatus::Pending)).unwrap().status, TaskStatus::Pending);

        let err = f.tasks.update(id, set(TaskStatus::Completed)).unwrap_err();
        assert!(matches!(err, CoordinationError::InvalidTransition { .. }));
        let err = f.tasks.update(id, set(TaskStatus::InProgress)).unwrap_err();
        assert!(matches!(err, CoordinationError::InvalidTransition { .. }));

        f.tasks.claim(id, agent).unwrap();
        let blocked = f.tasks.update(id, set(TaskStatus::Blocked)).unwrap();
        assert_eq!(blocked.assignee, Some(agent));
        let pending = f.tasks.update(id, set(TaskStatus::Pending)).unwrap();
        assert_eq!(pending.assignee, None);
    }

    #[test]
    fn test_invalid_patch_writes_nothing() {
        let f = fixture();
        let id = f.tasks.create(NewTask::new("first draft")).unwrap();
        let err = f
            .tasks
            .update(
                id,
                TaskPatch {
                    title: Some("renamed".into()),
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(f.tasks.get(id).unwrap().title, "first draft");
    }

    #[test]
    fn test_list_filters_and_orders() {
        let f = fixture();
        let agent = f.agent("a");
        let low = f
            .tasks
            .create(NewTask::new("low").with_priority(Priority::Low).with_tags(TagSet::parse("docs")))
            .unwrap();
        let high = f.tasks.create(NewTask::new("high").with_priority(Priority::High)).unwrap();
        let normal = f.tasks.create(NewTask::new("normal")).unwrap();
        f.tasks.claim(normal, agent).unwrap();

        let all: Vec<TaskId> = f.tasks.list(&TaskFilter::default()).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(all, vec![high, normal, low]);

        let mine = f
            .tasks
            .list(&TaskFilter { assignee: Some(agent), ..Default::default() })
            .unwrap();
        assert_eq!(mine.len(), 1);

        let docs = f
            .tasks
            .list(&TaskFilter { tag: Some("DOCS".into()), ..Default::default() })
            .unwrap();
        assert_eq!(docs[0].id, low);

        let available: Vec<TaskId> = f.tasks.list(&TaskFilter::available()).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(available, vec![high, low]);
    }
}
