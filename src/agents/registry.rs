use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{Agent, AgentState, AgentView, NewAgent, Registration};
use crate::clock::Clock;
use crate::error::{CoordinationError, Result};
use crate::ids::AgentId;
use crate::query::AgentFilter;
use crate::store::{Collection, Store};

/// Durable registry of agent identities (the identity store).
#[derive(Clone)]
pub struct AgentRegistry {
    store: Store,
    clock: Arc<dyn Clock>,
    liveness_window: Duration,
}

impl AgentRegistry {
    pub fn new(store: Store, clock: Arc<dyn Clock>, liveness_window: std::time::Duration) -> Self {
        Self {
            store,
            clock,
            liveness_window: Duration::from_std(liveness_window).unwrap_or(Duration::MAX),
        }
    }

    /// Register a new agent. Names are not unique; every call gets a fresh id.
    pub fn register(&self, new: NewAgent) -> Result<AgentId> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(CoordinationError::InvalidInput("agent name must not be empty".into()));
        }

        let now = self.clock.now();
        let agent = Agent {
            id: AgentId::new(),
            name: name.to_string(),
            model: new.model,
            command: new.command,
            tags: new.tags,
            capabilities: new.capabilities,
            role: new.role,
            state: Registration::Active,
            last_heartbeat: now,
            created_at: now,
            completed_at: None,
            host: hostname::get().ok().map(|h| h.to_string_lossy().into_owned()),
        };

        self.store.write(&self.store.agent_path(agent.id), &agent)?;
        info!(
            agent.id = %agent.id,
            agent.name = %agent.name,
            agent.role = %agent.role,
            "Registered agent"
        );
        Ok(agent.id)
    }

    /// Refresh the agent's heartbeat. Returns `false` for unknown or
    /// deregistered agents and on store failures; never errors.
    pub fn heartbeat(&self, id: AgentId) -> bool {
        match self.record_heartbeat(id) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(agent.id = %id, error = %e, "Heartbeat failed");
                false
            }
        }
    }

    /// Like [`heartbeat`](Self::heartbeat) but surfaces store failures, so
    /// callers can tell a stale id from a broken store.
    pub fn record_heartbeat(&self, id: AgentId) -> Result<bool> {
        let path = self.store.agent_path(id);
        if !path.exists() {
            return Ok(false);
        }
        self.store.with_lock(&path, || {
            let Some(mut agent) = self.store.read::<Agent>(&path)? else {
                return Ok(false);
            };
            if agent.is_completed() {
                return Ok(false);
            }
            agent.last_heartbeat = self.clock.now();
            self.store.write(&path, &agent)?;
            debug!(agent.id = %id, "Heartbeat recorded");
            Ok(true)
        })
    }

    /// Mark the agent completed. Unknown or already completed agents are a
    /// no-op and store failures are only logged: this runs on shutdown paths.
    /// Returns whether this call changed the agent.
    pub fn deregister(&self, id: AgentId) -> bool {
        match self.try_deregister(id) {
            Ok(true) => {
                info!(agent.id = %id, "Deregistered agent");
                true
            }
            Ok(false) => {
                debug!(agent.id = %id, "Deregister was a no-op");
                false
            }
            Err(e) => {
                warn!(agent.id = %id, error = %e, "Deregister failed");
                false
            }
        }
    }

    fn try_deregister(&self, id: AgentId) -> Result<bool> {
        let path = self.store.agent_path(id);
        if !path.exists() {
            return Ok(false);
        }
        self.store.with_lock(&path, || {
            let Some(mut agent) = self.store.read::<Agent>(&path)? else {
                return Ok(false);
            };
            if agent.is_completed() {
                return Ok(false);
            }
            agent.state = Registration::Completed;
            agent.completed_at = Some(self.clock.now());
            self.store.write(&path, &agent)?;
            Ok(true)
        })
    }

    pub fn find(&self, id: AgentId) -> Result<Option<Agent>> {
        self.store.read(&self.store.agent_path(id))
    }

    pub fn get(&self, id: AgentId) -> Result<Agent> {
        self.find(id)?.ok_or(CoordinationError::AgentNotFound(id))
    }

    /// Like [`get`](Self::get) but rejects deregistered agents.
    pub fn require_registered(&self, id: AgentId) -> Result<Agent> {
        let agent = self.get(id)?;
        if agent.is_completed() {
            return Err(CoordinationError::AgentCompleted(id));
        }
        Ok(agent)
    }

    /// All agents, oldest registration first.
    pub fn list(&self, include_completed: bool) -> Result<Vec<AgentView>> {
        self.search(&AgentFilter {
            include_completed,
            ..Default::default()
        })
    }

    /// Agents whose capability set contains `capability` (case-insensitive),
    /// completed ones included so callers can see who used to offer it.
    pub fn find_by_capability(&self, capability: &str) -> Result<Vec<AgentView>> {
        self.search(&AgentFilter {
            include_completed: true,
            capability: Some(capability.to_string()),
            ..Default::default()
        })
    }

    pub fn search(&self, filter: &AgentFilter) -> Result<Vec<AgentView>> {
        let now = self.clock.now();
        let mut views: Vec<AgentView> = self
            .store
            .scan_agents::<Agent>()?
            .into_iter()
            .map(|agent| {
                let state = agent.state_at(now, self.liveness_window);
                AgentView { agent, state }
            })
            .filter(|view| filter.matches(view))
            .collect();
        views.sort_by(|a, b| {
            a.agent
                .created_at
                .cmp(&b.agent.created_at)
                .then(a.agent.id.cmp(&b.agent.id))
        });
        Ok(views)
    }

    /// Look an agent up by full id, unique id prefix, or name.
    ///
    /// Name matching is case-insensitive and prefers registered agents over
    /// deregistered ones with the same name.
    pub fn resolve(&self, reference: &str) -> Result<Agent> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CoordinationError::InvalidInput("empty agent reference".into()));
        }
        if let Ok(id) = reference.parse::<AgentId>() {
            return self.find(id)?.ok_or_else(|| no_match(reference));
        }

        let agents = self.store.scan_agents::<Agent>()?;
        let lowered = reference.to_lowercase();

        let mut ambiguous_prefix = None;
        match self.store.resolve_prefix(Collection::Agents, reference) {
            Ok(uuid) => {
                if let Some(agent) = agents.iter().find(|a| a.id.as_uuid() == uuid) {
                    return Ok(agent.clone());
                }
            }
            Err(e @ CoordinationError::AmbiguousReference { .. }) => ambiguous_prefix = Some(e),
            Err(_) => {}
        }

        let named: Vec<&Agent> = agents
            .iter()
            .filter(|a| a.name.to_lowercase() == lowered)
            .collect();
        let registered: Vec<&Agent> = named.iter().copied().filter(|a| !a.is_completed()).collect();
        let pool = if registered.is_empty() { named } else { registered };

        match pool.as_slice() {
            [] => Err(ambiguous_prefix.unwrap_or_else(|| no_match(reference))),
            [only] => Ok((*only).clone()),
            many => Err(CoordinationError::AmbiguousReference {
                kind: "agent",
                reference: reference.to_string(),
                matches: many.len(),
            }),
        }
    }

    /// Count of registered agents per derived state.
    pub fn census(&self) -> Result<[(AgentState, usize); 3]> {
        let views = self.list(true)?;
        let count = |state| views.iter().filter(|v| v.state == state).count();
        Ok([
            (AgentState::Active, count(AgentState::Active)),
            (AgentState::Idle, count(AgentState::Idle)),
            (AgentState::Completed, count(AgentState::Completed)),
        ])
    }
}

fn no_match(reference: &str) -> CoordinationError {
    CoordinationError::NoMatch {
        kind: "agent",
        reference: reference.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::store::LockSettings;
    use crate::tokens::TagSet;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};
    use tempfile::TempDir;

    /// Registry whose clock reads the returned counter (seconds since epoch).
    fn registry() -> (TempDir, AgentRegistry, Arc<AtomicI64>) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), LockSettings::default()).unwrap();
        let seconds = Arc::new(AtomicI64::new(1_700_000_000));
        let reading = Arc::clone(&seconds);
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .returning(move || Utc.timestamp_opt(reading.load(Ordering::SeqCst), 0).unwrap());
        let registry = AgentRegistry::new(store, Arc::new(clock), std::time::Duration::from_secs(900));
        (dir, registry, seconds)
    }

    #[test]
    fn test_register_and_get() {
        let (_dir, registry, _) = registry();
        let id = registry
            .register(
                NewAgent::new("cursor-web", "Fixing CSS", "cursor")
                    .with_capabilities(TagSet::parse("CSS,html")),
            )
            .unwrap();
        let agent = registry.get(id).unwrap();
        assert_eq!(agent.name, "cursor-web");
        assert!(agent.capabilities.contains("css"));
        assert_eq!(agent.state, Registration::Active);
        assert_eq!(agent.last_heartbeat, agent.created_at);
    }

    #[test]
    fn test_register_rejects_blank_name() {
        let (_dir, registry, _) = registry();
        let err = registry.register(NewAgent::new("  ", "x", "y")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationError);
    }

    #[test]
    fn test_names_are_not_unique() {
        let (_dir, registry, _) = registry();
        let a = registry.register(NewAgent::new("twin", "", "")).unwrap();
        let b = registry.register(NewAgent::new("twin", "", "")).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.list(false).unwrap().len(), 2);
    }

    #[test]
    fn test_liveness_is_derived_from_heartbeat() {
        let (_dir, registry, seconds) = registry();
        let id = registry.register(NewAgent::new("a", "", "")).unwrap();
        assert_eq!(registry.list(false).unwrap()[0].state, AgentState::Active);

        seconds.fetch_add(901, Ordering::SeqCst);
        assert_eq!(registry.list(false).unwrap()[0].state, AgentState::Idle);

        assert!(registry.heartbeat(id));
        assert_eq!(registry.list(false).unwrap()[0].state, AgentState::Active);
        // Idle is never persisted
        assert_eq!(registry.get(id).unwrap().state, Registration::Active);
    }

    #[test]
    fn test_record_heartbeat_reports_store_failures() {
        let (_dir, registry, _) = registry();
        let id = registry.register(NewAgent::new("a", "", "")).unwrap();
        assert!(registry.record_heartbeat(id).unwrap());

        std::fs::write(registry.store.agent_path(id), b"{ torn").unwrap();
        assert!(registry.record_heartbeat(id).is_err());
        assert!(!registry.heartbeat(id));
    }

    #[test]
    fn test_heartbeat_fails_quietly() {
        let (_dir, registry, _) = registry();
        assert!(!registry.heartbeat(AgentId::new()));

        let id = registry.register(NewAgent::new("a", "", "")).unwrap();
        registry.deregister(id);
        assert!(!registry.heartbeat(id));
    }

    #[test]
    fn test_heartbeat_for_unknown_id_leaves_no_trace() {
        let (_dir, registry, _) = registry();
        let id = registry.register(NewAgent::new("alpha", "", "")).unwrap();
        let lookalike: AgentId = format!("{}-0000-4000-8000-000000000000", id.short())
            .parse()
            .unwrap();

        assert!(!registry.heartbeat(lookalike));
        registry.deregister(lookalike);

        assert_eq!(registry.resolve(&id.short()).unwrap().id, id);
        assert_eq!(registry.list(true).unwrap().len(), 1);
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let (_dir, registry, seconds) = registry();
        let id = registry.register(NewAgent::new("a", "", "")).unwrap();

        assert!(registry.deregister(id));
        let first = registry.get(id).unwrap();
        assert!(first.is_completed());

        seconds.fetch_add(60, Ordering::SeqCst);
        assert!(!registry.deregister(id));
        assert!(!registry.deregister(AgentId::new()));
        assert_eq!(registry.get(id).unwrap(), first);

        assert!(registry.list(false).unwrap().is_empty());
        assert_eq!(registry.list(true).unwrap()[0].state, AgentState::Completed);
    }

    #[test]
    fn test_find_by_capability_is_case_insensitive_exact() {
        let (_dir, registry, _) = registry();
        registry
            .register(NewAgent::new("py", "", "").with_capabilities(TagSet::parse("Python,testing")))
            .unwrap();
        registry
            .register(NewAgent::new("ts", "", "").with_capabilities(TagSet::parse("typescript")))
            .unwrap();

        let found = registry.find_by_capability("PYTHON").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent.name, "py");
        assert!(registry.find_by_capability("type").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_by_id_prefix_and_name() {
        let (_dir, registry, _) = registry();
        let id = registry.register(NewAgent::new("Reviewer", "", "")).unwrap();

        assert_eq!(registry.resolve(&id.to_string()).unwrap().id, id);
        assert_eq!(registry.resolve(&id.short()).unwrap().id, id);
        assert_eq!(registry.resolve("reviewer").unwrap().id, id);
        assert!(matches!(
            registry.resolve("nobody"),
            Err(CoordinationError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_resolve_prefers_registered_namesakes() {
        let (_dir, registry, _) = registry();
        let old = registry.register(NewAgent::new("builder", "", "")).unwrap();
        registry.deregister(old);
        let new = registry.register(NewAgent::new("builder", "", "")).unwrap();
        assert_eq!(registry.resolve("builder").unwrap().id, new);

        registry.register(NewAgent::new("builder", "", "")).unwrap();
        assert!(matches!(
            registry.resolve("builder"),
            Err(CoordinationError::AmbiguousReference { matches: 2, .. })
        ));
    }
}
