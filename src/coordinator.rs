//! Entry point that wires every component to one shared store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::AgentRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::TeamAiConfig;
use crate::error::Result;
use crate::messaging::MessageBus;
use crate::plans::PlanWorkflow;
use crate::store::{LockSettings, Store};
use crate::tasks::TaskGraph;
use crate::teams::TeamRegistry;

/// Handle on the coordination engine.
///
/// Holds no state besides the store location and settings; every operation
/// reads and writes the shared store, so any number of processes can each
/// open their own `Coordinator` over the same root.
#[derive(Clone)]
pub struct Coordinator {
    store: Store,
    agents: AgentRegistry,
    messages: MessageBus,
    tasks: TaskGraph,
    teams: TeamRegistry,
    plans: PlanWorkflow,
}

impl Coordinator {
    pub fn open(config: &TeamAiConfig) -> Result<Self> {
        Self::with_clock(
            config.store_root(),
            config.lock_settings(),
            config.liveness_window(),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        root: impl AsRef<Path>,
        locks: LockSettings,
        liveness_window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = Store::open(root.as_ref(), locks)?;
        let agents = AgentRegistry::new(store.clone(), clock.clone(), liveness_window);
        Ok(Self {
            messages: MessageBus::new(store.clone(), clock.clone(), agents.clone()),
            tasks: TaskGraph::new(store.clone(), clock.clone(), agents.clone()),
            teams: TeamRegistry::new(store.clone(), clock.clone(), agents.clone()),
            plans: PlanWorkflow::new(store.clone(), clock, agents.clone()),
            agents,
            store,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn messages(&self) -> &MessageBus {
        &self.messages
    }

    pub fn tasks(&self) -> &TaskGraph {
        &self.tasks
    }

    pub fn teams(&self) -> &TeamRegistry {
        &self.teams
    }

    pub fn plans(&self) -> &PlanWorkflow {
        &self.plans
    }
}
