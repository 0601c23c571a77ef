//! Identity store: agent registration, heartbeats and lookup.

pub mod heartbeat;
pub mod registry;
pub mod types;

pub use heartbeat::run_heartbeat;
pub use registry::AgentRegistry;
pub use types::{Agent, AgentRole, AgentState, AgentView, NewAgent, Registration};
