// team-ai library - coordination engine for independent AI agent sessions
// This exposes the core components for the CLI and for integration tests

pub mod agents;
pub mod cli;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod messaging;
pub mod plans;
pub mod priority;
pub mod query;
pub mod shutdown;
pub mod store;
pub mod tasks;
pub mod teams;
pub mod telemetry;
pub mod tokens;

// Re-export key types for easy access
pub use agents::{Agent, AgentRegistry, AgentRole, AgentState, NewAgent};
pub use clock::{Clock, SystemClock};
pub use crate::config::{config, TeamAiConfig};
pub use coordinator::Coordinator;
pub use error::{CoordinationError, ErrorKind, Result};
pub use ids::{AgentId, MessageId, PlanId, TaskId, TeamId};
pub use messaging::{Envelope, Message, MessageBus, MessageType};
pub use plans::{NewPlan, Plan, PlanStatus, PlanWorkflow, ReviewAction};
pub use priority::Priority;
pub use query::{AgentFilter, PlanFilter, TaskFilter};
pub use shutdown::ShutdownCoordinator;
pub use store::{LockSettings, Store};
pub use tasks::{FieldChange, NewTask, Task, TaskGraph, TaskPatch, TaskStatus};
pub use teams::{Team, TeamRegistry};
pub use telemetry::{create_coordination_span, generate_correlation_id, init_telemetry};
pub use tokens::TagSet;
