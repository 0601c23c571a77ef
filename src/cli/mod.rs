use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

use commands::agent::{
    DeregisterCommand, FindCommand, HeartbeatCommand, ListCommand, RegisterCommand,
};
use commands::config::ConfigCommand;
use commands::message::{
    BroadcastCommand, CheckCommand, ReadCommand, SendCommand, WatchCommand,
};
use commands::plan::PlanCommands;
use commands::task::TaskCommands;
use commands::team::TeamCommands;

#[derive(Parser)]
#[command(name = "team-ai")]
#[command(about = "Coordination backend for independent AI agent sessions")]
#[command(long_about = "team-ai lets many AI agent sessions share one store: register an identity, \
                       exchange messages, claim interdependent tasks, form teams and route plans \
                       through review. Start with 'team-ai register <name>'.")]
pub struct Cli {
    /// Store root directory
    #[arg(long, global = true, help = "Store root (default: $TEAM_AI_HOME or ~/.team-ai)")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new agent identity and print its id
    Register(RegisterCommand),
    /// Refresh an agent's heartbeat, once or on a loop
    Heartbeat(HeartbeatCommand),
    /// Mark an agent as finished
    Deregister(DeregisterCommand),
    /// List registered agents with their liveness
    List(ListCommand),
    /// Find agents offering a capability
    Find(FindCommand),
    /// Send a message to one agent
    Send(SendCommand),
    /// Show an agent's inbox
    Check(CheckCommand),
    /// Mark a message as read
    Read(ReadCommand),
    /// Send a message to every matching agent
    Broadcast(BroadcastCommand),
    /// Follow an agent's inbox until interrupted
    Watch(WatchCommand),
    /// Create, claim and complete shared tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage teams of agents
    Team {
        #[command(subcommand)]
        command: TeamCommands,
    },
    /// Submit and review plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Print the effective configuration
    Config(ConfigCommand),
}
