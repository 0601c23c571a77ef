use anyhow::Result;
use clap::Args;
use std::convert::Infallible;
use std::time::Duration;

use super::{age, Command, Context};
use crate::agents::{run_heartbeat, AgentRole, AgentState, AgentView, NewAgent};
use crate::shutdown::ShutdownCoordinator;
use crate::tokens::TagSet;

#[derive(Args)]
pub struct RegisterCommand {
    /// Display name; need not be unique
    pub name: String,
    #[arg(long, default_value = "", help = "Command or task the agent is running")]
    pub command: String,
    #[arg(long, default_value = "", help = "Model or tool behind the agent")]
    pub model: String,
    #[arg(long, default_value = "", help = "Comma-separated tags")]
    pub tags: TagSet,
    #[arg(long, default_value = "", help = "Comma-separated capabilities")]
    pub capabilities: TagSet,
    #[arg(long, default_value = "worker", help = "worker, lead or delegate")]
    pub role: AgentRole,
}

impl Command for RegisterCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let id = ctx.coordinator.agents().register(
            NewAgent::new(&self.name, &self.command, &self.model)
                .with_tags(self.tags.clone())
                .with_capabilities(self.capabilities.clone())
                .with_role(self.role),
        )?;
        // Only the id, so callers can capture it
        println!("{id}");
        Ok(())
    }
}

#[derive(Args)]
pub struct HeartbeatCommand {
    /// Agent id, id prefix or name
    pub agent: String,
    #[arg(long = "loop", help = "Keep sending heartbeats until interrupted")]
    pub keep_alive: bool,
    #[arg(long, help = "Seconds between heartbeats (implies --loop)")]
    pub interval: Option<u64>,
    #[arg(long, help = "Deregister the agent when the loop is interrupted")]
    pub deregister_on_exit: bool,
}

impl Command for HeartbeatCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let agents = ctx.coordinator.agents();
        let id = ctx.agent(&self.agent)?;

        if !self.keep_alive && self.interval.is_none() {
            match agents.record_heartbeat(id) {
                Ok(true) => println!("💓 Heartbeat recorded for {}", id.short()),
                Ok(false) => println!("⚠️  Heartbeat not recorded: {} has deregistered", id.short()),
                Err(e) => println!("⚠️  Heartbeat not recorded for {}: {e}", id.short()),
            }
            return Ok(());
        }

        let every = self
            .interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| ctx.config.heartbeat_interval())
            .max(Duration::from_secs(1));
        println!("💓 Sending heartbeats for {} every {}s (Ctrl-C to stop)", id.short(), every.as_secs());

        let beats = run_heartbeat(agents, id, every, ShutdownCoordinator::wait_for_signal()).await;
        println!("🛑 Stopped after {beats} heartbeat(s)");

        if self.deregister_on_exit {
            let mut changed = false;
            ShutdownCoordinator::new()
                .run_cleanup("deregister", async {
                    changed = agents.deregister(id);
                    Ok::<(), Infallible>(())
                })
                .await;
            print_deregistered(id, changed);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct DeregisterCommand {
    /// Agent id or id prefix
    pub agent: String,
}

impl Command for DeregisterCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        // Unknown agents are a silent no-op, like deregister itself
        match ctx.agent(&self.agent) {
            Ok(id) => print_deregistered(id, ctx.coordinator.agents().deregister(id)),
            Err(e) => {
                tracing::debug!(reference = %self.agent, error = %e, "Nothing to deregister");
                println!("🤷 No agent matches '{}', nothing to deregister", self.agent);
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ListCommand {
    #[arg(long, short = 'a', help = "Include deregistered agents")]
    pub all: bool,
    #[arg(long, short = 'v', help = "Show command, tags, capabilities and host")]
    pub verbose: bool,
}

impl Command for ListCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let agents = ctx.coordinator.agents();
        let views = agents.list(self.all)?;
        if views.is_empty() {
            println!("📭 No agents registered");
            return Ok(());
        }

        println!("🤖 AGENTS ({})", views.len());
        for view in &views {
            print_agent(view, self.verbose);
        }

        println!();
        let census = agents.census()?;
        let summary: Vec<String> = census
            .iter()
            .filter(|(state, count)| *count > 0 && (self.all || *state != AgentState::Completed))
            .map(|(state, count)| format!("{count} {state}"))
            .collect();
        println!("📊 {}", summary.join(", "));
        Ok(())
    }
}

#[derive(Args)]
pub struct FindCommand {
    /// Capability to search for (case-insensitive)
    pub capability: String,
    #[arg(long, short = 'v', help = "Show command, tags, capabilities and host")]
    pub verbose: bool,
}

impl Command for FindCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let views = ctx.coordinator.agents().find_by_capability(&self.capability)?;
        if views.is_empty() {
            println!("🔍 No agents offer '{}'", self.capability);
            return Ok(());
        }
        println!("🔍 Agents offering '{}':", self.capability);
        for view in &views {
            print_agent(view, self.verbose);
        }
        Ok(())
    }
}

fn print_deregistered(id: crate::ids::AgentId, changed: bool) {
    if changed {
        println!("👋 Deregistered {}", id.short());
    } else {
        println!("🤷 {} was already deregistered or could not be updated", id.short());
    }
}

fn print_agent(view: &AgentView, verbose: bool) {
    let agent = &view.agent;
    let icon = match view.state {
        AgentState::Active => "🟢",
        AgentState::Idle => "🟡",
        AgentState::Completed => "⚫",
    };
    println!(
        "{icon} {} {:<20} {:<9} {:<8} {} (last seen {})",
        agent.id.short(),
        agent.name,
        view.state,
        agent.role,
        agent.model,
        age(chrono::Utc::now(), agent.last_heartbeat),
    );
    if verbose {
        if !agent.command.is_empty() {
            println!("     ▶ {}", agent.command);
        }
        if !agent.tags.is_empty() {
            println!("     🏷️  tags: {}", agent.tags);
        }
        if !agent.capabilities.is_empty() {
            println!("     🛠️  capabilities: {}", agent.capabilities);
        }
        if let Some(host) = &agent.host {
            println!("     🖥️  host: {host}");
        }
        println!("     🆔 {}", agent.id);
    }
}
