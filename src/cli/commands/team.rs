use anyhow::Result;
use clap::{Args, Subcommand};

use super::{age, Command, Context};
use crate::teams::Team;

#[derive(Subcommand)]
pub enum TeamCommands {
    /// Create a team led by an agent and print its id
    Create(CreateTeamCommand),
    /// List teams
    List(ListTeamsCommand),
    /// Show one team and its members
    Show(ShowTeamCommand),
    /// Add an agent to a team
    Join(MembershipCommand),
    /// Remove an agent from a team
    Leave(MembershipCommand),
}

impl Command for TeamCommands {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            TeamCommands::Create(cmd) => cmd.execute(ctx).await,
            TeamCommands::List(cmd) => cmd.execute(ctx).await,
            TeamCommands::Show(cmd) => cmd.execute(ctx).await,
            TeamCommands::Join(cmd) => {
                let (team, agent) = cmd.resolve(ctx)?;
                if ctx.coordinator.teams().join(team, agent)? {
                    println!("👥 {} joined team {}", agent.short(), team.short());
                } else {
                    println!("👥 {} is already in team {}", agent.short(), team.short());
                }
                Ok(())
            }
            TeamCommands::Leave(cmd) => {
                let (team, agent) = cmd.resolve(ctx)?;
                if ctx.coordinator.teams().leave(team, agent)? {
                    println!("🚪 {} left team {}", agent.short(), team.short());
                } else {
                    println!("🚪 {} was not in team {}", agent.short(), team.short());
                }
                Ok(())
            }
        }
    }
}

#[derive(Args)]
pub struct CreateTeamCommand {
    pub name: String,
    #[arg(long, help = "Lead agent (id, prefix or name); becomes the first member")]
    pub lead: String,
    #[arg(long, short = 'd', default_value = "")]
    pub description: String,
}

impl Command for CreateTeamCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let lead = ctx.agent(&self.lead)?;
        let id = ctx.coordinator.teams().create(&self.name, lead, &self.description)?;
        println!("{id}");
        Ok(())
    }
}

#[derive(Args)]
pub struct ListTeamsCommand {
    #[arg(long, help = "Only teams this agent belongs to")]
    pub agent: Option<String>,
}

impl Command for ListTeamsCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let member = ctx.optional_agent(self.agent.as_deref())?;
        let teams = ctx.coordinator.teams().list(member)?;
        if teams.is_empty() {
            println!("👥 No teams");
            return Ok(());
        }
        for team in &teams {
            println!(
                "👥 {} {:<20} {} member(s), lead {}",
                team.id.short(),
                team.name,
                team.members.len(),
                team.lead.short()
            );
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ShowTeamCommand {
    /// Team id or prefix
    pub team: String,
}

impl Command for ShowTeamCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let team = ctx.coordinator.teams().get(ctx.team(&self.team)?)?;
        print_team(ctx, &team);
        Ok(())
    }
}

#[derive(Args)]
pub struct MembershipCommand {
    /// Team id or prefix
    pub team: String,
    #[arg(long, help = "Agent (id, prefix or name)")]
    pub agent: String,
}

impl MembershipCommand {
    fn resolve(&self, ctx: &Context) -> Result<(crate::ids::TeamId, crate::ids::AgentId)> {
        Ok((ctx.team(&self.team)?, ctx.agent(&self.agent)?))
    }
}

fn print_team(ctx: &Context, team: &Team) {
    println!("👥 {} {}", team.id, team.name);
    if !team.description.is_empty() {
        println!("   {}", team.description);
    }
    println!("   created {}", age(chrono::Utc::now(), team.created_at));
    for member in &team.members {
        let name = ctx
            .coordinator
            .agents()
            .find(*member)
            .ok()
            .flatten()
            .map(|agent| agent.name)
            .unwrap_or_default();
        let marker = if *member == team.lead { "⭐" } else { "  " };
        println!("   {marker} {} {name}", member.short());
    }
}
