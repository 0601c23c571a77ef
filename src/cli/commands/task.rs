use anyhow::Result;
use clap::{Args, Subcommand};

use super::{age, preview, Command, Context};
use crate::ids::TaskId;
use crate::priority::Priority;
use crate::query::TaskFilter;
use crate::tasks::{NewTask, Task, TaskPatch, TaskStatus};
use crate::tokens::TagSet;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task and print its id
    Create(CreateTaskCommand),
    /// List tasks, highest priority first
    List(ListTasksCommand),
    /// Show one task in full
    Show(ShowTaskCommand),
    /// Claim a pending task whose dependencies are done
    Claim(ClaimTaskCommand),
    /// Mark an in-progress task completed
    Complete(CompleteTaskCommand),
    /// Change task fields or dependencies
    Update(UpdateTaskCommand),
}

impl Command for TaskCommands {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            TaskCommands::Create(cmd) => cmd.execute(ctx).await,
            TaskCommands::List(cmd) => cmd.execute(ctx).await,
            TaskCommands::Show(cmd) => cmd.execute(ctx).await,
            TaskCommands::Claim(cmd) => cmd.execute(ctx).await,
            TaskCommands::Complete(cmd) => cmd.execute(ctx).await,
            TaskCommands::Update(cmd) => cmd.execute(ctx).await,
        }
    }
}

#[derive(Args)]
pub struct CreateTaskCommand {
    pub title: String,
    #[arg(long, short = 'd', default_value = "")]
    pub description: String,
    #[arg(long, value_delimiter = ',', help = "Comma-separated ids of tasks this one waits for")]
    pub depends_on: Vec<String>,
    #[arg(long, help = "Creating agent (id, prefix or name)")]
    pub created_by: Option<String>,
    #[arg(long, default_value = "", help = "Comma-separated tags")]
    pub tags: TagSet,
    #[arg(long, default_value = "normal", help = "low, normal or high")]
    pub priority: Priority,
    #[arg(long, help = "Owning team (id or prefix)")]
    pub team: Option<String>,
}

impl Command for CreateTaskCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let deps = self
            .depends_on
            .iter()
            .filter(|d| !d.trim().is_empty())
            .map(|d| ctx.task(d))
            .collect::<Result<Vec<TaskId>>>()?;

        let mut new = NewTask::new(&self.title)
            .with_description(&self.description)
            .depends_on(deps)
            .with_tags(self.tags.clone())
            .with_priority(self.priority);
        if let Some(agent) = ctx.optional_agent(self.created_by.as_deref())? {
            new = new.created_by(agent);
        }
        if let Some(team) = ctx.optional_team(self.team.as_deref())? {
            new = new.in_team(team);
        }

        let id = ctx.coordinator.tasks().create(new)?;
        println!("{id}");
        Ok(())
    }
}

#[derive(Args)]
pub struct ListTasksCommand {
    #[arg(long, help = "pending, in_progress, completed or blocked")]
    pub status: Option<TaskStatus>,
    #[arg(long, help = "Assigned agent (id, prefix or name)")]
    pub assignee: Option<String>,
    #[arg(long, help = "Owning team (id or prefix)")]
    pub team: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long, help = "Only pending tasks whose dependencies are all completed")]
    pub available: bool,
}

impl Command for ListTasksCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let filter = TaskFilter {
            status: self.status,
            assignee: ctx.optional_agent(self.assignee.as_deref())?,
            team: ctx.optional_team(self.team.as_deref())?,
            tag: self.tag.clone(),
            available_only: self.available,
        };
        let tasks = ctx.coordinator.tasks().list(&filter)?;
        if tasks.is_empty() {
            println!("📋 No matching tasks");
            return Ok(());
        }

        println!("📋 TASKS ({})", tasks.len());
        for task in &tasks {
            let deps = if task.depends_on.is_empty() {
                String::new()
            } else {
                format!(" ⛓ {}", task.depends_on.len())
            };
            let assignee = task
                .assignee
                .map(|a| format!(" → {}", a.short()))
                .unwrap_or_default();
            println!(
                "{} {} {:<11} {:<6} {}{}{}",
                status_icon(task.status),
                task.id.short(),
                task.status,
                task.priority,
                preview(&task.title, 60),
                assignee,
                deps,
            );
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ShowTaskCommand {
    /// Task id or prefix
    pub task: String,
}

impl Command for ShowTaskCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let task = ctx.coordinator.tasks().get(ctx.task(&self.task)?)?;
        print_task(&task);
        Ok(())
    }
}

#[derive(Args)]
pub struct ClaimTaskCommand {
    /// Task id or prefix
    pub task: String,
    #[arg(long, help = "Claiming agent (id, prefix or name)")]
    pub agent: String,
}

impl Command for ClaimTaskCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let task_id = ctx.task(&self.task)?;
        let agent = ctx.agent(&self.agent)?;
        let task = ctx.coordinator.tasks().claim(task_id, agent)?;
        println!("✋ Claimed {}: {}", task.id.short(), task.title);
        Ok(())
    }
}

#[derive(Args)]
pub struct CompleteTaskCommand {
    /// Task id or prefix
    pub task: String,
    #[arg(long, help = "Outcome summary stored on the task")]
    pub result: Option<String>,
}

impl Command for CompleteTaskCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let task = ctx
            .coordinator
            .tasks()
            .complete(ctx.task(&self.task)?, self.result.clone())?;
        println!("✅ Completed {}: {}", task.id.short(), task.title);
        Ok(())
    }
}

#[derive(Args)]
pub struct UpdateTaskCommand {
    /// Task id or prefix
    pub task: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    #[arg(long, help = "pending or blocked")]
    pub status: Option<TaskStatus>,
    #[arg(long, help = "Agent (id, prefix or name), or 'none' to release the task")]
    pub assignee: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long, help = "Replace the tags (comma-separated)")]
    pub tags: Option<TagSet>,
    #[arg(long, help = "Team (id or prefix), or 'none'")]
    pub team: Option<String>,
    #[arg(long, help = "Add a dependency on this task")]
    pub add_dep: Option<String>,
    #[arg(long, help = "Drop a dependency on this task")]
    pub remove_dep: Option<String>,
}

impl Command for UpdateTaskCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let patch = TaskPatch {
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            assignee: ctx.field_change(self.assignee.as_deref(), |r| ctx.agent(r))?,
            priority: self.priority,
            tags: self.tags.clone(),
            team: ctx.field_change(self.team.as_deref(), |r| ctx.team(r))?,
            add_dep: self.add_dep.as_deref().map(|r| ctx.task(r)).transpose()?,
            remove_dep: self.remove_dep.as_deref().map(|r| ctx.task(r)).transpose()?,
        };
        if patch.is_empty() {
            anyhow::bail!("nothing to update; pass at least one field flag");
        }

        let task = ctx.coordinator.tasks().update(ctx.task(&self.task)?, patch)?;
        println!("✏️  Updated {}", task.id.short());
        print_task(&task);
        Ok(())
    }
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "⏳",
        TaskStatus::InProgress => "🔨",
        TaskStatus::Completed => "✅",
        TaskStatus::Blocked => "⛔",
    }
}

fn print_task(task: &Task) {
    let now = chrono::Utc::now();
    println!("{} {} {}", status_icon(task.status), task.id, task.title);
    println!("   status:   {}", task.status);
    println!("   priority: {}", task.priority);
    if let Some(assignee) = task.assignee {
        println!("   assignee: {assignee}");
    }
    if let Some(team) = task.team {
        println!("   team:     {team}");
    }
    if !task.tags.is_empty() {
        println!("   tags:     {}", task.tags);
    }
    for dep in &task.depends_on {
        println!("   ⛓ depends on {dep}");
    }
    if let Some(creator) = task.created_by {
        println!("   created by {creator}");
    }
    println!("   created {}, updated {}", age(now, task.created_at), age(now, task.updated_at));
    if !task.description.is_empty() {
        println!();
        println!("{}", task.description);
    }
    if let Some(result) = &task.result {
        println!();
        println!("📦 Result: {result}");
    }
}
