use anyhow::Result;
use clap::{Args, Subcommand};

use super::{age, preview, Command, Context};
use crate::plans::{NewPlan, Plan, PlanStatus, ReviewAction};
use crate::query::PlanFilter;

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Submit a plan for review and print its id
    Submit(SubmitPlanCommand),
    /// Approve or reject a pending plan
    Review(ReviewPlanCommand),
    /// List plans
    List(ListPlansCommand),
    /// Show one plan in full
    Show(ShowPlanCommand),
}

impl Command for PlanCommands {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            PlanCommands::Submit(cmd) => cmd.execute(ctx).await,
            PlanCommands::Review(cmd) => cmd.execute(ctx).await,
            PlanCommands::List(cmd) => cmd.execute(ctx).await,
            PlanCommands::Show(cmd) => cmd.execute(ctx).await,
        }
    }
}

#[derive(Args)]
pub struct SubmitPlanCommand {
    pub title: String,
    /// Plan text
    #[arg(default_value = "")]
    pub body: String,
    #[arg(long, help = "Reviewing agent (id, prefix or name)")]
    pub reviewer: String,
    #[arg(long, help = "Submitting agent (id, prefix or name)")]
    pub submitter: Option<String>,
    #[arg(long, help = "Team (id or prefix)")]
    pub team: Option<String>,
}

impl Command for SubmitPlanCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let plan = NewPlan {
            title: self.title.clone(),
            body: self.body.clone(),
            reviewer: ctx.agent(&self.reviewer)?,
            submitter: ctx.optional_agent(self.submitter.as_deref())?,
            team: ctx.optional_team(self.team.as_deref())?,
        };
        let id = ctx.coordinator.plans().submit(plan)?;
        println!("{id}");
        Ok(())
    }
}

#[derive(Args)]
pub struct ReviewPlanCommand {
    /// Plan id or prefix
    pub plan: String,
    /// approve or reject
    pub action: ReviewAction,
    #[arg(long, help = "Feedback for the submitter")]
    pub feedback: Option<String>,
}

impl Command for ReviewPlanCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let plan = ctx
            .coordinator
            .plans()
            .review(ctx.plan(&self.plan)?, self.action, self.feedback.clone())?;
        println!("{} Plan {} {}", status_icon(plan.status), plan.id.short(), plan.status);
        Ok(())
    }
}

#[derive(Args)]
pub struct ListPlansCommand {
    #[arg(long, help = "pending, approved or rejected")]
    pub status: Option<PlanStatus>,
    #[arg(long, help = "Reviewing agent (id, prefix or name)")]
    pub reviewer: Option<String>,
    #[arg(long, help = "Submitting agent (id, prefix or name)")]
    pub submitter: Option<String>,
    #[arg(long, help = "Team (id or prefix)")]
    pub team: Option<String>,
}

impl Command for ListPlansCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let filter = PlanFilter {
            status: self.status,
            reviewer: ctx.optional_agent(self.reviewer.as_deref())?,
            submitter: ctx.optional_agent(self.submitter.as_deref())?,
            team: ctx.optional_team(self.team.as_deref())?,
        };
        let plans = ctx.coordinator.plans().list(&filter)?;
        if plans.is_empty() {
            println!("📝 No matching plans");
            return Ok(());
        }
        for plan in &plans {
            println!(
                "{} {} {:<8} {} (reviewer {})",
                status_icon(plan.status),
                plan.id.short(),
                plan.status,
                preview(&plan.title, 60),
                plan.reviewer.short()
            );
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ShowPlanCommand {
    /// Plan id or prefix
    pub plan: String,
}

impl Command for ShowPlanCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let plan = ctx.coordinator.plans().get(ctx.plan(&self.plan)?)?;
        print_plan(&plan);
        Ok(())
    }
}

fn status_icon(status: PlanStatus) -> &'static str {
    match status {
        PlanStatus::Pending => "⏳",
        PlanStatus::Approved => "✅",
        PlanStatus::Rejected => "❌",
    }
}

fn print_plan(plan: &Plan) {
    let now = chrono::Utc::now();
    println!("{} {} {}", status_icon(plan.status), plan.id, plan.title);
    println!("   status:   {}", plan.status);
    println!("   reviewer: {}", plan.reviewer);
    if let Some(submitter) = plan.submitter {
        println!("   submitter: {submitter}");
    }
    if let Some(team) = plan.team {
        println!("   team:     {team}");
    }
    println!("   submitted {}", age(now, plan.created_at));
    if let Some(reviewed) = plan.reviewed_at {
        println!("   reviewed {}", age(now, reviewed));
    }
    if let Some(feedback) = &plan.feedback {
        println!("   💬 {feedback}");
    }
    if !plan.body.is_empty() {
        println!();
        println!("{}", plan.body);
    }
}
