use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::Instrument;

use team_ai::cli::commands::{show_how_to_get_work, Command, Context};
use team_ai::cli::{Cli, Commands};
use team_ai::config::config;
use team_ai::telemetry::{create_coordination_span, generate_correlation_id, init_telemetry};
use team_ai::{Coordinator, CoordinationError};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn run(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let Some(command) = cli.command else {
        return runtime.block_on(show_how_to_get_work());
    };

    let mut settings = config()?.clone();
    if let Some(home) = cli.home {
        settings.store.root = Some(home);
    }
    init_telemetry(&settings.observability)?;

    let ctx = Context {
        coordinator: Coordinator::open(&settings)?,
        config: settings,
    };
    let correlation_id = generate_correlation_id();
    let span = create_coordination_span(operation_name(&command), None, None, Some(&correlation_id));

    runtime.block_on(dispatch(&command, &ctx).instrument(span))
}

async fn dispatch(command: &Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Register(cmd) => cmd.execute(ctx).await,
        Commands::Heartbeat(cmd) => cmd.execute(ctx).await,
        Commands::Deregister(cmd) => cmd.execute(ctx).await,
        Commands::List(cmd) => cmd.execute(ctx).await,
        Commands::Find(cmd) => cmd.execute(ctx).await,
        Commands::Send(cmd) => cmd.execute(ctx).await,
        Commands::Check(cmd) => cmd.execute(ctx).await,
        Commands::Read(cmd) => cmd.execute(ctx).await,
        Commands::Broadcast(cmd) => cmd.execute(ctx).await,
        Commands::Watch(cmd) => cmd.execute(ctx).await,
        Commands::Task { command } => command.execute(ctx).await,
        Commands::Team { command } => command.execute(ctx).await,
        Commands::Plan { command } => command.execute(ctx).await,
        Commands::Config(cmd) => cmd.execute(ctx).await,
    }
}

fn operation_name(command: &Commands) -> &'static str {
    match command {
        Commands::Register(_) => "register",
        Commands::Heartbeat(_) => "heartbeat",
        Commands::Deregister(_) => "deregister",
        Commands::List(_) => "list",
        Commands::Find(_) => "find",
        Commands::Send(_) => "send",
        Commands::Check(_) => "check",
        Commands::Read(_) => "read",
        Commands::Broadcast(_) => "broadcast",
        Commands::Watch(_) => "watch",
        Commands::Task { .. } => "task",
        Commands::Team { .. } => "team",
        Commands::Plan { .. } => "plan",
        Commands::Config(_) => "config",
    }
}

/// Print `Error [kind]: detail` and pick the exit code for the failure class.
fn report(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<CoordinationError>() {
        Some(e) => {
            let kind = e.kind();
            eprintln!("Error [{kind}]: {e}");
            if kind.is_retryable() {
                eprintln!("  (safe to retry)");
            }
            ExitCode::from(kind.exit_code())
        }
        None => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
