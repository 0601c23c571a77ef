use anyhow::Result;
use clap::Args;
use std::time::Duration;

use super::{age, preview, Command, Context};
use crate::messaging::{watch_inbox, Envelope, Message, MessageType, WatchOptions};
use crate::priority::Priority;
use crate::query::AgentFilter;
use crate::shutdown::ShutdownCoordinator;

/// Flags shared by `send` and `broadcast`.
#[derive(Args)]
pub struct EnvelopeArgs {
    /// Subject line
    pub subject: String,
    /// Message body
    #[arg(default_value = "")]
    pub body: String,
    #[arg(long, help = "Sending agent (id, prefix or name); omit to send anonymously")]
    pub from: Option<String>,
    #[arg(long = "type", help = "request, info or query (send defaults to request, broadcast to info)")]
    pub message_type: Option<MessageType>,
    #[arg(long, default_value = "normal", help = "low, normal or high")]
    pub priority: Priority,
    #[arg(long, help = "Path of a file the recipient should look at")]
    pub artifact: Option<String>,
}

impl EnvelopeArgs {
    fn message_type(&self, default: MessageType) -> MessageType {
        self.message_type.unwrap_or(default)
    }

    fn envelope(&self, ctx: &Context, default_type: MessageType) -> Result<Envelope> {
        let mut envelope = Envelope::new(&self.subject, &self.body)
            .with_type(self.message_type(default_type))
            .with_priority(self.priority);
        if let Some(from) = ctx.optional_agent(self.from.as_deref())? {
            envelope = envelope.sent_by(from);
        }
        if let Some(path) = &self.artifact {
            envelope = envelope.with_artifact(path);
        }
        Ok(envelope)
    }
}

#[derive(Args)]
pub struct SendCommand {
    /// Recipient: agent id, id prefix or name
    pub to: String,
    #[command(flatten)]
    pub message: EnvelopeArgs,
}

impl Command for SendCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let envelope = self.message.envelope(ctx, MessageType::Request)?;
        let id = ctx.coordinator.messages().send(&self.to, &envelope)?;
        println!("{id}");
        Ok(())
    }
}

#[derive(Args)]
pub struct CheckCommand {
    /// Agent whose inbox to show
    pub agent: String,
    #[arg(long, short = 'a', help = "Include messages already read")]
    pub all: bool,
    #[arg(long, help = "Mark the listed messages read")]
    pub mark_read: bool,
}

impl Command for CheckCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let id = ctx.agent(&self.agent)?;
        let bus = ctx.coordinator.messages();
        let messages = bus.check(id, self.all)?;
        if messages.is_empty() {
            println!("📭 No {}messages", if self.all { "" } else { "unread " });
            return Ok(());
        }

        println!("📬 {} message(s) for {}", messages.len(), id.short());
        for message in &messages {
            print_message(ctx, message);
            if self.mark_read && message.is_unread() {
                bus.mark_read(id, message.id)?;
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ReadCommand {
    /// Agent owning the inbox
    pub agent: String,
    /// Message id or id prefix
    pub message: String,
}

impl Command for ReadCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let agent = ctx.agent(&self.agent)?;
        let bus = ctx.coordinator.messages();
        let id = bus.find_in_inbox(agent, &self.message)?;
        let message = bus.mark_read(agent, id)?;
        print_message(ctx, &message);
        if !message.body.is_empty() {
            println!();
            println!("{}", message.body);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct BroadcastCommand {
    #[command(flatten)]
    pub message: EnvelopeArgs,
    #[arg(long, help = "Only agents carrying this tag")]
    pub tag: Option<String>,
    #[arg(long, help = "Only agents offering this capability")]
    pub capability: Option<String>,
    #[arg(long, help = "Also deliver to the sending agent")]
    pub include_self: bool,
}

impl Command for BroadcastCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let envelope = self.message.envelope(ctx, MessageType::Info)?;
        let filter = AgentFilter::broadcast(
            self.tag.as_deref(),
            self.capability.as_deref(),
            !self.include_self,
            envelope.from,
        );
        let outcomes = ctx.coordinator.messages().broadcast(&envelope, &filter)?;
        if outcomes.is_empty() {
            println!("📭 No agents matched the broadcast filter");
            return Ok(());
        }

        let delivered = outcomes.iter().filter(|o| o.delivered()).count();
        for outcome in &outcomes {
            match &outcome.error {
                None => println!("✅ {} {}", outcome.agent.short(), outcome.name),
                Some(e) => println!("❌ {} {}: {e}", outcome.agent.short(), outcome.name),
            }
        }
        println!("📣 Delivered to {delivered}/{} agent(s)", outcomes.len());
        Ok(())
    }
}

#[derive(Args)]
pub struct WatchCommand {
    /// Agent whose inbox to follow
    pub agent: String,
    #[arg(long, help = "Seconds between inbox polls")]
    pub interval: Option<u64>,
    #[arg(long, help = "Mark messages read as they are shown")]
    pub mark_read: bool,
    #[arg(long, help = "Send a heartbeat on every poll")]
    pub heartbeat: bool,
}

impl Command for WatchCommand {
    async fn execute(&self, ctx: &Context) -> Result<()> {
        let id = ctx.agent(&self.agent)?;
        let options = WatchOptions {
            interval: self
                .interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| ctx.config.watch_interval())
                .max(Duration::from_secs(1)),
            mark_read: self.mark_read,
            heartbeat: self.heartbeat,
        };
        println!(
            "👀 Watching inbox of {} every {}s (Ctrl-C to stop)",
            id.short(),
            options.interval.as_secs()
        );

        let seen = watch_inbox(
            ctx.coordinator.messages(),
            ctx.coordinator.agents(),
            id,
            options,
            |message| print_message(ctx, message),
            ShutdownCoordinator::wait_for_signal(),
        )
        .await?;
        println!("🛑 Stopped watching, {seen} message(s) seen");
        Ok(())
    }
}

fn print_message(ctx: &Context, message: &Message) {
    let icon = if message.is_unread() { "🔵" } else { "⚪" };
    let sender = match message.from {
        Some(from) => ctx
            .coordinator
            .agents()
            .find(from)
            .ok()
            .flatten()
            .map(|agent| agent.name)
            .unwrap_or_else(|| from.short()),
        None => "anonymous".to_string(),
    };
    println!(
        "{icon} {} [{}/{}] {} from {} ({})",
        message.id.short(),
        message.message_type,
        message.priority,
        preview(&message.subject, 60),
        sender,
        age(chrono::Utc::now(), message.created_at),
    );
    if let Some(path) = &message.artifact_path {
        println!("     📎 {path}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(message_type: Option<MessageType>) -> EnvelopeArgs {
        EnvelopeArgs {
            subject: "review".into(),
            body: String::new(),
            from: None,
            message_type,
            priority: Priority::Normal,
            artifact: None,
        }
    }

    #[test]
    fn test_send_and_broadcast_have_their_own_default_type() {
        assert_eq!(args(None).message_type(MessageType::Request), MessageType::Request);
        assert_eq!(args(None).message_type(MessageType::Info), MessageType::Info);
        assert_eq!(
            args(Some(MessageType::Query)).message_type(MessageType::Request),
            MessageType::Query
        );
    }
}
