use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::bus::MessageBus;
use super::types::Message;
use crate::agents::AgentRegistry;
use crate::error::{CoordinationError, Result};
use crate::ids::{AgentId, MessageId};

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Mark each message read once it has been handed to the callback
    pub mark_read: bool,
    /// Refresh the agent's heartbeat on every poll
    pub heartbeat: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            mark_read: false,
            heartbeat: false,
        }
    }
}

/// Poll `agent`'s inbox until `shutdown` resolves, handing every unread
/// message to `on_message` exactly once. Returns how many were seen.
///
/// A failed poll is logged and retried on the next tick. Store calls run on
/// the blocking pool so lock waits never stall the runtime.
pub async fn watch_inbox<F, S>(
    bus: &MessageBus,
    agents: &AgentRegistry,
    agent: AgentId,
    options: WatchOptions,
    mut on_message: F,
    shutdown: S,
) -> Result<usize>
where
    F: FnMut(&Message),
    S: Future<Output = ()>,
{
    // Fail fast on an unknown agent instead of polling forever
    let lookup = agents.clone();
    tokio::task::spawn_blocking(move || lookup.get(agent))
        .await
        .map_err(|e| CoordinationError::Io(std::io::Error::other(e)))??;

    let mut seen: HashSet<MessageId> = HashSet::new();
    let mut ticker = interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(agent.id = %agent, interval_secs = options.interval.as_secs(), "Watching inbox");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let poll_agents = agents.clone();
        let poll_bus = bus.clone();
        let heartbeat = options.heartbeat;
        let polled = tokio::task::spawn_blocking(move || {
            if heartbeat {
                poll_agents.heartbeat(agent);
            }
            poll_bus.check(agent, false)
        })
        .await;
        let unread = match polled {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                warn!(agent.id = %agent, error = %e, "Inbox poll failed");
                continue;
            }
            Err(e) => {
                warn!(agent.id = %agent, error = %e, "Inbox poll task failed");
                continue;
            }
        };
        for message in unread {
            if !seen.insert(message.id) {
                continue;
            }
            on_message(&message);
            if options.mark_read {
                let reader = bus.clone();
                let id = message.id;
                match tokio::task::spawn_blocking(move || reader.mark_read(agent, id)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(message.id = %id, error = %e, "Could not mark message read"),
                    Err(e) => warn!(message.id = %id, error = %e, "Mark-read task failed"),
                }
            }
        }
        debug!(agent.id = %agent, seen = seen.len(), "Inbox poll complete");
    }

    info!(agent.id = %agent, seen = seen.len(), "Stopped watching inbox");
    Ok(seen.len())
}
