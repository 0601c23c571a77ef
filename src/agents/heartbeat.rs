use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::registry::AgentRegistry;
use crate::ids::AgentId;

/// Refresh `agent`'s heartbeat every `every` until `shutdown` resolves.
///
/// The first beat is sent immediately. Failed beats are logged and the loop
/// keeps going; returns the number of successful beats. Each beat runs on the
/// blocking pool since the store does file I/O and may sleep on a lock.
pub async fn run_heartbeat<S>(registry: &AgentRegistry, agent: AgentId, every: Duration, shutdown: S) -> u64
where
    S: Future<Output = ()>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut beats = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let beat = registry.clone();
                match tokio::task::spawn_blocking(move || beat.heartbeat(agent)).await {
                    Ok(true) => beats += 1,
                    Ok(false) => warn!(agent.id = %agent, "Heartbeat was not recorded"),
                    Err(e) => warn!(agent.id = %agent, error = %e, "Heartbeat task failed"),
                }
            }
        }
    }
    info!(agent.id = %agent, beats, "Heartbeat loop stopped");
    beats
}
