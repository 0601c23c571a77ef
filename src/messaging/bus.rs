use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{BroadcastOutcome, Envelope, Message, MessageStatus};
use crate::agents::AgentRegistry;
use crate::clock::Clock;
use crate::error::{CoordinationError, ErrorKind, Result};
use crate::ids::{AgentId, MessageId};
use crate::query::AgentFilter;
use crate::store::Store;

/// Per-agent inboxes with point-to-point send and filtered broadcast.
///
/// Each delivered message is its own record in the recipient's inbox, so a
/// broadcast is N independent sends and one failing target never affects
/// the others.
#[derive(Clone)]
pub struct MessageBus {
    store: Store,
    clock: Arc<dyn Clock>,
    agents: AgentRegistry,
}

impl MessageBus {
    pub fn new(store: Store, clock: Arc<dyn Clock>, agents: AgentRegistry) -> Self {
        Self { store, clock, agents }
    }

    /// Send to an agent given by id, id prefix or name.
    pub fn send(&self, to: &str, envelope: &Envelope) -> Result<MessageId> {
        let recipient = self.agents.resolve(to).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CoordinationError::UnknownRecipient(to.to_string()),
            _ => e,
        })?;
        self.validate_sender(envelope)?;
        self.deliver(recipient.id, envelope)
    }

    /// Send to a known agent id.
    pub fn send_to(&self, to: AgentId, envelope: &Envelope) -> Result<MessageId> {
        if self.agents.find(to)?.is_none() {
            return Err(CoordinationError::UnknownRecipient(to.to_string()));
        }
        self.validate_sender(envelope)?;
        self.deliver(to, envelope)
    }

    fn validate_sender(&self, envelope: &Envelope) -> Result<()> {
        if envelope.subject.trim().is_empty() {
            return Err(CoordinationError::InvalidInput("message subject must not be empty".into()));
        }
        if let Some(from) = envelope.from {
            self.agents.get(from)?;
        }
        Ok(())
    }

    fn deliver(&self, to: AgentId, envelope: &Envelope) -> Result<MessageId> {
        let message = Message {
            id: MessageId::new(),
            from: envelope.from,
            to,
            subject: envelope.subject.trim().to_string(),
            body: envelope.body.clone(),
            message_type: envelope.message_type,
            priority: envelope.priority,
            artifact_path: envelope.artifact_path.clone(),
            status: MessageStatus::Unread,
            created_at: self.clock.now(),
            read_at: None,
        };
        self.store
            .write(&self.store.message_path(to, message.id), &message)?;
        info!(
            message.id = %message.id,
            to = %to,
            from = ?message.from,
            message.kind = %message.message_type,
            "Message delivered"
        );
        Ok(message.id)
    }

    /// Inbox of `agent`, oldest first. Reading does not mark anything read.
    pub fn check(&self, agent: AgentId, include_read: bool) -> Result<Vec<Message>> {
        self.agents.get(agent)?;
        let mut messages: Vec<Message> = self
            .store
            .scan::<Message>(&self.store.inbox_dir(agent))?
            .into_iter()
            .filter(|m| include_read || m.is_unread())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    /// Mark one message read. Marking an already read message is a no-op.
    pub fn mark_read(&self, agent: AgentId, message: MessageId) -> Result<Message> {
        let path = self.store.message_path(agent, message);
        if !path.exists() {
            return Err(CoordinationError::MessageNotFound { agent, message });
        }
        self.store.with_lock(&path, || {
            let mut record: Message = self
                .store
                .read(&path)?
                .ok_or(CoordinationError::MessageNotFound { agent, message })?;
            if !record.is_unread() {
                return Ok(record);
            }
            record.status = MessageStatus::Read;
            record.read_at = Some(self.clock.now());
            self.store.write(&path, &record)?;
            debug!(message.id = %message, agent.id = %agent, "Message marked read");
            Ok(record)
        })
    }

    /// Find a message in `agent`'s inbox by id or unique id prefix.
    pub fn find_in_inbox(&self, agent: AgentId, reference: &str) -> Result<MessageId> {
        let reference = reference.trim().to_lowercase();
        if let Ok(id) = reference.parse::<MessageId>() {
            return Ok(id);
        }
        let matches: Vec<MessageId> = self
            .check(agent, true)?
            .into_iter()
            .map(|m| m.id)
            .filter(|id| id.to_string().starts_with(&reference))
            .collect();
        match matches.as_slice() {
            [] => Err(CoordinationError::NoMatch { kind: "message", reference }),
            [only] => Ok(*only),
            many => Err(CoordinationError::AmbiguousReference {
                kind: "message",
                reference,
                matches: many.len(),
            }),
        }
    }

    /// Deliver `envelope` to every agent `filter` selects.
    ///
    /// A failed delivery is recorded in its outcome and the loop moves on.
    pub fn broadcast(&self, envelope: &Envelope, filter: &AgentFilter) -> Result<Vec<BroadcastOutcome>> {
        self.validate_sender(envelope)?;
        let targets = self.agents.search(filter)?;
        info!(targets = targets.len(), "Broadcasting message");

        let outcomes = targets
            .into_iter()
            .map(|view| {
                let agent = view.agent;
                match self.deliver(agent.id, envelope) {
                    Ok(id) => BroadcastOutcome {
                        agent: agent.id,
                        name: agent.name,
                        message: Some(id),
                        error: None,
                    },
                    Err(e) => {
                        warn!(agent.id = %agent.id, error = %e, "Broadcast delivery failed");
                        BroadcastOutcome {
                            agent: agent.id,
                            name: agent.name,
                            message: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::NewAgent;
    use crate::clock::MockClock;
    use crate::messaging::MessageType;
    use crate::priority::Priority;
    use crate::store::LockSettings;
    use crate::tokens::TagSet;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};
    use tempfile::TempDir;

    /// Bus whose clock advances one second per reading, so inbox order is
    /// deterministic.
    fn setup() -> (TempDir, AgentRegistry, MessageBus) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), LockSettings::default()).unwrap();
        let ticks = AtomicI64::new(1_700_000_000);
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .returning(move || Utc.timestamp_opt(ticks.fetch_add(1, Ordering::SeqCst), 0).unwrap());
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let agents = AgentRegistry::new(store.clone(), clock.clone(), std::time::Duration::from_secs(900));
        let bus = MessageBus::new(store, clock, agents.clone());
        (dir, agents, bus)
    }

    #[test]
    fn test_send_check_and_mark_read() {
        let (_dir, agents, bus) = setup();
        let alice = agents.register(NewAgent::new("alice", "", "")).unwrap();
        let bob = agents.register(NewAgent::new("bob", "", "")).unwrap();

        let envelope = Envelope::new("review", "please look at PR 12")
            .sent_by(alice)
            .with_type(MessageType::Request)
            .with_priority(Priority::High);
        let first = bus.send("bob", &envelope).unwrap();
        let second = bus.send(&bob.to_string(), &Envelope::new("later", "")).unwrap();

        let inbox = bus.check(bob, false).unwrap();
        assert_eq!(inbox.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(inbox[0].from, Some(alice));
        assert_eq!(inbox[0].message_type, MessageType::Request);
        // Checking has no side effects
        assert_eq!(bus.check(bob, false).unwrap().len(), 2);

        let read = bus.mark_read(bob, first).unwrap();
        assert_eq!(read.status, MessageStatus::Read);
        let again = bus.mark_read(bob, first).unwrap();
        assert_eq!(again.read_at, read.read_at);

        assert_eq!(bus.check(bob, false).unwrap().len(), 1);
        assert_eq!(bus.check(bob, true).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_recipient() {
        let (_dir, _agents, bus) = setup();
        let err = bus.send("nobody", &Envelope::new("hi", "")).unwrap_err();
        assert!(matches!(err, CoordinationError::UnknownRecipient(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_unknown_sender_is_rejected() {
        let (_dir, agents, bus) = setup();
        let bob = agents.register(NewAgent::new("bob", "", "")).unwrap();
        let err = bus
            .send_to(bob, &Envelope::new("hi", "").sent_by(AgentId::new()))
            .unwrap_err();
        assert!(matches!(err, CoordinationError::AgentNotFound(_)));
        assert!(bus.check(bob, true).unwrap().is_empty());
    }

    #[test]
    fn test_mark_read_unknown_message() {
        let (_dir, agents, bus) = setup();
        let bob = agents.register(NewAgent::new("bob", "", "")).unwrap();
        let err = bus.mark_read(bob, MessageId::new()).unwrap_err();
        assert!(matches!(err, CoordinationError::MessageNotFound { .. }));
    }

    #[test]
    fn test_mark_read_for_unknown_agent_creates_nothing() {
        let (dir, _agents, bus) = setup();
        let stranger = AgentId::new();
        let err = bus.mark_read(stranger, MessageId::new()).unwrap_err();
        assert!(matches!(err, CoordinationError::MessageNotFound { .. }));
        assert!(!dir.path().join("agents").join(stranger.to_string()).exists());
    }

    #[test]
    fn test_find_in_inbox_by_prefix() {
        let (_dir, agents, bus) = setup();
        let bob = agents.register(NewAgent::new("bob", "", "")).unwrap();
        let id = bus.send_to(bob, &Envelope::new("hi", "")).unwrap();
        assert_eq!(bus.find_in_inbox(bob, &id.short()).unwrap(), id);
    }

    #[test]
    fn test_broadcast_targets() {
        let (_dir, agents, bus) = setup();
        let me = agents
            .register(NewAgent::new("me", "", "").with_tags(TagSet::parse("backend")))
            .unwrap();
        let peer = agents
            .register(NewAgent::new("peer", "", "").with_tags(TagSet::parse("Backend")))
            .unwrap();
        let other = agents
            .register(NewAgent::new("other", "", "").with_tags(TagSet::parse("frontend")))
            .unwrap();
        let gone = agents.register(NewAgent::new("gone", "", "")).unwrap();
        agents.deregister(gone);

        let envelope = Envelope::new("deploy", "freeze at 5").sent_by(me);
        let outcomes = bus
            .broadcast(&envelope, &AgentFilter::broadcast(Some("BACKEND"), None, true, Some(me)))
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].agent, peer);
        assert!(outcomes[0].delivered());

        let everyone = bus
            .broadcast(&envelope, &AgentFilter::broadcast(None, None, false, Some(me)))
            .unwrap();
        let mut reached: Vec<AgentId> = everyone.iter().map(|o| o.agent).collect();
        reached.sort();
        let mut expected = vec![me, peer, other];
        expected.sort();
        assert_eq!(reached, expected);
        assert!(bus.check(gone, true).unwrap().is_empty());
    }
}
