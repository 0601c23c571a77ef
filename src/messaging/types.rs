use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, MessageId};
use crate::priority::Priority;
use crate::tokens::token_enum;

token_enum! {
    pub enum MessageType ("message type") {
        Request => "request",
        Info => "info",
        Query => "query",
    }
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Info
    }
}

token_enum! {
    pub enum MessageStatus ("message status") {
        Unread => "unread",
        Read => "read",
    }
}

/// Persisted message record (`agents/<to>/inbox/<id>.json`).
///
/// Owned by the recipient's inbox; the only mutation is marking it read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    /// `None` for messages sent by callers that never registered
    #[serde(default)]
    pub from: Option<AgentId>,
    pub to: AgentId,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_unread(&self) -> bool {
        self.status == MessageStatus::Unread
    }
}

/// Message content shared by point-to-point sends and broadcasts.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub from: Option<AgentId>,
    pub subject: String,
    pub body: String,
    pub message_type: MessageType,
    pub priority: Priority,
    pub artifact_path: Option<String>,
}

impl Envelope {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn sent_by(mut self, agent: AgentId) -> Self {
        self.from = Some(agent);
        self
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_artifact(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }
}

/// Per-target result of a broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastOutcome {
    pub agent: AgentId,
    pub name: String,
    pub message: Option<MessageId>,
    pub error: Option<String>,
}

impl BroadcastOutcome {
    pub fn delivered(&self) -> bool {
        self.message.is_some()
    }
}
