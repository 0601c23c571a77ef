//! Message bus: per-agent inboxes, point-to-point send and broadcast.

pub mod bus;
pub mod types;
pub mod watch;

pub use bus::MessageBus;
pub use types::{BroadcastOutcome, Envelope, Message, MessageStatus, MessageType};
pub use watch::{watch_inbox, WatchOptions};
