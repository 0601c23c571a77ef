//! Shared helpers for the integration tests: a throwaway store and a clock
//! the test can move by hand.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use team_ai::{AgentId, Clock, Coordinator, LockSettings, NewAgent, TagSet};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct TestStore {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub coordinator: Coordinator,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new());
        let coordinator = Self::open_at(&dir, clock.clone());
        Self { dir, clock, coordinator }
    }

    /// A second, independent handle on the same store, as another agent
    /// process would have.
    pub fn reopen(&self) -> Coordinator {
        Self::open_at(&self.dir, self.clock.clone())
    }

    fn open_at(dir: &TempDir, clock: Arc<ManualClock>) -> Coordinator {
        Coordinator::with_clock(
            dir.path(),
            LockSettings::default(),
            std::time::Duration::from_secs(900),
            clock,
        )
        .unwrap()
    }

    pub fn agent(&self, name: &str) -> AgentId {
        self.coordinator
            .agents()
            .register(NewAgent::new(name, "testing", "test-model"))
            .unwrap()
    }

    pub fn tagged_agent(&self, name: &str, tags: &str, capabilities: &str) -> AgentId {
        self.coordinator
            .agents()
            .register(
                NewAgent::new(name, "testing", "test-model")
                    .with_tags(TagSet::parse(tags))
                    .with_capabilities(TagSet::parse(capabilities)),
            )
            .unwrap()
    }
}
