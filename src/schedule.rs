use crate::config::Source;
use crate::extract::SourceKind;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Tracks when each source was last attempted. Owned by the poller; never
/// persisted across restarts.
#[derive(Debug, Default)]
pub struct Schedule {
    last_attempt: HashMap<SourceKind, DateTime<Utc>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source is due when its interval has fully elapsed since the last
    /// attempt. A source that was never attempted is always due.
    pub fn is_due(&self, source: &Source, now: DateTime<Utc>) -> bool {
        match self.last_attempt.get(&source.kind) {
            Some(last) => now - *last >= Duration::seconds(source.interval_secs as i64),
            None => true,
        }
    }

    /// Recorded after every attempt, success or failure. A failing endpoint
    /// backs off to its normal interval instead of being retried every tick.
    pub fn record_attempt(&mut self, kind: SourceKind, when: DateTime<Utc>) {
        self.last_attempt.insert(kind, when);
    }
}
