use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Per-mint minimum spacing between actions.
///
/// `try_acquire` checks and stamps under one lock so two concurrent callers
/// cannot both pass for the same key.
pub struct Cooldown {
    interval: Duration,
    last: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_millis(ms: i64) -> Self {
        Self::new(Duration::milliseconds(ms))
    }

    /// Returns `true` and stamps `now` if the key is outside its cooldown.
    pub fn try_acquire(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = last.get(key) {
            if now - *prev < self.interval {
                return false;
            }
        }
        last.insert(key.to_string(), now);
        true
    }

    /// Drop stamps whose window has passed at `now`. Returns how many went.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let before = last.len();
        last.retain(|_, prev| now - *prev < self.interval);
        before - last.len()
    }

    pub fn len(&self) -> usize {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
