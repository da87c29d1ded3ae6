//! In-process session registry with idle expiry
//!
//! Maps opaque session keys to serialized handles. Entries expire after a
//! configurable idle TTL; expiry is enforced by sweeping on access rather than
//! a background task.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct SessionEntry {
    handle: String,
    touched_at: Instant,
}

/// Registry of live session handles keyed by an opaque string.
pub struct SessionRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the default one-hour idle TTL.
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    /// Registry with the TTL from the `[session]` config section.
    pub fn from_config(config: &crate::config::SessionConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs))
    }

    /// Look up a session handle, refreshing its idle timer on hit.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        Self::sweep(&mut entries, self.ttl);
        let entry = entries.get_mut(key)?;
        entry.touched_at = Instant::now();
        Some(entry.handle.clone())
    }

    /// Register or replace a session handle.
    pub fn insert(&self, key: impl Into<String>, handle: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap();
        Self::sweep(&mut entries, self.ttl);
        entries.insert(
            key.into(),
            SessionEntry {
                handle: handle.into(),
                touched_at: Instant::now(),
            },
        );
    }

    /// Drop a session handle; missing keys are a no-op.
    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
    }

    /// Number of live (unexpired) sessions.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        Self::sweep(&mut entries, self.ttl);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(entries: &mut HashMap<String, SessionEntry>, ttl: Duration) {
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.touched_at) < ttl);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}
