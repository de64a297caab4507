use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::types::HistoryEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing reconciled into this session yet
    Empty,
    Loaded,
}

/// Per-user sliding window of the exchanges the agent is working with
#[derive(Debug)]
pub struct SessionMemory {
    window: usize,
    entries: VecDeque<HistoryEntry>,
    state: SessionState,
    last_activity: Instant,
}

impl SessionMemory {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            entries: VecDeque::with_capacity(window),
            state: SessionState::Empty,
            last_activity: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one exchange, evicting the oldest beyond the window.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.window {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.state = SessionState::Loaded;
        self.touch();
    }

    /// Replace the content with `entries`, given oldest first.
    pub fn replay<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = HistoryEntry>,
    {
        self.clear();
        for entry in entries {
            self.push(entry);
        }
        self.state = SessionState::Loaded;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.state = SessionState::Empty;
    }

    /// Current window, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub active_sessions: usize,
}

/// Session memories keyed by user id, one async mutex per user.
///
/// Holding a user's guard is also the per-user critical section for
/// history compaction, so a compaction never interleaves with a live turn.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<Mutex<SessionMemory>>>>,
    window: usize,
}

impl SessionRegistry {
    pub fn new(window: usize) -> Self {
        info!("Initializing session registry (window = {})", window);
        Self {
            sessions: Arc::new(DashMap::new()),
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<SessionMemory>> {
        if let Some(slot) = self.sessions.get(user_id) {
            return slot.value().clone();
        }
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!("Creating session memory for user {}", user_id);
                Arc::new(Mutex::new(SessionMemory::new(self.window)))
            })
            .value()
            .clone()
    }

    /// Lock the user's session, creating it on first use.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<SessionMemory> {
        self.slot(user_id).lock_owned().await
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Drop a user's session if nobody holds or awaits its lock.
    ///
    /// Slots are only cloned under the map's shard lock, so a strong count
    /// of one seen inside `remove_if` cannot grow before the removal.
    pub fn evict(&self, user_id: &str) -> bool {
        self.sessions
            .remove_if(user_id, |_, slot| Arc::strong_count(slot) == 1)
            .is_some()
    }

    /// Remove sessions idle longer than `ttl`; sessions in use are kept.
    pub fn cleanup_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(session) => session.idle_for() <= ttl,
                Err(_) => true,
            }
        });
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            info!("Evicted {} idle sessions", removed);
        }
        removed
    }

    /// Periodically drop sessions idle longer than `ttl`.
    pub fn spawn_sweeper(&self, every: Duration, ttl: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.cleanup_idle(ttl);
                debug!(
                    "Session sweep removed {}, {} remain",
                    removed,
                    registry.stats().active_sessions
                );
            }
        })
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active_sessions: self.sessions.len(),
        }
    }
}
